//!
//! src/storage.rs
//!
//! Uploads a local run directory to the remote store. Targets are
//! `bucket/prefix` or `s3://bucket/prefix` for the object store and
//! `file://<dir>` for a local mirror.
//!

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::errors::ExtractorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    Bucket { bucket: String, prefix: String },
    Local(PathBuf)
}

impl RemoteTarget {
    /// A target without a scheme is a bucket path, same as `s3://`
    pub fn parse(remote_dir: &str) -> Result<Self, ExtractorError> {
        let raw = remote_dir.trim();
        if let Some(path) = raw.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ExtractorError::Config("empty file:// target".into()));
            }
            return Ok(RemoteTarget::Local(PathBuf::from(path)));
        }

        let rest = match raw.split_once("://") {
            Some(("s3", rest)) => rest,
            Some((scheme, _)) => return Err(ExtractorError::Config(
                format!("unsupported remote target {scheme}://")
            )),
            None => raw
        };

        let rest = rest.trim_matches('/');
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(ExtractorError::Config(format!("no bucket in {remote_dir:?}")));
        }
        Ok( RemoteTarget::Bucket {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string()
        })
    }
}

/// Files under `local_dir` with their '/' separated relative paths, in name order
fn walk_files(local_dir: &Path) -> Result<Vec<(PathBuf, String)>, ExtractorError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(local_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| ExtractorError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path()
            .strip_prefix(local_dir)
            .map_err(|e| ExtractorError::Parse(format!("{}: {e}", entry.path().display())))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((entry.into_path(), relative));
    }
    Ok(files)
}

fn object_key(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Recursive copy of local_dir to the target, overwriting what exists
    async fn copy_dir(&self, local_dir: &Path, target: &RemoteTarget) -> Result<usize, ExtractorError>;
}

pub struct S3Store {
    client: S3Client
}

impl S3Store {
    pub async fn connect(cfg: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()));

        if let (Some(key), Some(secret)) = (&cfg.access_key, &cfg.secret_key) {
            loader = loader.credentials_provider(
                Credentials::new(key, secret, None, None, "playlist-extractor")
            );
        }

        let shared = loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &cfg.endpoint {
            // self hosted stores (minio, localstack) want path style urls
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Self { client: S3Client::from_conf(s3_config.build()) }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), ExtractorError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| ExtractorError::Io(std::io::Error::other(
                format!("read {}: {e}", path.display())
            )))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| ExtractorError::Provider(
                format!("put s3://{bucket}/{key}: {}", DisplayErrorContext(&e))
            ))?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn copy_dir(&self, local_dir: &Path, target: &RemoteTarget) -> Result<usize, ExtractorError> {
        let RemoteTarget::Bucket { bucket, prefix } = target else {
            return Err(ExtractorError::Config(format!("{target:?} is not a bucket target")));
        };

        let files = walk_files(local_dir)?;
        for (path, relative) in &files {
            let key = object_key(prefix, relative);
            self.put_file(bucket, &key, path).await?;
            debug!(bucket = %bucket, key = %key, "storage.put");
        }
        Ok(files.len())
    }
}

/// Remote store that is just another directory
#[derive(Default)]
pub struct LocalMirrorStore;

fn mirror(local_dir: &Path, to: &Path) -> Result<usize, ExtractorError> {
    let files = walk_files(local_dir)?;
    for (path, relative) in &files {
        let target = to.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &target)?;
    }
    Ok(files.len())
}

#[async_trait]
impl RemoteStore for LocalMirrorStore {
    async fn copy_dir(&self, local_dir: &Path, target: &RemoteTarget) -> Result<usize, ExtractorError> {
        let RemoteTarget::Local(to) = target else {
            return Err(ExtractorError::Config(format!("{target:?} is not a local target")));
        };

        let from = local_dir.to_path_buf();
        let to = to.clone();
        tokio::task::spawn_blocking(move || mirror(&from, &to))
            .await
            .map_err(|e| ExtractorError::Provider(format!("copy task: {e}")))?
    }
}

/// Store matching the target kind
pub async fn store_for(target: &RemoteTarget, cfg: &StorageConfig) -> Box<dyn RemoteStore> {
    match target {
        RemoteTarget::Bucket { .. } => Box::new(S3Store::connect(cfg).await),
        RemoteTarget::Local(_) => Box::new(LocalMirrorStore)
    }
}

pub async fn upload(local_dir: &Path, remote_dir: &str, cfg: &StorageConfig) ->
    Result<(), ExtractorError> {
    if !local_dir.is_dir() {
        return Err(ExtractorError::NotFound(
            format!("local directory {}", local_dir.display())
        ));
    }
    let target = RemoteTarget::parse(remote_dir)?;

    info!(local = %local_dir.display(), remote = %remote_dir, "storage.upload");
    let files = store_for(&target, cfg).await.copy_dir(local_dir, &target).await?;
    info!(remote = %remote_dir, files, "storage.uploaded");
    Ok(())
}
