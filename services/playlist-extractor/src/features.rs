//!
//! src/features.rs
//!
//! Audio feature lookup for one track. Never fails: any provider error
//! or partial payload yields the all-null feature vector.
//!

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::catalog::CatalogApi;
use crate::types::AudioFeatures;

pub struct FeatureFetcher {
    catalog: Arc<dyn CatalogApi>,
    delay: Duration
}

impl FeatureFetcher {
    pub fn new(catalog: Arc<dyn CatalogApi>, delay: Duration) -> Self {
        Self { catalog, delay }
    }

    pub async fn fetch(&self, track_id: &str) -> AudioFeatures {
        // catalog rate limit
        sleep(self.delay).await;

        match self.catalog.audio_features(track_id).await {
            Ok(Some(features)) if features.is_complete() => features,
            Ok(Some(_)) => {
                warn!(track_id = %track_id, "features.partial");
                AudioFeatures::default()
            }
            Ok(None) => {
                debug!(track_id = %track_id, "features.missing");
                AudioFeatures::default()
            }
            Err(e) => {
                warn!(track_id = %track_id, error = %e, "features.failed");
                AudioFeatures::default()
            }
        }
    }
}
