//!
//! src/paginate.rs
//!
//! Walks a paginated playlist listing until the catalog reports no
//! further pages. Page errors are not caught here.
//!

use tracing::debug;

use crate::catalog::CatalogApi;
use crate::errors::ExtractorError;
use crate::types::{ItemPage, PlaylistItem};

pub async fn fetch_all(catalog: &dyn CatalogApi, initial: ItemPage) ->
    Result<Vec<PlaylistItem>, ExtractorError> {

    let mut items = initial.items;
    let mut next = initial.next;
    let mut pages = 1_usize;

    while let Some(url) = next {
        let page = catalog.next_page(&url).await?;
        pages += 1;
        debug!(page = pages, items = page.items.len(), "paginate.page");
        items.extend(page.items);
        next = page.next;
    }

    debug!(pages, total = items.len(), "paginate.done");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeCatalog, track};

    #[tokio::test]
    async fn follows_next_until_absent() {
        let catalog = FakeCatalog::with_pages(vec![
            vec![Some(track("a", "A", "X")), None],
            vec![Some(track("b", "B", "Y"))],
            vec![Some(track("c", "C", "Z"))],
        ]);
        let first = catalog.playlist_items("pl", 2).await.unwrap();

        let items = fetch_all(&catalog, first).await.unwrap();
        let ids: Vec<_> = items.iter()
            .map(|i| i.track.as_ref().and_then(|t| t.id.clone()))
            .collect();

        assert_eq!(ids, vec![Some("a".into()), None, Some("b".into()), Some("c".into())]);
        assert_eq!(catalog.next_page_calls(), 2);
    }

    #[tokio::test]
    async fn single_page_makes_no_extra_calls() {
        let catalog = FakeCatalog::with_pages(vec![vec![Some(track("a", "A", "X"))]]);
        let first = catalog.playlist_items("pl", 100).await.unwrap();

        let items = fetch_all(&catalog, first).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(catalog.next_page_calls(), 0);
    }

    #[tokio::test]
    async fn page_error_propagates() {
        let catalog = FakeCatalog::with_pages(vec![
            vec![Some(track("a", "A", "X"))],
            vec![Some(track("b", "B", "Y"))],
        ]).failing_page(1);
        let first = catalog.playlist_items("pl", 1).await.unwrap();

        let err = fetch_all(&catalog, first).await.unwrap_err();
        assert!(matches!(err, ExtractorError::Http(_)));
    }
}
