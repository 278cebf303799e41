//! Index listing and resolution.
//!
//! Operators pick an index by id or by display name. Names are not unique
//! on the vendor side, so name lookups report ambiguity instead of guessing.

use vsctl_api::{DocumentRef, IndexService, IndexSummary};
use vsctl_core::{AppError, AppResult};

/// All indexes visible to the credential, following pagination.
pub async fn list(indexes: &dyn IndexService) -> AppResult<Vec<IndexSummary>> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = indexes.list_indexes(cursor.as_deref()).await?;
        all.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    tracing::debug!("Listed {} indexes", all.len());
    Ok(all)
}

/// All documents attached to an index, following pagination.
pub async fn documents(indexes: &dyn IndexService, index_id: &str) -> AppResult<Vec<DocumentRef>> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = indexes.list_documents(index_id, cursor.as_deref()).await?;
        all.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(all)
}

/// Fetch an index by id. `IndexNotFound` when absent.
pub async fn resolve_id(indexes: &dyn IndexService, index_id: &str) -> AppResult<IndexSummary> {
    indexes.get_index(index_id).await
}

/// Find the single index carrying `name`.
///
/// `IndexNotFound` when none does, `AmbiguousIndexName` when several do.
pub async fn resolve_name(indexes: &dyn IndexService, name: &str) -> AppResult<IndexSummary> {
    let mut matches: Vec<IndexSummary> = list(indexes)
        .await?
        .into_iter()
        .filter(|index| index.name.as_deref() == Some(name))
        .collect();

    match matches.len() {
        0 => Err(AppError::IndexNotFound(format!("no index named '{}'", name))),
        1 => Ok(matches.remove(0)),
        count => Err(AppError::AmbiguousIndexName {
            name: name.to_string(),
            count,
        }),
    }
}

/// Resolve an operator reference: an id first, then a display name.
pub async fn resolve(indexes: &dyn IndexService, reference: &str) -> AppResult<IndexSummary> {
    match resolve_id(indexes, reference).await {
        Ok(index) => Ok(index),
        Err(e) if e.is_not_found() => resolve_name(indexes, reference).await,
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsctl_api::InMemoryBackend;

    #[tokio::test]
    async fn test_list_follows_pages() {
        let backend = InMemoryBackend::new().with_page_size(2);
        for name in ["a", "b", "c", "d", "e"] {
            backend.seed_index(name, &[]);
        }
        let all = list(&backend).await.unwrap();
        let names: Vec<_> = all.iter().map(|index| index.display_name()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_documents_follow_pages() {
        let backend = InMemoryBackend::new().with_page_size(1);
        let index_id = backend.seed_index("docs", &["one", "two", "three"]);
        let documents = documents(&backend, &index_id).await.unwrap();
        assert_eq!(documents.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_by_id_and_name() {
        let backend = InMemoryBackend::new();
        let index_id = backend.seed_index("catalog-v1", &[]);

        assert_eq!(resolve(&backend, &index_id).await.unwrap().id, index_id);
        assert_eq!(resolve(&backend, "catalog-v1").await.unwrap().id, index_id);
    }

    #[tokio::test]
    async fn test_resolve_name_missing() {
        let backend = InMemoryBackend::new();
        backend.seed_index("catalog-v1", &[]);
        let result = resolve_name(&backend, "catalog-v2").await;
        assert!(matches!(result, Err(AppError::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_name_ambiguous() {
        let backend = InMemoryBackend::new();
        backend.seed_index("catalog-v1", &[]);
        backend.seed_index("catalog-v1", &[]);
        let result = resolve(&backend, "catalog-v1").await;
        assert!(matches!(
            result,
            Err(AppError::AmbiguousIndexName { count: 2, .. })
        ));
    }
}
