//! In-memory source store, for documents that are already loaded (a Word file
//! read from disk, fixtures).

use async_trait::async_trait;
use std::collections::HashMap;

use crate::contract::{DocumentPage, DownloadHandle, SourceDocument, SourceStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct StaticSource {
    documents: Vec<SourceDocument>,
    blobs: HashMap<String, Vec<u8>>,
}

impl StaticSource {
    pub fn new(documents: Vec<SourceDocument>) -> Self {
        StaticSource {
            documents,
            blobs: HashMap::new(),
        }
    }

    /// Make `bytes` downloadable under `handle`.
    pub fn with_blob(mut self, handle: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.blobs.insert(handle.into(), bytes);
        self
    }
}

#[async_trait]
impl SourceStore for StaticSource {
    /// The container is ignored; the token is a start offset.
    async fn list_documents(
        &self,
        _container: &str,
        page_token: Option<String>,
        limit: usize,
    ) -> Result<DocumentPage, StoreError> {
        let start = match page_token {
            Some(token) => token.parse::<usize>()?,
            None => 0,
        };
        let end = start.saturating_add(limit).min(self.documents.len());
        let entries = self
            .documents
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        let next_page_token = (end < self.documents.len()).then(|| end.to_string());
        Ok(DocumentPage {
            entries,
            next_page_token,
        })
    }

    async fn get_attachment_stream(&self, handle: &DownloadHandle) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| format!("no attachment behind handle {}", handle.as_str()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Dialect;

    #[tokio::test]
    async fn pages_by_offset() {
        let docs = (0..3)
            .map(|i| SourceDocument::markup(i.to_string(), format!("Doc {i}"), Dialect::Markdown, ""))
            .collect();
        let store = StaticSource::new(docs);
        let first = store.list_documents("x", None, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));
        let second = store.list_documents("x", first.next_page_token, 2).await.unwrap();
        assert_eq!(second.entries.len(), 1);
        assert!(second.next_page_token.is_none());
    }
}
