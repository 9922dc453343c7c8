//! Confluence REST source store.
//!
//! Lists the pages of one space with their storage-format body, ancestors and
//! attachment metadata in a single expanded request per listing page. Attachment
//! bytes are only downloaded when the orchestrator asks for them.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::contract::{
    AttachmentRef, Dialect, DocumentBody, DocumentPage, DownloadHandle, FetchFailure,
    SourceDocument, SourceStore,
};
use crate::error::StoreError;

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";
const EXPAND: &str = "body.storage,ancestors,children.attachment";

pub struct ConfluenceClient {
    client: Client,
    base_url: String,
    user: String,
    password: String,
}

impl ConfluenceClient {
    pub fn new(
        base_url: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        info!(base_url = %base_url, "Initialized ConfluenceClient");
        Ok(ConfluenceClient {
            client,
            base_url,
            user: user.into(),
            password: password.into(),
        })
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response, StoreError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, url = %url, "Confluence API returned error");
            return Err(format!("Confluence API error:\n  url: {url}\n  status: {status}\n  response_body: {text}").into());
        }
        Ok(resp)
    }
}

#[async_trait]
impl SourceStore for ConfluenceClient {
    async fn list_documents(
        &self,
        container: &str,
        page_token: Option<String>,
        limit: usize,
    ) -> Result<DocumentPage, StoreError> {
        let start = match page_token {
            Some(token) => token.parse::<usize>()?,
            None => 0,
        };
        let url = format!("{}/rest/api/content", self.base_url);
        let query = [
            ("spaceKey", container.to_string()),
            ("type", "page".to_string()),
            ("start", start.to_string()),
            ("limit", limit.to_string()),
            ("expand", EXPAND.to_string()),
        ];
        info!(space_key = %container, start, limit, "Fetching Confluence pages");
        let json: Value = self.get(&url, &query).await?.json().await?;
        let results = json
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(count = results.len(), "Confluence listing page parsed");

        let entries: Vec<_> = results.iter().enumerate().map(|(i, r)| document_from_json(r, start + i)).collect();
        let next_page_token = next_start_token(start, limit, entries.len());
        Ok(DocumentPage {
            entries,
            next_page_token,
        })
    }

    async fn get_attachment_stream(&self, handle: &DownloadHandle) -> Result<Vec<u8>, StoreError> {
        let url = download_url(&self.base_url, handle.as_str());
        debug!(url = %url, "Downloading Confluence attachment");
        let bytes = self.get(&url, &[]).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// The listing is offset-based; an empty page ends it.
fn next_start_token(start: usize, limit: usize, returned: usize) -> Option<String> {
    (returned > 0).then(|| (start + limit).to_string())
}

/// Download links are either absolute or relative to the base URL.
fn download_url(base_url: &str, locator: &str) -> String {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        locator.to_string()
    } else if locator.starts_with('/') {
        format!("{base_url}{locator}")
    } else {
        format!("{base_url}/{locator}")
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
}

/// Map one `results[]` entry of the content listing. `position` names the
/// entry in the failure when it carries no id.
pub fn document_from_json(value: &Value, position: usize) -> Result<SourceDocument, FetchFailure> {
    let id = match value.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(FetchFailure {
                document_id: format!("listing#{position}"),
                message: "content entry without an id".to_string(),
            })
        }
    };
    let title = str_at(value, &["title"]).unwrap_or_default().to_string();
    let body = str_at(value, &["body", "storage", "value"]).unwrap_or_default().to_string();
    let ancestor_ids = value
        .get("ancestors")
        .and_then(Value::as_array)
        .map(|ancestors| {
            ancestors
                .iter()
                .filter_map(|a| match a.get("id") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let attachments = value
        .pointer("/children/attachment/results")
        .and_then(Value::as_array)
        .map(|results| results.iter().filter_map(attachment_from_json).collect())
        .unwrap_or_default();
    Ok(SourceDocument {
        id,
        title,
        body: DocumentBody::Markup(body),
        dialect: Dialect::ConfluenceStorage,
        ancestor_ids,
        attachments,
    })
}

/// Attachments without a title or download link cannot be migrated and are skipped.
fn attachment_from_json(value: &Value) -> Option<AttachmentRef> {
    let filename = str_at(value, &["title"]).filter(|t| !t.is_empty())?;
    let download = str_at(value, &["_links", "download"]).filter(|d| !d.is_empty())?;
    let media_type = str_at(value, &["extensions", "mediaType"])
        .or_else(|| str_at(value, &["metadata", "mediaType"]))
        .unwrap_or(DEFAULT_MEDIA_TYPE);
    Some(AttachmentRef {
        filename: filename.to_string(),
        media_type: media_type.to_string(),
        handle: DownloadHandle::new(download),
    })
}
