//! GitHub source store: one Markdown document per repository of a user, built
//! from the repository metadata, its language breakdown and its README.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::contract::{
    Dialect, DocumentPage, DownloadHandle, FetchFailure, SourceDocument, SourceStore,
};
use crate::error::StoreError;

pub const GITHUB_API: &str = "https://api.github.com";

pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        GitHubClient::with_api_base(GITHUB_API, token, timeout)
    }

    pub fn with_api_base(
        api_base: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wikibridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        info!(api_base, token_set = token.is_some(), "Initialized GitHubClient");
        Ok(GitHubClient {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `None` when the resource does not exist.
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Option<Value>, StoreError> {
        let resp = self.request(url).query(query).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("GitHub API error:\n  url: {url}\n  status: {status}\n  response_body: {text}").into());
        }
        Ok(Some(resp.json().await?))
    }

    async fn readme(&self, owner: &str, repo: &str) -> Result<Option<String>, StoreError> {
        let url = format!("{}/repos/{owner}/{repo}/readme", self.api_base);
        match self.get_json(&url, &[]).await? {
            Some(json) => Ok(Some(decode_readme(&json)?)),
            None => Ok(None),
        }
    }

    async fn languages(&self, owner: &str, repo: &str) -> Result<Vec<(String, u64)>, StoreError> {
        let url = format!("{}/repos/{owner}/{repo}/languages", self.api_base);
        let json = self.get_json(&url, &[]).await?.unwrap_or(Value::Null);
        let mut languages: Vec<(String, u64)> = json
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(lang, bytes)| (lang.clone(), bytes.as_u64().unwrap_or(0)))
                    .collect()
            })
            .unwrap_or_default();
        languages.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(languages)
    }

    async fn repository_document(&self, user: &str, repo: &Value) -> Result<SourceDocument, FetchFailure> {
        let name = repo.get("name").and_then(Value::as_str).unwrap_or_default();
        let id = match repo.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => {
                return Err(FetchFailure {
                    document_id: name.to_string(),
                    message: "repository entry without an id".to_string(),
                })
            }
        };
        if name.is_empty() {
            return Err(FetchFailure {
                document_id: id,
                message: "repository entry without a name".to_string(),
            });
        }
        let owner = repo
            .pointer("/owner/login")
            .and_then(Value::as_str)
            .unwrap_or(user);
        let failure = |e: StoreError| FetchFailure {
            document_id: id.clone(),
            message: format!("{name}: {e}"),
        };
        let readme = self.readme(owner, name).await.map_err(failure)?;
        let languages = self.languages(owner, name).await.map_err(failure)?;
        debug!(repo = name, readme = readme.is_some(), languages = languages.len(), "Repository fetched");
        Ok(SourceDocument::markup(
            id.clone(),
            name,
            Dialect::Markdown,
            build_page_content(repo, readme.as_deref(), &languages),
        ))
    }
}

#[async_trait]
impl SourceStore for GitHubClient {
    /// `container` is the GitHub user; the page token is the 1-based page number.
    async fn list_documents(
        &self,
        container: &str,
        page_token: Option<String>,
        limit: usize,
    ) -> Result<DocumentPage, StoreError> {
        let page = match page_token {
            Some(token) => token.parse::<usize>()?,
            None => 1,
        };
        let url = format!("{}/users/{container}/repos", self.api_base);
        let query = [
            ("per_page", limit.to_string()),
            ("page", page.to_string()),
            ("sort", "updated".to_string()),
        ];
        info!(user = %container, page, limit, "Fetching GitHub repositories");
        let repos = match self.get_json(&url, &query).await? {
            Some(Value::Array(repos)) => repos,
            Some(_) => return Err(format!("unexpected repository listing for {container}").into()),
            None => return Err(format!("GitHub user {container} not found").into()),
        };

        let mut entries = Vec::with_capacity(repos.len());
        for repo in &repos {
            let entry = self.repository_document(container, repo).await;
            if let Err(failure) = &entry {
                warn!(document_id = %failure.document_id, error = %failure.message, "Repository fetch failed");
            }
            entries.push(entry);
        }
        let next_page_token = next_page_token(page, entries.len());
        Ok(DocumentPage {
            entries,
            next_page_token,
        })
    }

    async fn get_attachment_stream(&self, handle: &DownloadHandle) -> Result<Vec<u8>, StoreError> {
        Err(format!("GitHub documents carry no attachments (handle {})", handle.as_str()).into())
    }
}

/// Page numbers are 1-based; an empty page ends the listing.
fn next_page_token(page: usize, returned: usize) -> Option<String> {
    (returned > 0).then(|| (page + 1).to_string())
}

/// README `content` is base64 wrapped at 60 columns; invalid UTF-8 is replaced.
pub fn decode_readme(json: &Value) -> Result<String, StoreError> {
    let encoded: String = json
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD.decode(encoded)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn field<'a>(repo: &'a Value, key: &str) -> Option<&'a Value> {
    repo.get(key).filter(|v| !v.is_null())
}

fn text_field(repo: &Value, key: &str, fallback: &str) -> String {
    match field(repo, key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) | None => fallback.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Markdown page for one repository: metadata lines, language shares, README.
pub fn build_page_content(repo: &Value, readme: Option<&str>, languages: &[(String, u64)]) -> String {
    let html_url = text_field(repo, "html_url", "");
    let mut lines = vec![
        format!("# {}", text_field(repo, "name", "")),
        String::new(),
        format!("**Description:** {}", text_field(repo, "description", "No description")),
        format!("**URL:** [{html_url}]({html_url})"),
        format!(
            "**Stars:** {} | **Forks:** {} | **Language:** {}",
            text_field(repo, "stargazers_count", "0"),
            text_field(repo, "forks_count", "0"),
            text_field(repo, "language", "N/A")
        ),
        format!("**Last updated:** {}", text_field(repo, "updated_at", "unknown")),
        format!("**Default branch:** {}", text_field(repo, "default_branch", "main")),
        String::new(),
    ];

    if !languages.is_empty() {
        lines.push("## Languages".to_string());
        lines.push(String::new());
        let total: u64 = languages.iter().map(|(_, b)| b).sum();
        for (lang, bytes) in languages {
            let pct = if total > 0 {
                *bytes as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            lines.push(format!("* **{lang}**: {pct:.1}%"));
        }
        lines.push(String::new());
    }

    if let Some(readme) = readme.filter(|r| !r.is_empty()) {
        lines.push("---".to_string());
        lines.push(String::new());
        lines.push("## README".to_string());
        lines.push(String::new());
        lines.push(readme.to_string());
    }
    lines.join("\n")
}
