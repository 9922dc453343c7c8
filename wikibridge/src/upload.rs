#![doc = "XWiki REST client: the target store used by every CLI command that writes pages."]
//
//! # Target Store Integration (CLI <-> Core)
//!
//! Implements [`TargetStore`] against the XWiki REST API:
//!
//! - Pages are written with `PUT .../spaces/<seg>/.../pages/<page>` and an XML page document.
//! - Attachments are written with `PUT .../pages/<page>/attachments/<filename>`.
//! - Page listing reads the JSON page summaries of one space.
//!
//! Every path segment is percent-encoded. Non-success statuses become errors
//! carrying the URL, status and response body.

use async_trait::async_trait;
use quick_xml::escape::escape;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use wikibridge_core::contract::{Namespace, NewAttachment, TargetPage, TargetStore};
use wikibridge_core::error::StoreError;

const WIKI: &str = "xwiki";

pub struct XWikiClient {
    client: Client,
    base_url: Url,
    user: String,
    password: String,
}

impl XWikiClient {
    /// `base_url` is the XWiki web application root, e.g. `http://localhost:8085/xwiki`.
    pub fn new(
        base_url: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            return Err(format!("XWiki URL {base_url} cannot be used as a base").into());
        }
        let client = Client::builder().timeout(timeout).build()?;
        let user = user.into();
        info!(base_url = %base_url, user = %user, "Initialized XWikiClient");
        Ok(XWikiClient {
            client,
            base_url,
            user,
            password: password.into(),
        })
    }

    /// Base URL extended with literal segments, each percent-encoded.
    fn url<'a, I>(&self, segments: I) -> Result<Url, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| format!("XWiki URL {} cannot be used as a base", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn space_segments(namespace: &Namespace) -> Vec<&str> {
        namespace
            .segments()
            .iter()
            .flat_map(|s| ["spaces", s.as_str()])
            .collect()
    }

    fn page_url(&self, namespace: &Namespace, page_name: &str, tail: &[&str]) -> Result<Url, StoreError> {
        let mut segments = vec!["rest", "wikis", WIKI];
        segments.extend(Self::space_segments(namespace));
        segments.extend(["pages", page_name]);
        segments.extend(tail);
        self.url(segments)
    }

    /// Browser location of a page.
    pub fn view_url(&self, namespace: &Namespace, page_name: &str) -> Result<Url, StoreError> {
        let mut segments = vec!["bin", "view"];
        segments.extend(namespace.segments().iter().map(String::as_str));
        segments.push(page_name);
        self.url(segments)
    }

    async fn check(resp: reqwest::Response, url: &Url) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        error!(status = %status, url = %url, "XWiki API returned error");
        Err(format!("XWiki API error:\n  url: {url}\n  status: {status}\n  response_body: {text}").into())
    }
}

/// XML page document accepted by the XWiki REST page resource.
pub fn page_xml(title: &str, syntax: &str, content: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <page xmlns=\"http://www.xwiki.org\">\
         <title>{}</title><syntax>{}</syntax><content>{}</content></page>",
        escape(title),
        escape(syntax),
        escape(content)
    )
}

#[derive(Debug, Deserialize)]
struct PageSummaries {
    #[serde(rename = "pageSummaries", default)]
    page_summaries: Vec<PageSummary>,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    name: String,
}

#[async_trait]
impl TargetStore for XWikiClient {
    async fn upsert_page(&self, page: &TargetPage) -> Result<String, StoreError> {
        let url = self.page_url(&page.namespace, &page.page_name, &[])?;
        let body = page_xml(&page.title, &page.syntax_tag, &page.content);
        debug!(url = %url, bytes = body.len(), "[SYNC][UPLOAD] PUT page");
        let resp = self
            .client
            .put(url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await?;
        let resp = Self::check(resp, &url).await?;
        info!(url = %url, status = %resp.status(), "[SYNC][UPLOAD] Page stored");
        Ok(self.view_url(&page.namespace, &page.page_name)?.to_string())
    }

    async fn put_attachment<'a>(&self, attachment: NewAttachment<'a>) -> Result<String, StoreError> {
        let url = self.page_url(
            attachment.namespace,
            attachment.page_name,
            &["attachments", attachment.filename],
        )?;
        debug!(url = %url, size = attachment.bytes.len(), "[SYNC][ATTACH] PUT attachment");
        let resp = self
            .client
            .put(url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .header("Content-Type", attachment.media_type)
            .body(attachment.bytes.to_vec())
            .send()
            .await?;
        Self::check(resp, &url).await?;
        Ok(url.to_string())
    }

    async fn list_pages(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        let mut segments = vec!["rest", "wikis", WIKI];
        segments.extend(Self::space_segments(namespace));
        segments.push("pages");
        let url = self.url(segments)?;
        let resp = self
            .client
            .get(url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(url = %url, "Namespace does not exist");
            return Ok(Vec::new());
        }
        let summaries: PageSummaries = Self::check(resp, &url).await?.json().await?;
        Ok(summaries.page_summaries.into_iter().map(|p| p.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> XWikiClient {
        XWikiClient::new("http://localhost:8085/xwiki/", "admin", "pw", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn page_urls_nest_spaces_and_encode_segments() {
        let ns = Namespace::parse("Confluence_NETOPS.Setup Guide");
        let url = client().page_url(&ns, "Intro", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8085/xwiki/rest/wikis/xwiki/spaces/Confluence_NETOPS/spaces/Setup%20Guide/pages/Intro"
        );
        let view = client().view_url(&ns, "Intro").unwrap();
        assert_eq!(view.as_str(), "http://localhost:8085/xwiki/bin/view/Confluence_NETOPS/Setup%20Guide/Intro");
    }

    #[test]
    fn page_xml_escapes_markup() {
        let xml = page_xml("A & B", "xwiki/2.1", "[[x>>y]] <b>");
        assert!(xml.contains("<title>A &amp; B</title>"));
        assert!(xml.contains("<content>[[x&gt;&gt;y]] &lt;b&gt;</content>"));
    }
}
