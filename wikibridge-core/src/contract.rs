//! # contract: shared data model and store interfaces
//!
//! This module defines the plain-data types that flow through a migration run
//! and the two traits that separate the engine from concrete HTTP clients:
//!
//! - [`SourceStore`]: paginated, read-only access to the system content is migrated *from*.
//! - [`TargetStore`]: write access to the wiki content is migrated *into*.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall` so consumers can generate deterministic
//! mocks for unit/integration tests (`MockSourceStore`, `MockTargetStore`). The mocks
//! are exported when the `test-export-mocks` feature is enabled (the default).
//!
//! ## Error Handling
//! Store methods return [`StoreError`] (a boxed error). Implementors should keep the
//! upstream status and body in the message; the orchestrator decides which
//! [`MigrationError`](crate::error::MigrationError) variant it becomes.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;

/// Syntax identifier of the canonical target markup.
pub const CANONICAL_SYNTAX: &str = "xwiki/2.1";

/// Source-specific markup or text format of a document body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Confluence storage format (XHTML with `ac:`/`ri:` macro elements).
    ConfluenceStorage,
    Markdown,
    /// Ordered Word paragraphs with style names and formatted runs.
    DocxParagraphs,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::ConfluenceStorage => "confluence_storage",
            Dialect::Markdown => "markdown",
            Dialect::DocxParagraphs => "docx_paragraphs",
        };
        f.write_str(name)
    }
}

/// One formatted span of text inside a Word paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Run {
            text: text.into(),
            ..Run::default()
        }
    }
}

/// A Word paragraph: its style *name* (e.g. "Heading 1", "List Paragraph") and runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    pub style: String,
    pub runs: Vec<Run>,
}

impl Paragraph {
    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Raw body of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentBody {
    /// Markup text (Confluence storage XHTML or Markdown).
    Markup(String),
    /// Paragraph stream read from a Word document.
    Paragraphs(Vec<Paragraph>),
}

/// Opaque locator for a binary asset. Only the source store that produced it knows
/// how to resolve it; the bytes are not fetched until the attachment is migrated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadHandle(String);

impl DownloadHandle {
    pub fn new(locator: impl Into<String>) -> Self {
        DownloadHandle(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A named binary asset belonging to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub filename: String,
    pub media_type: String,
    pub handle: DownloadHandle,
}

/// One unit of content to migrate. Immutable once read from the source store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Stable source-system identifier, unique within a run.
    pub id: String,
    pub title: String,
    pub body: DocumentBody,
    pub dialect: Dialect,
    /// Ancestor identifiers ordered from the root to the immediate parent.
    pub ancestor_ids: Vec<String>,
    pub attachments: Vec<AttachmentRef>,
}

impl SourceDocument {
    /// A document with a markup body and no ancestors or attachments.
    pub fn markup(
        id: impl Into<String>,
        title: impl Into<String>,
        dialect: Dialect,
        body: impl Into<String>,
    ) -> Self {
        SourceDocument {
            id: id.into(),
            title: title.into(),
            body: DocumentBody::Markup(body.into()),
            dialect,
            ancestor_ids: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_ancestors<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ancestor_ids = ancestors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Immediate parent identifier, if any.
    pub fn parent_id(&self) -> Option<&str> {
        self.ancestor_ids.last().map(String::as_str)
    }
}

/// Logical container of target pages, as ordered space segments (root first).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn root(name: impl Into<String>) -> Self {
        Namespace(vec![name.into()])
    }

    /// Parses a dot-separated reference such as `Confluence_NETOPS.Setup_Guide`.
    pub fn parse(dotted: &str) -> Self {
        Namespace(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Namespace(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// The canonical output unit written to the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetPage {
    pub namespace: Namespace,
    /// Sanitized identifier, unique within the run.
    pub page_name: String,
    /// Original, unsanitized title.
    pub title: String,
    pub content: String,
    /// Markup dialect of `content`, for the target store to interpret.
    pub syntax_tag: String,
}

/// A single binary upload addressed to an already-written target page.
pub struct NewAttachment<'a> {
    pub namespace: &'a Namespace,
    pub page_name: &'a str,
    pub filename: &'a str,
    pub bytes: &'a [u8],
    pub media_type: &'a str,
}

/// A document that the source listed but could not deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub document_id: String,
    pub message: String,
}

/// One page of a source listing.
#[derive(Debug)]
pub struct DocumentPage {
    pub entries: Vec<Result<SourceDocument, FetchFailure>>,
    /// Token for the following page; `None` when the store knows it was the last page.
    pub next_page_token: Option<String>,
}

/// Read-only, paginated access to the system content is migrated from.
///
/// The trait is `Send + Sync` and intended for async/await usage.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// List one page of documents in `container` (a space key, a user, ...).
    ///
    /// `page_token` is `None` for the first page and otherwise the
    /// `next_page_token` returned by the previous call. `limit` is the requested
    /// page size.
    async fn list_documents(
        &self,
        container: &str,
        page_token: Option<String>,
        limit: usize,
    ) -> Result<DocumentPage, StoreError>;

    /// Download the bytes behind an attachment handle.
    async fn get_attachment_stream(&self, handle: &DownloadHandle) -> Result<Vec<u8>, StoreError>;
}

/// Write access to the target wiki.
///
/// Writes are create-or-update keyed by namespace and page name.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Create or replace a page. Returns the page location (URL).
    async fn upsert_page(&self, page: &TargetPage) -> Result<String, StoreError>;

    /// Upload one attachment to an existing page. Returns the attachment location.
    async fn put_attachment<'a>(&self, attachment: NewAttachment<'a>) -> Result<String, StoreError>;

    /// List page names directly inside `namespace`.
    async fn list_pages(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError>;
}
