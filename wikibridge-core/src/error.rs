//! Error taxonomy for a migration run.
//!
//! Store implementations return boxed errors ([`StoreError`]); the orchestrator
//! classifies them into a [`MigrationError`] variant according to the step that
//! failed, so the report can tell a rejected write apart from a broken download.

/// Error type returned by [`SourceStore`](crate::contract::SourceStore) and
/// [`TargetStore`](crate::contract::TargetStore) implementations.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum MigrationError {
    /// Source store unreachable, or it returned an error for a listing page or a single document.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Document body could not be read as text in its declared dialect.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Target store rejected the page write.
    #[error("upsert failed: {0}")]
    Upsert(String),

    /// Download or upload of a single binary asset failed.
    #[error("attachment {filename} failed: {message}")]
    Attachment { filename: String, message: String },

    /// Parent links of a document form a cycle. Repaired by reparenting to the root.
    #[error("parent cycle detected at document {document_id}; reparented to root")]
    Cycle { document_id: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MigrationError {
    pub fn fetch(e: impl std::fmt::Display) -> Self {
        MigrationError::Fetch(e.to_string())
    }

    pub fn upsert(e: impl std::fmt::Display) -> Self {
        MigrationError::Upsert(e.to_string())
    }

    pub fn attachment(filename: &str, e: impl std::fmt::Display) -> Self {
        MigrationError::Attachment {
            filename: filename.to_string(),
            message: e.to_string(),
        }
    }

    /// Short machine-friendly label of the variant, used in logs and report tables.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationError::Fetch(_) => "FetchError",
            MigrationError::Transform(_) => "TransformError",
            MigrationError::Upsert(_) => "UpsertError",
            MigrationError::Attachment { .. } => "AttachmentError",
            MigrationError::Cycle { .. } => "CycleError",
            MigrationError::Config(_) => "ConfigError",
        }
    }
}
