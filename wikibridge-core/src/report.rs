//! Aggregate result of one migration run.
//!
//! The orchestrator appends to the report while the run is going; callers only
//! get read access afterwards.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::contract::TargetPage;
use crate::error::MigrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Page written and every attachment migrated.
    Succeeded,
    /// Page written, at least one attachment failed.
    Partial,
    Failed,
    /// Dry run: the page would have been written.
    Planned,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentStatus::Succeeded => "succeeded",
            DocumentStatus::Partial => "partial",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Planned => "planned",
        };
        f.write_str(label)
    }
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub title: String,
    /// Dotted target namespace; empty when the document never got one.
    pub namespace: String,
    pub page_name: String,
    pub status: DocumentStatus,
    pub location: Option<String>,
    /// SHA-256 of the canonical content, when the document got that far.
    pub content_sha256: Option<String>,
}

impl DocumentOutcome {
    pub(crate) fn for_page(
        document_id: &str,
        page: &TargetPage,
        status: DocumentStatus,
        location: Option<String>,
    ) -> Self {
        DocumentOutcome {
            document_id: document_id.to_string(),
            title: page.title.clone(),
            namespace: page.namespace.to_string(),
            page_name: page.page_name.clone(),
            status,
            location,
            content_sha256: Some(content_hash(&page.content)),
        }
    }
}

pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    run_id: Uuid,
    processed: usize,
    succeeded: usize,
    partial: usize,
    failed: usize,
    failures: Vec<(String, MigrationError)>,
    warnings: Vec<MigrationError>,
    outcomes: Vec<DocumentOutcome>,
    cancelled: bool,
}

impl Default for MigrationReport {
    fn default() -> Self {
        MigrationReport::new()
    }
}

impl MigrationReport {
    pub fn new() -> Self {
        MigrationReport {
            run_id: Uuid::new_v4(),
            processed: 0,
            succeeded: 0,
            partial: 0,
            failed: 0,
            failures: Vec::new(),
            warnings: Vec::new(),
            outcomes: Vec::new(),
            cancelled: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn partial(&self) -> usize {
        self.partial
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Planned pages of a dry run.
    pub fn planned(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DocumentStatus::Planned)
            .count()
    }

    pub fn failures(&self) -> &[(String, MigrationError)] {
        &self.failures
    }

    pub fn warnings(&self) -> &[MigrationError] {
        &self.warnings
    }

    pub fn outcomes(&self) -> &[DocumentOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, document_id: &str) -> Option<&DocumentOutcome> {
        self.outcomes.iter().find(|o| o.document_id == document_id)
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn record_warning(&mut self, warning: MigrationError) {
        self.warnings.push(warning);
    }

    pub(crate) fn record_failure(&mut self, document_id: &str, error: MigrationError) {
        self.failures.push((document_id.to_string(), error));
    }

    /// Count one finished document. Per-attachment failures are recorded
    /// separately through [`record_failure`](Self::record_failure).
    pub(crate) fn record_outcome(&mut self, outcome: DocumentOutcome) {
        self.processed += 1;
        match outcome.status {
            DocumentStatus::Succeeded => self.succeeded += 1,
            DocumentStatus::Partial => self.partial += 1,
            DocumentStatus::Failed => self.failed += 1,
            DocumentStatus::Planned => {}
        }
        self.outcomes.push(outcome);
    }

    /// A document that failed before it had a page.
    pub(crate) fn record_failed(&mut self, document_id: &str, title: &str, error: MigrationError) {
        self.record_failure(document_id, error);
        self.record_outcome(DocumentOutcome {
            document_id: document_id.to_string(),
            title: title.to_string(),
            namespace: String::new(),
            page_name: String::new(),
            status: DocumentStatus::Failed,
            location: None,
            content_sha256: None,
        });
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migration run {}", self.run_id)?;
        writeln!(
            f,
            "processed: {}  succeeded: {}  partial: {}  failed: {}  planned: {}",
            self.processed,
            self.succeeded,
            self.partial,
            self.failed,
            self.planned()
        )?;
        if self.cancelled {
            writeln!(f, "run was cancelled before all documents were processed")?;
        }
        if !self.outcomes.is_empty() {
            writeln!(f)?;
            writeln!(f, "{:<10} {:<16} {:<40} TARGET", "STATUS", "DOCUMENT", "TITLE")?;
            for o in &self.outcomes {
                let target = if o.page_name.is_empty() {
                    "-".to_string()
                } else {
                    format!("{}.{}", o.namespace, o.page_name)
                };
                writeln!(f, "{:<10} {:<16} {:<40} {}", o.status, o.document_id, o.title, target)?;
            }
        }
        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures:")?;
            for (id, e) in &self.failures {
                writeln!(f, "  {id} [{}] {e}", e.kind())?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings:")?;
            for w in &self.warnings {
                writeln!(f, "  [{}] {w}", w.kind())?;
            }
        }
        Ok(())
    }
}
