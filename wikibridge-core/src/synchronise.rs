//! Batch pipeline: page through a source store and write every document to a target store.
//!
//! One run walks each document through `fetched → transformed → upserted →
//! attachments migrated`, strictly in listing order and one document at a time:
//!   - Pages through [`SourceStore::list_documents`] until an empty page, a short
//!     page, or a missing next token
//!   - Rebuilds the hierarchy with [`PageTree`] and assigns every page name up front
//!     through one [`NameRegistry`], so a re-run with the same listing produces the
//!     same names
//!   - Rewrites each body into canonical markup, upserts the page, then copies
//!     attachments one by one
//!
//! # Error Handling
//! A failing listing call is fatal and returned as [`MigrationError::Fetch`].
//! Anything scoped to one document (unavailable document, rewrite error, rejected
//! write, broken attachment, timeout) is recorded in the [`MigrationReport`] and
//! the run carries on with the next document.
//!
//! # Cancellation
//! The [`CancelFlag`] is checked before each listing page and before each
//! document. A cancelled run returns the partial report; a document that has
//! started always runs to completion.

use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

use crate::attachments::migrate_attachment;
use crate::config::{CancelFlag, Hierarchy, SyncConfig};
use crate::contract::{
    FetchFailure, Namespace, SourceDocument, SourceStore, TargetPage, TargetStore,
    CANONICAL_SYNTAX,
};
use crate::error::MigrationError;
use crate::naming::NameRegistry;
use crate::report::{DocumentOutcome, DocumentStatus, MigrationReport};
use crate::rewrite::rewrite_body;
use crate::tree::PageTree;

/// One listing entry, kept in listing order.
enum Listed {
    Document(SourceDocument),
    Unavailable(FetchFailure),
    Duplicate(SourceDocument),
}

/// Run one migration from `source` into `target`.
pub async fn synchronise<S, T>(
    config: &SyncConfig,
    source: &S,
    target: &T,
    cancel: &CancelFlag,
) -> Result<MigrationReport, MigrationError>
where
    S: SourceStore + ?Sized,
    T: TargetStore + ?Sized,
{
    info!(
        container = %config.container,
        namespace_root = %config.namespace_root,
        dry_run = config.dry_run,
        "[SYNC] Starting migration run"
    );
    if config.page_size == 0 {
        return Err(MigrationError::Config("page size must be at least 1".into()));
    }
    let mut report = MigrationReport::new();

    let listed = match list_all(config, source, cancel).await {
        Ok(listed) => listed,
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Listing failed; aborting run");
            return Err(e);
        }
    };
    if cancel.is_cancelled() {
        report.mark_cancelled();
    }

    let documents: Vec<SourceDocument> = listed
        .iter()
        .filter_map(|entry| match entry {
            Listed::Document(doc) => Some(doc.clone()),
            _ => None,
        })
        .collect();
    let tree = PageTree::build(&documents);
    for warning in tree.warnings() {
        report.record_warning(warning.clone());
    }

    let mut registry = NameRegistry::new(config.max_name_len);
    let names: HashMap<String, String> = documents
        .iter()
        .map(|doc| (doc.id.clone(), registry.assign(&doc.title, &doc.id)))
        .collect();
    info!(
        documents = documents.len(),
        listed = listed.len(),
        "[SYNC] Listing complete; names assigned"
    );

    for entry in &listed {
        if cancel.is_cancelled() {
            warn!("[SYNC] Cancellation requested; stopping before next document");
            report.mark_cancelled();
            break;
        }
        match entry {
            Listed::Document(doc) => {
                let namespace = resolve_namespace(config, &tree, &names, &doc.id);
                let page_name = names.get(&doc.id).cloned().unwrap_or_default();
                process_document(config, source, target, doc, namespace, page_name, &mut report).await;
            }
            Listed::Unavailable(failure) => {
                error!(
                    document_id = %failure.document_id,
                    error = %failure.message,
                    "[SYNC][ERROR] Source could not deliver document"
                );
                report.record_failed(
                    &failure.document_id,
                    "",
                    MigrationError::Fetch(failure.message.clone()),
                );
            }
            Listed::Duplicate(doc) => {
                error!(document_id = %doc.id, "[SYNC][ERROR] Duplicate document id in listing");
                report.record_failed(
                    &doc.id,
                    &doc.title,
                    MigrationError::Fetch(format!("duplicate document id {} in listing", doc.id)),
                );
            }
        }
    }

    info!(
        processed = report.processed(),
        succeeded = report.succeeded(),
        partial = report.partial(),
        failed = report.failed(),
        cancelled = report.cancelled(),
        "[SYNC] Migration run finished"
    );
    Ok(report)
}

/// Collect every listing page. Stops early, without error, on cancellation.
async fn list_all<S>(
    config: &SyncConfig,
    source: &S,
    cancel: &CancelFlag,
) -> Result<Vec<Listed>, MigrationError>
where
    S: SourceStore + ?Sized,
{
    let mut listed = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut token: Option<String> = None;
    let mut page_number = 0usize;
    loop {
        if cancel.is_cancelled() {
            warn!(page_number, "[SYNC] Cancellation requested; stopping listing");
            break;
        }
        page_number += 1;
        let call = source.list_documents(&config.container, token.clone(), config.page_size);
        let page = match tokio::time::timeout(config.timeout, call).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(MigrationError::fetch(format!("listing page {page_number}: {e}"))),
            Err(_) => {
                return Err(MigrationError::fetch(format!(
                    "listing page {page_number} timed out after {:?}",
                    config.timeout
                )))
            }
        };
        let count = page.entries.len();
        debug!(page_number, count, next = ?page.next_page_token, "[SYNC] Listing page received");
        for entry in page.entries {
            listed.push(match entry {
                Ok(doc) if !seen.insert(doc.id.clone()) => Listed::Duplicate(doc),
                Ok(doc) => Listed::Document(doc),
                Err(failure) => Listed::Unavailable(failure),
            });
        }
        match page.next_page_token {
            Some(next) if count > 0 && count >= config.page_size => token = Some(next),
            _ => break,
        }
    }
    Ok(listed)
}

fn resolve_namespace(
    config: &SyncConfig,
    tree: &PageTree,
    names: &HashMap<String, String>,
    document_id: &str,
) -> Namespace {
    let root = Namespace::root(config.namespace_root.clone());
    match config.hierarchy {
        Hierarchy::Flat => root,
        Hierarchy::Nested => tree
            .path_to(document_id)
            .iter()
            .filter_map(|ancestor| names.get(ancestor))
            .fold(root, |ns, name| ns.child(name.clone())),
    }
}

fn provenance_banner(label: &str, document_id: &str) -> String {
    format!("{{{{info}}}}\nMigrated from {label}, page ID {document_id}.\n{{{{/info}}}}\n\n")
}

async fn process_document<S, T>(
    config: &SyncConfig,
    source: &S,
    target: &T,
    doc: &SourceDocument,
    namespace: Namespace,
    page_name: String,
    report: &mut MigrationReport,
) where
    S: SourceStore + ?Sized,
    T: TargetStore + ?Sized,
{
    info!(document_id = %doc.id, title = %doc.title, "[SYNC] Processing document");

    let content = match rewrite_body(&doc.body, doc.dialect) {
        Ok(content) => content,
        Err(e) => {
            error!(document_id = %doc.id, error = %e, "[SYNC][ERROR] Rewrite failed");
            report.record_failed(&doc.id, &doc.title, e);
            return;
        }
    };
    let content = match &config.banner {
        Some(label) => provenance_banner(label, &doc.id) + &content,
        None => content,
    };
    let page = TargetPage {
        namespace,
        page_name,
        title: doc.title.clone(),
        content,
        syntax_tag: CANONICAL_SYNTAX.to_string(),
    };

    if config.dry_run {
        info!(
            document_id = %doc.id,
            namespace = %page.namespace,
            page_name = %page.page_name,
            "[SYNC] Dry run: page planned"
        );
        report.record_outcome(DocumentOutcome::for_page(&doc.id, &page, DocumentStatus::Planned, None));
        return;
    }

    info!(namespace = %page.namespace, page_name = %page.page_name, "[SYNC][UPLOAD] Upserting page");
    let location = match tokio::time::timeout(config.timeout, target.upsert_page(&page)).await {
        Ok(Ok(location)) => location,
        Ok(Err(e)) => {
            error!(document_id = %doc.id, error = %e, "[SYNC][ERROR][UPLOAD] Upsert failed");
            fail_page(report, &doc.id, &page, MigrationError::upsert(e));
            return;
        }
        Err(_) => {
            error!(document_id = %doc.id, "[SYNC][ERROR][UPLOAD] Upsert timed out");
            fail_page(report, &doc.id, &page, MigrationError::upsert("timed out"));
            return;
        }
    };
    info!(document_id = %doc.id, %location, "[SYNC][UPLOAD] Page upserted");

    let mut attachment_failed = false;
    for attachment in &doc.attachments {
        let migrated = migrate_attachment(
            source,
            target,
            &page.namespace,
            &page.page_name,
            attachment,
            config.timeout,
        )
        .await;
        if let Err(e) = migrated {
            warn!(
                document_id = %doc.id,
                filename = %attachment.filename,
                error = %e,
                "[SYNC][ATTACH] Attachment failed; continuing with the rest"
            );
            report.record_failure(&doc.id, e);
            attachment_failed = true;
        }
    }

    let status = if attachment_failed {
        DocumentStatus::Partial
    } else {
        DocumentStatus::Succeeded
    };
    report.record_outcome(DocumentOutcome::for_page(&doc.id, &page, status, Some(location)));
}

fn fail_page(report: &mut MigrationReport, document_id: &str, page: &TargetPage, error: MigrationError) {
    report.record_failure(document_id, error);
    report.record_outcome(DocumentOutcome::for_page(document_id, page, DocumentStatus::Failed, None));
}
