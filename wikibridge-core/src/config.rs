use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::naming::DEFAULT_MAX_NAME_LEN;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How target namespaces follow the source hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hierarchy {
    /// Namespace is the root followed by the page names of all ancestors.
    #[default]
    Nested,
    /// Every page goes directly under the root namespace.
    Flat,
}

/// Settings for one migration run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Source container: a Confluence space key, a GitHub user, ...
    pub container: String,
    /// First namespace segment on the target, e.g. `Confluence_NETOPS`.
    pub namespace_root: String,
    pub page_size: usize,
    pub hierarchy: Hierarchy,
    /// Fetch, transform and name pages without calling any write endpoint.
    pub dry_run: bool,
    /// Provenance label put in an info box at the top of every page.
    pub banner: Option<String>,
    pub max_name_len: usize,
    /// Bound on every single store call.
    pub timeout: Duration,
}

impl SyncConfig {
    pub fn new(container: impl Into<String>, namespace_root: impl Into<String>) -> Self {
        SyncConfig {
            container: container.into(),
            namespace_root: namespace_root.into(),
            page_size: DEFAULT_PAGE_SIZE,
            hierarchy: Hierarchy::default(),
            dry_run: false,
            banner: None,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            container = %self.container,
            namespace_root = %self.namespace_root,
            page_size = self.page_size,
            hierarchy = ?self.hierarchy,
            dry_run = self.dry_run,
            timeout_secs = self.timeout.as_secs(),
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}

/// Run-wide cancellation request, shared between the caller and the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
