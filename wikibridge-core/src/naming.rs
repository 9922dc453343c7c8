//! Title to page-name sanitisation with per-run collision avoidance.

use std::collections::HashSet;

/// Maximum page-name length accepted by the target wiki.
pub const DEFAULT_MAX_NAME_LEN: usize = 100;

/// Smallest length a registry accepts, so collision suffixes up to `_9999999`
/// still fit.
pub const MIN_NAME_LEN: usize = 8;

/// Replace every character outside `[A-Za-z0-9_-]` with `_` and truncate to
/// `max_len` characters.
pub fn sanitize(title: &str, max_len: usize) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect()
}

/// Names handed out during one run. Same titles in the same order always
/// produce the same names.
#[derive(Debug)]
pub struct NameRegistry {
    max_len: usize,
    assigned: HashSet<String>,
}

impl Default for NameRegistry {
    fn default() -> Self {
        NameRegistry::new(DEFAULT_MAX_NAME_LEN)
    }
}

impl NameRegistry {
    /// `max_len` below [`MIN_NAME_LEN`] is raised to it.
    pub fn new(max_len: usize) -> Self {
        NameRegistry {
            max_len: max_len.max(MIN_NAME_LEN),
            assigned: HashSet::new(),
        }
    }

    /// Assign a unique page name for `title`.
    ///
    /// Titles with no letters or digits left after sanitising fall back to a
    /// name built from `document_id`. Collisions get `_2`, `_3`, ... with the
    /// base shortened so the suffix still fits.
    pub fn assign(&mut self, title: &str, document_id: &str) -> String {
        let mut base = sanitize(title, self.max_len);
        if !base.chars().any(|c| c.is_ascii_alphanumeric()) {
            base = sanitize(&format!("Page_{document_id}"), self.max_len);
        }
        if self.assigned.insert(base.clone()) {
            return base;
        }
        let mut counter = 2usize;
        loop {
            let suffix = format!("_{counter}");
            let keep = self.max_len.saturating_sub(suffix.len());
            let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
            if self.assigned.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assigned.contains(name)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
