//! Page hierarchy reconstruction from flat ancestor lists.
//!
//! Documents live in an arena indexed by id; parent links are ids, never
//! references, so a cyclic input cannot create a cycle in memory. A document
//! that lies on a parent cycle is reparented to the root and reported once.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::contract::SourceDocument;
use crate::error::MigrationError;

/// Key of a child group: the root sentinel or a parent document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentKey {
    Root,
    Document(String),
}

#[derive(Debug)]
struct Node {
    id: String,
    /// Effective parent after cycle repair.
    parent: Option<String>,
}

/// Mapping from parent key to ordered direct children (source listing order).
#[derive(Debug, Default)]
pub struct PageTree {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    children: HashMap<ParentKey, Vec<String>>,
    warnings: Vec<MigrationError>,
}

impl PageTree {
    /// Group `documents` by immediate parent, repairing cycles.
    ///
    /// Only the first occurrence of an id is placed. A parent that is not part
    /// of `documents` still forms a group of its own under that id.
    pub fn build(documents: &[SourceDocument]) -> PageTree {
        let mut tree = PageTree::default();
        let mut declared: HashMap<&str, Option<&str>> = HashMap::new();
        let mut order: Vec<&SourceDocument> = Vec::new();
        for doc in documents {
            if declared.contains_key(doc.id.as_str()) {
                continue;
            }
            declared.insert(doc.id.as_str(), doc.parent_id());
            order.push(doc);
        }

        for doc in order {
            let on_cycle = doc.ancestor_ids.iter().any(|a| *a == doc.id)
                || lies_on_cycle(&doc.id, &declared);
            let parent = if on_cycle {
                warn!(document_id = %doc.id, "[SYNC] Parent cycle detected; reparenting to root");
                tree.warnings.push(MigrationError::Cycle {
                    document_id: doc.id.clone(),
                });
                None
            } else {
                doc.parent_id().map(str::to_string)
            };
            let key = match &parent {
                Some(p) => ParentKey::Document(p.clone()),
                None => ParentKey::Root,
            };
            tree.children.entry(key).or_default().push(doc.id.clone());
            tree.index.insert(doc.id.clone(), tree.nodes.len());
            tree.nodes.push(Node {
                id: doc.id.clone(),
                parent,
            });
        }
        tree
    }

    /// Direct children of `key`, in listing order.
    pub fn children(&self, key: &ParentKey) -> &[String] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[String] {
        self.children(&ParentKey::Root)
    }

    /// Effective parent of `id`, or `None` for root-level and unknown documents.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        let idx = *self.index.get(id)?;
        self.nodes[idx].parent.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Ancestors of `id` that are part of the tree, ordered root first.
    ///
    /// The walk stops at the first parent that was not among the built
    /// documents.
    pub fn path_to(&self, id: &str) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if !self.contains(parent) || path.len() >= self.nodes.len() {
                break;
            }
            path.push(parent.to_string());
            current = self.parent_of(parent);
        }
        path.reverse();
        path
    }

    /// Cycle repairs made while building, one per reparented document.
    pub fn warnings(&self) -> &[MigrationError] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }
}

/// Follow declared parent links from `start`; true if the walk returns to it.
/// A walk that runs into a cycle not containing `start` stops at the first
/// repeated node.
fn lies_on_cycle(start: &str, declared: &HashMap<&str, Option<&str>>) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(start);
    let mut current = declared.get(start).copied().flatten();
    while let Some(id) = current {
        if id == start {
            return true;
        }
        if !seen.insert(id) {
            return false;
        }
        current = declared.get(id).copied().flatten();
    }
    false
}
