use wikibridge_core::contract::{Dialect, SourceDocument};
use wikibridge_core::tree::{PageTree, ParentKey};

fn doc(id: &str, ancestors: &[&str]) -> SourceDocument {
    SourceDocument::markup(id, id.to_uppercase(), Dialect::Markdown, "").with_ancestors(ancestors.to_vec())
}

fn group(id: &str) -> ParentKey {
    ParentKey::Document(id.to_string())
}

#[test]
fn children_keep_listing_order() {
    let docs = vec![
        doc("root", &[]),
        doc("second", &["root"]),
        doc("first", &["root"]),
        doc("leaf", &["root", "first"]),
        doc("other", &[]),
    ];
    let tree = PageTree::build(&docs);
    assert_eq!(tree.roots(), ["root", "other"]);
    assert_eq!(tree.children(&group("root")), ["second", "first"]);
    assert_eq!(tree.children(&group("first")), ["leaf"]);
    assert!(tree.children(&group("leaf")).is_empty());
    assert!(tree.warnings().is_empty());
    assert_eq!(tree.len(), 5);
}

#[test]
fn three_node_cycle_reparents_each_member_once() {
    let docs = vec![doc("a", &["c"]), doc("b", &["a"]), doc("c", &["b"])];
    let tree = PageTree::build(&docs);
    assert_eq!(tree.warnings().len(), 3);
    assert_eq!(tree.roots(), ["a", "b", "c"]);
    for id in ["a", "b", "c"] {
        assert_eq!(tree.parent_of(id), None);
        assert!(tree.path_to(id).is_empty());
    }
    assert!(tree.warnings().iter().all(|w| w.kind() == "CycleError"));
}

#[test]
fn long_cycle_terminates() {
    let n = 500;
    let docs: Vec<SourceDocument> = (0..n)
        .map(|i| {
            let parent = format!("p{}", (i + n - 1) % n);
            SourceDocument::markup(format!("p{i}"), format!("Page {i}"), Dialect::Markdown, "")
                .with_ancestors([parent])
        })
        .collect();
    let tree = PageTree::build(&docs);
    assert_eq!(tree.warnings().len(), n);
    assert_eq!(tree.roots().len(), n);
}

#[test]
fn missing_parent_forms_its_own_group() {
    let docs = vec![doc("orphan", &["space-home", "gone"]), doc("top", &[])];
    let tree = PageTree::build(&docs);
    assert_eq!(tree.children(&group("gone")), ["orphan"]);
    assert_eq!(tree.roots(), ["top"]);
    assert_eq!(tree.parent_of("orphan"), Some("gone"));
    assert!(tree.path_to("orphan").is_empty());
    assert!(tree.warnings().is_empty());
}

#[test]
fn path_to_lists_ancestors_root_first() {
    let docs = vec![
        doc("c", &["a", "b"]),
        doc("b", &["a"]),
        doc("a", &[]),
    ];
    let tree = PageTree::build(&docs);
    assert_eq!(tree.path_to("c"), ["a", "b"]);
    assert_eq!(tree.path_to("b"), ["a"]);
    assert!(tree.path_to("a").is_empty());
    assert!(tree.path_to("unknown").is_empty());
}

#[test]
fn first_occurrence_of_an_id_wins() {
    let docs = vec![doc("x", &[]), doc("y", &[]), doc("x", &["y"])];
    let tree = PageTree::build(&docs);
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.roots(), ["x", "y"]);
    assert!(tree.children(&group("y")).is_empty());
}

#[test]
fn empty_input_builds_empty_tree() {
    let tree = PageTree::build(&[]);
    assert!(tree.is_empty());
    assert!(tree.roots().is_empty());
}
