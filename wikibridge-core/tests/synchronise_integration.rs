use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wikibridge_core::config::{CancelFlag, Hierarchy, SyncConfig};
use wikibridge_core::contract::{
    AttachmentRef, Dialect, DocumentBody, DocumentPage, DownloadHandle, FetchFailure,
    MockSourceStore, MockTargetStore, Namespace, NewAttachment, Paragraph, SourceDocument,
    TargetPage, TargetStore, CANONICAL_SYNTAX,
};
use wikibridge_core::error::StoreError;
use wikibridge_core::memory::StaticSource;
use wikibridge_core::report::DocumentStatus;
use wikibridge_core::synchronise::synchronise;

fn config() -> SyncConfig {
    SyncConfig::new("NETOPS", "Confluence_NETOPS")
}

fn markdown_doc(id: &str, title: &str) -> SourceDocument {
    SourceDocument::markup(id, title, Dialect::Markdown, format!("# {title}"))
}

fn attachment(filename: &str, handle: &str) -> AttachmentRef {
    AttachmentRef {
        filename: filename.to_string(),
        media_type: "image/png".to_string(),
        handle: DownloadHandle::new(handle),
    }
}

/// Target mock that accepts every write and records the pages it saw.
fn recording_target(pages: Arc<Mutex<Vec<TargetPage>>>) -> MockTargetStore {
    let mut target = MockTargetStore::new();
    target.expect_upsert_page().returning(move |page: &TargetPage| {
        pages.lock().unwrap().push(page.clone());
        Ok(format!("http://wiki/bin/view/{}/{}", page.namespace, page.page_name))
    });
    target
        .expect_put_attachment()
        .returning(|a: NewAttachment<'_>| Ok(format!("http://wiki/{}/{}", a.page_name, a.filename)));
    target
}

/// Offset-token pages over `docs`, always handing out a next token.
fn paged_source(docs: Vec<SourceDocument>, expected_calls: usize) -> MockSourceStore {
    let mut source = MockSourceStore::new();
    source
        .expect_list_documents()
        .times(expected_calls)
        .returning(move |_container: &str, token: Option<String>, limit: usize| {
            let start: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + limit).min(docs.len());
            Ok(DocumentPage {
                entries: docs[start.min(end)..end].iter().cloned().map(Ok).collect(),
                next_page_token: Some(end.to_string()),
            })
        });
    source
}

#[tokio::test]
async fn broken_attachment_only_marks_its_own_document_partial() {
    let docs: Vec<SourceDocument> = (1..=5)
        .map(|i| {
            markdown_doc(&i.to_string(), &format!("Page {i}"))
                .with_attachments(vec![attachment(&format!("diagram{i}.png"), &format!("h{i}"))])
        })
        .collect();
    let mut source = StaticSource::new(docs);
    for i in [1, 2, 4, 5] {
        source = source.with_blob(format!("h{i}"), vec![0x89, b'P', b'N', b'G']);
    }

    let mut target = MockTargetStore::new();
    target
        .expect_upsert_page()
        .times(5)
        .returning(|page: &TargetPage| Ok(format!("http://wiki/{}", page.page_name)));
    target
        .expect_put_attachment()
        .times(4)
        .returning(|a: NewAttachment<'_>| {
            assert_eq!(a.bytes, [0x89, b'P', b'N', b'G']);
            assert_eq!(a.media_type, "image/png");
            Ok(format!("http://wiki/{}/{}", a.page_name, a.filename))
        });

    let report = synchronise(&config(), &source, &target, &CancelFlag::new())
        .await
        .expect("run completes");

    assert_eq!(report.processed(), 5);
    assert_eq!(report.succeeded(), 4);
    assert_eq!(report.partial(), 1);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.outcome("3").unwrap().status, DocumentStatus::Partial);
    assert_eq!(report.failures().len(), 1);
    let (id, err) = &report.failures()[0];
    assert_eq!(id, "3");
    assert_eq!(err.kind(), "AttachmentError");
    assert!(err.to_string().contains("diagram3.png"));
}

#[tokio::test]
async fn listing_follows_tokens_until_a_short_page() {
    let docs: Vec<SourceDocument> = (0..5).map(|i| markdown_doc(&format!("d{i}"), &format!("Doc {i}"))).collect();
    let source = paged_source(docs, 3);
    let pages = Arc::new(Mutex::new(Vec::new()));
    let target = recording_target(pages.clone());

    let mut config = config();
    config.page_size = 2;
    let report = synchronise(&config, &source, &target, &CancelFlag::new()).await.unwrap();

    assert_eq!(report.succeeded(), 5);
    let names: Vec<String> = pages.lock().unwrap().iter().map(|p| p.page_name.clone()).collect();
    assert_eq!(names, ["Doc_0", "Doc_1", "Doc_2", "Doc_3", "Doc_4"]);
}

#[tokio::test]
async fn listing_stops_on_an_empty_page() {
    let docs: Vec<SourceDocument> = (0..4).map(|i| markdown_doc(&format!("d{i}"), &format!("Doc {i}"))).collect();
    let source = paged_source(docs, 3);
    let target = recording_target(Arc::new(Mutex::new(Vec::new())));

    let mut config = config();
    config.page_size = 2;
    let report = synchronise(&config, &source, &target, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.processed(), 4);
}

#[tokio::test]
async fn listing_error_aborts_the_run() {
    let mut source = MockSourceStore::new();
    source
        .expect_list_documents()
        .times(1)
        .returning(|_c: &str, _t: Option<String>, _l: usize| Err("503 Service Unavailable".into()));
    let target = MockTargetStore::new();

    let err = synchronise(&config(), &source, &target, &CancelFlag::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "FetchError");
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn zero_page_size_is_a_config_error() {
    let source = MockSourceStore::new();
    let target = MockTargetStore::new();
    let mut config = config();
    config.page_size = 0;
    let err = synchronise(&config, &source, &target, &CancelFlag::new()).await.unwrap_err();
    assert_eq!(err.kind(), "ConfigError");
}

#[tokio::test]
async fn rejected_upsert_is_isolated_to_one_document() {
    let source = StaticSource::new(vec![
        markdown_doc("1", "Good"),
        markdown_doc("2", "Broken"),
        markdown_doc("3", "Also Good"),
    ]);
    let mut target = MockTargetStore::new();
    target.expect_upsert_page().times(3).returning(|page: &TargetPage| {
        if page.page_name == "Broken" {
            Err("HTTP 500: page locked".into())
        } else {
            Ok(format!("http://wiki/{}", page.page_name))
        }
    });

    let report = synchronise(&config(), &source, &target, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures()[0].1.kind(), "UpsertError");
    let broken = report.outcome("2").unwrap();
    assert_eq!(broken.status, DocumentStatus::Failed);
    assert!(broken.location.is_none());
    assert_eq!(report.outcome("3").unwrap().location.as_deref(), Some("http://wiki/Also_Good"));
}

#[tokio::test]
async fn dry_run_never_touches_the_target() {
    let source = StaticSource::new(vec![
        markdown_doc("1", "Alpha").with_attachments(vec![attachment("a.png", "missing")]),
        markdown_doc("2", "Beta"),
    ]);
    // No expectations: any call on the target panics.
    let target = MockTargetStore::new();
    let mut config = config();
    config.dry_run = true;

    let report = synchronise(&config, &source, &target, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.planned(), 2);
    assert_eq!(report.processed(), 2);
    assert_eq!(report.succeeded(), 0);
    let alpha = report.outcome("1").unwrap();
    assert_eq!(alpha.namespace, "Confluence_NETOPS");
    assert_eq!(alpha.page_name, "Alpha");
    assert!(alpha.content_sha256.is_some());
}

#[tokio::test]
async fn parent_cycle_is_reported_and_pages_still_written() {
    let source = StaticSource::new(vec![
        markdown_doc("a", "A").with_ancestors(["c"]),
        markdown_doc("b", "B").with_ancestors(["a"]),
        markdown_doc("c", "C").with_ancestors(["b"]),
    ]);
    let pages = Arc::new(Mutex::new(Vec::new()));
    let target = recording_target(pages.clone());

    let report = synchronise(&config(), &source, &target, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.warnings().len(), 3);
    assert_eq!(report.succeeded(), 3);
    for page in pages.lock().unwrap().iter() {
        assert_eq!(page.namespace, Namespace::root("Confluence_NETOPS"));
    }
}

#[tokio::test]
async fn nested_hierarchy_places_children_under_parent_spaces() {
    let source = StaticSource::new(vec![
        markdown_doc("1", "Network"),
        markdown_doc("2", "Routers").with_ancestors(["1"]),
        markdown_doc("3", "Core Router").with_ancestors(["1", "2"]),
    ]);
    let pages = Arc::new(Mutex::new(Vec::new()));
    let target = recording_target(pages.clone());

    synchronise(&config(), &source, &target, &CancelFlag::new()).await.unwrap();
    let placed: Vec<String> = pages
        .lock()
        .unwrap()
        .iter()
        .map(|p| format!("{}.{}", p.namespace, p.page_name))
        .collect();
    assert_eq!(
        placed,
        [
            "Confluence_NETOPS.Network",
            "Confluence_NETOPS.Network.Routers",
            "Confluence_NETOPS.Network.Routers.Core_Router",
        ]
    );

    let pages = Arc::new(Mutex::new(Vec::new()));
    let target = recording_target(pages.clone());
    let mut flat = config();
    flat.hierarchy = Hierarchy::Flat;
    synchronise(&flat, &source, &target, &CancelFlag::new()).await.unwrap();
    assert!(pages
        .lock()
        .unwrap()
        .iter()
        .all(|p| p.namespace.to_string() == "Confluence_NETOPS"));
}

async fn planned_names(config: &SyncConfig, docs: &[SourceDocument]) -> Vec<String> {
    let source = StaticSource::new(docs.to_vec());
    let report = synchronise(config, &source, &MockTargetStore::new(), &CancelFlag::new())
        .await
        .unwrap();
    report.outcomes().iter().map(|o| o.page_name.clone()).collect()
}

#[tokio::test]
async fn rerun_assigns_identical_names() {
    let docs = vec![
        markdown_doc("1", "Setup Guide"),
        markdown_doc("2", "Setup Guide"),
        markdown_doc("3", "???"),
    ];
    let mut config = config();
    config.dry_run = true;
    let first = planned_names(&config, &docs).await;
    assert_eq!(first, ["Setup_Guide", "Setup_Guide_2", "Page_3"]);
    assert_eq!(planned_names(&config, &docs).await, first);
}

#[tokio::test]
async fn unavailable_document_is_a_fetch_failure() {
    let mut source = MockSourceStore::new();
    source
        .expect_list_documents()
        .times(1)
        .returning(|_c: &str, _t: Option<String>, _l: usize| {
            Ok(DocumentPage {
                entries: vec![
                    Ok(markdown_doc("1", "Readable")),
                    Err(FetchFailure {
                        document_id: "2".into(),
                        message: "body expansion missing".into(),
                    }),
                ],
                next_page_token: None,
            })
        });
    let target = recording_target(Arc::new(Mutex::new(Vec::new())));

    let report = synchronise(&config(), &source, &target, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.processed(), 2);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    let (id, err) = &report.failures()[0];
    assert_eq!(id, "2");
    assert_eq!(err.kind(), "FetchError");
}

#[tokio::test]
async fn duplicate_id_is_only_written_once() {
    let source = StaticSource::new(vec![markdown_doc("1", "First"), markdown_doc("1", "Again")]);
    let mut target = MockTargetStore::new();
    target
        .expect_upsert_page()
        .times(1)
        .returning(|page: &TargetPage| Ok(page.page_name.clone()));

    let report = synchronise(&config(), &source, &target, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert!(report.failures()[0].1.to_string().contains("duplicate document id 1"));
}

#[tokio::test]
async fn cancelled_before_start_lists_nothing() {
    // No expectations on either mock: any call panics.
    let source = MockSourceStore::new();
    let target = MockTargetStore::new();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = synchronise(&config(), &source, &target, &cancel).await.unwrap();
    assert!(report.cancelled());
    assert_eq!(report.processed(), 0);
}

#[tokio::test]
async fn cancellation_finishes_the_current_document_and_stops() {
    let source = StaticSource::new(vec![
        markdown_doc("1", "One"),
        markdown_doc("2", "Two"),
        markdown_doc("3", "Three"),
    ]);
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let mut target = MockTargetStore::new();
    target.expect_upsert_page().times(1).returning(move |page: &TargetPage| {
        flag.cancel();
        Ok(page.page_name.clone())
    });

    let report = synchronise(&config(), &source, &target, &cancel).await.unwrap();
    assert!(report.cancelled());
    assert_eq!(report.processed(), 1);
    assert_eq!(report.outcome("1").unwrap().status, DocumentStatus::Succeeded);
    assert!(report.outcome("2").is_none());
}

/// Target that never answers within any reasonable timeout.
struct SlowTarget;

#[async_trait]
impl TargetStore for SlowTarget {
    async fn upsert_page(&self, _page: &TargetPage) -> Result<String, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("late".into())
    }

    async fn put_attachment<'a>(&self, _attachment: NewAttachment<'a>) -> Result<String, StoreError> {
        Ok("unused".into())
    }

    async fn list_pages(&self, _namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn slow_target_times_out_per_document() {
    let source = StaticSource::new(vec![markdown_doc("1", "One"), markdown_doc("2", "Two")]);
    let mut config = config();
    config.timeout = Duration::from_millis(20);

    let report = synchronise(&config, &source, &SlowTarget, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.processed(), 2);
    assert_eq!(report.failed(), 2);
    assert!(report
        .failures()
        .iter()
        .all(|(_, e)| e.kind() == "UpsertError" && e.to_string().contains("timed out")));
}

#[tokio::test]
async fn banner_is_prepended_to_page_content() {
    let source = StaticSource::new(vec![markdown_doc("7", "Home")]);
    let pages = Arc::new(Mutex::new(Vec::new()));
    let target = recording_target(pages.clone());
    let mut config = config();
    config.banner = Some("Confluence space **NETOPS**".into());

    synchronise(&config, &source, &target, &CancelFlag::new()).await.unwrap();
    let pages = pages.lock().unwrap();
    assert_eq!(
        pages[0].content,
        "{{info}}\nMigrated from Confluence space **NETOPS**, page ID 7.\n{{/info}}\n\n= Home ="
    );
}

#[tokio::test]
async fn paragraphs_declared_as_markdown_fail_to_transform() {
    let doc = SourceDocument {
        id: "w1".into(),
        title: "Word".into(),
        body: DocumentBody::Paragraphs(vec![Paragraph::default()]),
        dialect: Dialect::Markdown,
        ancestor_ids: Vec::new(),
        attachments: Vec::new(),
    };
    let source = StaticSource::new(vec![doc]);
    let target = MockTargetStore::new();

    let report = synchronise(&config(), &source, &target, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures()[0].1.kind(), "TransformError");
}

#[tokio::test]
async fn confluence_page_end_to_end() {
    let source = StaticSource::new(vec![SourceDocument::markup(
        "65537",
        "Setup Guide",
        Dialect::ConfluenceStorage,
        r#"<h1>Intro</h1><p>See <a href="http://x">here</a></p>"#,
    )]);
    let pages = Arc::new(Mutex::new(Vec::new()));
    let target = recording_target(pages.clone());

    let report = synchronise(&config(), &source, &target, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.succeeded(), 1);

    let pages = pages.lock().unwrap();
    let page = &pages[0];
    assert_eq!(page.page_name, "Setup_Guide");
    assert_eq!(page.title, "Setup Guide");
    assert_eq!(page.syntax_tag, CANONICAL_SYNTAX);
    assert_eq!(page.content, "= Intro =\n\nSee [[here>>http://x]]");
    assert_eq!(
        report.outcome("65537").unwrap().location.as_deref(),
        Some("http://wiki/bin/view/Confluence_NETOPS/Setup_Guide")
    );
}
