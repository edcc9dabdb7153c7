//! End-to-end pipeline tests
//!
//! Drive a full run over a temporary directory layout with the extraction
//! service stubbed out, then check where every file landed and what the
//! manifest recorded.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

use scanbox::extraction::{
    ExtractionError, ExtractionResult, Extractor, RequestSpec, TextBlock, Transport,
    TransportError, TransportResponse, VisionClient, VisionConfig, VisionProvider,
};
use scanbox::layout::{DirectoryLayout, Stage};
use scanbox::manifest::{ManifestEntry, ManifestLog, ManifestStatus};
use scanbox::output::BatchRecord;
use scanbox::pipeline::{Pipeline, PipelineEvent, RunSummary};

/// What the stub returns for a given image.
#[derive(Clone)]
enum Reply {
    Text(ExtractionResult),
    Empty,
}

/// Answers by image content; each test image's bytes are its own key.
struct StubExtractor {
    replies: HashMap<String, Reply>,
    calls: AtomicUsize,
    mime_types: Mutex<Vec<String>>,
}

impl StubExtractor {
    fn new(replies: Vec<(&str, Reply)>) -> Self {
        Self {
            replies: replies
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: AtomicUsize::new(0),
            mime_types: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mime_types.lock().unwrap().push(mime_type.to_string());
        tokio::task::yield_now().await;

        match self.replies.get(String::from_utf8_lossy(image).as_ref()) {
            Some(Reply::Text(result)) => Ok(result.clone()),
            Some(Reply::Empty) | None => Err(ExtractionError::Empty),
        }
    }
}

/// 21 + 19 = 40 alphanumerics across two labeled segments.
fn two_segments() -> Reply {
    Reply::Text(ExtractionResult::Segmented {
        blocks: vec![
            TextBlock::new("Title", "Quarterly Report Twenty"),
            TextBlock::new("Body", "Revenue grew nineteen"),
        ],
        notes: vec!["Stamp in lower corner".to_string()],
    })
}

/// 9 alphanumerics.
fn too_short() -> Reply {
    Reply::Text(ExtractionResult::Segmented {
        blocks: vec![TextBlock::new("Body", "Hello 123 x")],
        notes: vec![],
    })
}

fn setup() -> (TempDir, DirectoryLayout) {
    let dir = tempdir().unwrap();
    let layout = DirectoryLayout::under(dir.path());
    layout.ensure_directories().unwrap();
    (dir, layout)
}

fn drop_in_inbox(layout: &DirectoryLayout, name: &str, contents: &str) {
    std::fs::write(layout.inbox.join(name), contents).unwrap();
}

async fn run_pipeline(pipeline: &mut Pipeline) -> (RunSummary, Vec<PipelineEvent>) {
    let (tx, mut rx) = mpsc::channel(100);
    let summary = pipeline.run(&tx).await.unwrap();
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (summary, events)
}

async fn manifest_entries(layout: &DirectoryLayout) -> Vec<ManifestEntry> {
    ManifestLog::new(layout.manifest_path())
        .read_entries()
        .await
        .unwrap()
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn assert_only_in(layout: &DirectoryLayout, name: &str, expected: Stage) {
    assert_eq!(layout.locate(name), vec![expected], "placement of {}", name);
}

#[tokio::test]
async fn test_valid_image_is_processed() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "card1.png", "card1");
    let stub = Arc::new(StubExtractor::new(vec![("card1", two_segments())]));

    let mut pipeline = Pipeline::new(layout.clone(), stub.clone());
    let (summary, _) = run_pipeline(&mut pipeline).await;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    assert_only_in(&layout, "card1.png", Stage::Processed);

    let text = std::fs::read_to_string(layout.output.join("card1.txt")).unwrap();
    assert!(text.starts_with("Source: card1.png\n"));
    assert!(text.contains("[Title]\nQuarterly Report Twenty"));
    assert!(text.contains("[Body]\nRevenue grew nineteen"));
    assert!(text.contains("- Stamp in lower corner"));

    let entries = manifest_entries(&layout).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file_name, "card1.png");
    assert_eq!(entries[0].status, ManifestStatus::Processed);
    let expected_output = layout.output.join("card1.txt").display().to_string();
    assert_eq!(
        entries[0].output_path.as_deref(),
        Some(expected_output.as_str())
    );
    assert_eq!(
        *stub.mime_types.lock().unwrap(),
        vec!["image/png".to_string()]
    );
}

#[tokio::test]
async fn test_short_text_fails_validation() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "card2.jpg", "card2");
    let stub = Arc::new(StubExtractor::new(vec![("card2", too_short())]));

    let mut pipeline = Pipeline::new(layout.clone(), stub);
    let (summary, events) = run_pipeline(&mut pipeline).await;

    assert_eq!(summary.failed, 1);
    assert_only_in(&layout, "card2.jpg", Stage::Failed);
    assert!(!layout.output.join("card2.txt").exists());

    let entries = manifest_entries(&layout).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ManifestStatus::Failed);
    let error = entries[0].error.as_deref().unwrap();
    assert!(error.contains('9'), "{}", error);

    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::FileFailed { file_name, orphaned: false, .. } if file_name == "card2.jpg"
    )));
}

#[tokio::test]
async fn test_concurrent_runs_process_file_once() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "card3.png", "card3");

    let mut first = Pipeline::new(
        layout.clone(),
        Arc::new(StubExtractor::new(vec![("card3", two_segments())])),
    );
    let mut second = Pipeline::new(
        layout.clone(),
        Arc::new(StubExtractor::new(vec![("card3", two_segments())])),
    );

    let (tx, _rx) = mpsc::channel(100);
    let (a, b) = tokio::join!(first.run(&tx), second.run(&tx));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.claimed + b.claimed, 1);
    // Whichever run saw the file without claiming it skipped it.
    assert_eq!(a.skipped + b.skipped, a.scanned + b.scanned - 1);
    assert_only_in(&layout, "card3.png", Stage::Processed);
    assert_eq!(manifest_entries(&layout).await.len(), 1);
}

/// Claims `victim` on behalf of a competing run the first time it is called.
struct CompetingExtractor {
    layout: DirectoryLayout,
    victim: &'static str,
    inner: StubExtractor,
}

#[async_trait]
impl Extractor for CompetingExtractor {
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        let from = self.layout.stage_path(Stage::Inbox, self.victim);
        if from.exists() {
            std::fs::rename(&from, self.layout.stage_path(Stage::Processing, self.victim))
                .unwrap();
        }
        self.inner.extract(image, mime_type).await
    }
}

#[tokio::test]
async fn test_file_claimed_by_another_run_is_skipped() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "a.png", "a");
    drop_in_inbox(&layout, "b.png", "b");

    let extractor = CompetingExtractor {
        layout: layout.clone(),
        victim: "b.png",
        inner: StubExtractor::new(vec![("a", two_segments()), ("b", two_segments())]),
    };
    let mut pipeline = Pipeline::new(layout.clone(), Arc::new(extractor));
    let (summary, events) = run_pipeline(&mut pipeline).await;

    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.skipped, 1);
    assert_only_in(&layout, "b.png", Stage::Processing);

    let entries = manifest_entries(&layout).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file_name, "a.png");
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::FileSkipped { file_name, .. } if file_name == "b.png"
    )));
}

/// Always answers 503.
struct UnavailableTransport {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for UnavailableTransport {
    async fn send(&self, _request: &RequestSpec) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TransportResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "upstream overloaded",
        ))
    }
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_exhausts_retries() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "card4.bmp", "card4");

    let calls = Arc::new(AtomicUsize::new(0));
    let client = VisionClient::with_transport(
        VisionConfig::new(VisionProvider::OpenAi, "sk-test"),
        UnavailableTransport {
            calls: calls.clone(),
        },
    );
    let mut pipeline = Pipeline::new(layout.clone(), Arc::new(client));
    let (summary, _) = run_pipeline(&mut pipeline).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.failed, 1);
    assert_only_in(&layout, "card4.bmp", Stage::Failed);

    let entries = manifest_entries(&layout).await;
    assert_eq!(entries.len(), 1);
    let error = entries[0].error.as_deref().unwrap();
    assert!(error.contains("503"), "{}", error);
    assert!(error.contains("upstream overloaded"), "{}", error);
}

#[tokio::test]
async fn test_mixed_batch_places_every_file_once() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "b.png", "good-b");
    drop_in_inbox(&layout, "A.jpg", "good-a");
    drop_in_inbox(&layout, "c.TIF", "short");
    drop_in_inbox(&layout, "d.webp", "empty");
    drop_in_inbox(&layout, "notes.txt", "not an image");

    let stub = Arc::new(StubExtractor::new(vec![
        ("good-a", two_segments()),
        ("good-b", two_segments()),
        ("short", too_short()),
        ("empty", Reply::Empty),
    ]));
    let mut pipeline = Pipeline::new(layout.clone(), stub.clone());
    let (summary, _) = run_pipeline(&mut pipeline).await;

    assert_eq!(
        summary,
        RunSummary {
            scanned: 4,
            claimed: 4,
            skipped: 0,
            processed: 2,
            failed: 2,
            orphaned: 0,
        }
    );
    assert_only_in(&layout, "A.jpg", Stage::Processed);
    assert_only_in(&layout, "b.png", Stage::Processed);
    assert_only_in(&layout, "c.TIF", Stage::Failed);
    assert_only_in(&layout, "d.webp", Stage::Failed);
    assert_eq!(dir_names(&layout.inbox), vec!["notes.txt"]);
    assert!(dir_names(&layout.processing).is_empty());

    // One line per claimed file, in scan order.
    let names: Vec<String> = manifest_entries(&layout)
        .await
        .into_iter()
        .map(|e| e.file_name)
        .collect();
    assert_eq!(names, vec!["A.jpg", "b.png", "c.TIF", "d.webp"]);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_rerun_after_clean_run_changes_nothing() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "card1.png", "card1");
    let stub = Arc::new(StubExtractor::new(vec![("card1", two_segments())]));

    let mut pipeline = Pipeline::new(layout.clone(), stub.clone());
    run_pipeline(&mut pipeline).await;
    let manifest_before = std::fs::read_to_string(layout.manifest_path()).unwrap();

    let (summary, events) = run_pipeline(&mut pipeline).await;

    assert_eq!(summary, RunSummary::default());
    assert_eq!(
        std::fs::read_to_string(layout.manifest_path()).unwrap(),
        manifest_before
    );
    assert_only_in(&layout, "card1.png", Stage::Processed);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        events.first(),
        Some(PipelineEvent::RunStarted { total_files: 0 })
    ));
}

#[tokio::test]
async fn test_orphan_in_processing_is_not_clobbered() {
    let (_dir, layout) = setup();
    std::fs::write(layout.processing.join("x.png"), "orphan").unwrap();
    drop_in_inbox(&layout, "x.png", "x");
    let stub = Arc::new(StubExtractor::new(vec![("x", two_segments())]));

    let mut pipeline = Pipeline::new(layout.clone(), stub.clone());
    let (summary, _) = run_pipeline(&mut pipeline).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        std::fs::read_to_string(layout.processing.join("x.png")).unwrap(),
        "orphan"
    );
    assert!(layout.inbox.join("x.png").exists());
    assert!(manifest_entries(&layout).await.is_empty());
}

#[tokio::test]
async fn test_stale_processed_copy_is_replaced() {
    let (_dir, layout) = setup();
    std::fs::write(layout.processed.join("card1.png"), "old scan").unwrap();
    drop_in_inbox(&layout, "card1.png", "card1");
    let stub = Arc::new(StubExtractor::new(vec![("card1", two_segments())]));

    let mut pipeline = Pipeline::new(layout.clone(), stub);
    let (summary, _) = run_pipeline(&mut pipeline).await;

    assert_eq!(summary.processed, 1);
    assert_eq!(
        std::fs::read_to_string(layout.processed.join("card1.png")).unwrap(),
        "card1"
    );
}

#[tokio::test]
async fn test_batch_document_lists_only_validated_files() {
    let (dir, layout) = setup();
    drop_in_inbox(&layout, "card1.png", "card1");
    drop_in_inbox(&layout, "card2.jpg", "card2");
    let stub = Arc::new(StubExtractor::new(vec![
        ("card1", two_segments()),
        ("card2", too_short()),
    ]));
    let batch_path = dir.path().join("reports").join("batch.json");

    let mut pipeline = Pipeline::new(layout.clone(), stub).with_batch_output(&batch_path);
    run_pipeline(&mut pipeline).await;

    let record: BatchRecord =
        serde_json::from_str(&std::fs::read_to_string(&batch_path).unwrap()).unwrap();
    assert_eq!(record.files.len(), 1);
    assert_eq!(record.files[0].name, "card1.png");
    let sections: Vec<&str> = record.files[0]
        .sections
        .iter()
        .map(|s| s.content.as_str())
        .collect();
    assert_eq!(sections, vec!["Quarterly Report Twenty", "Revenue grew nineteen"]);
}

#[tokio::test]
async fn test_manifest_write_failure_fails_file_without_output() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "card1.png", "card1");
    // A directory where the manifest should be makes every append fail.
    std::fs::create_dir(layout.manifest_path()).unwrap();
    let stub = Arc::new(StubExtractor::new(vec![("card1", two_segments())]));

    let mut pipeline = Pipeline::new(layout.clone(), stub);
    let (summary, events) = run_pipeline(&mut pipeline).await;

    assert_eq!(
        summary,
        RunSummary {
            scanned: 1,
            claimed: 1,
            skipped: 0,
            processed: 0,
            failed: 1,
            orphaned: 0,
        }
    );
    assert_only_in(&layout, "card1.png", Stage::Failed);
    assert!(!layout.output.join("card1.txt").exists());
    assert!(layout.manifest_path().is_dir());
    assert!(dir_names(&layout.manifest_path()).is_empty());
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::FileProcessed { .. })));
}

#[tokio::test]
async fn test_processed_file_that_cannot_be_moved_stays_in_processing() {
    let (_dir, layout) = setup();
    drop_in_inbox(&layout, "card1.png", "card1");
    // A non-empty directory in the way cannot be replaced by the final move.
    let blocker = layout.processed.join("card1.png");
    std::fs::create_dir(&blocker).unwrap();
    std::fs::write(blocker.join("keep"), "x").unwrap();
    let stub = Arc::new(StubExtractor::new(vec![("card1", two_segments())]));

    let mut pipeline = Pipeline::new(layout.clone(), stub);
    let (summary, events) = run_pipeline(&mut pipeline).await;

    assert_eq!(
        summary,
        RunSummary {
            scanned: 1,
            claimed: 1,
            skipped: 0,
            processed: 1,
            failed: 0,
            orphaned: 1,
        }
    );
    assert_only_in(&layout, "card1.png", Stage::Processing);
    assert!(layout.output.join("card1.txt").is_file());

    let entries = manifest_entries(&layout).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ManifestStatus::Processed);

    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::FileProcessed { file_name, orphaned: true, .. } if file_name == "card1.png"
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::FileFailed { .. })));
}

#[tokio::test]
async fn test_missing_directories_are_created() {
    let dir = tempdir().unwrap();
    let layout = DirectoryLayout::under(&dir.path().join("fresh"));
    let stub = Arc::new(StubExtractor::new(vec![]));

    let mut pipeline = Pipeline::new(layout.clone(), stub);
    let (summary, _) = run_pipeline(&mut pipeline).await;

    assert_eq!(summary.scanned, 0);
    for stage in Stage::all() {
        assert!(layout.stage_dir(stage).is_dir());
    }
    assert!(layout.output.is_dir());
}
