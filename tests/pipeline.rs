//! End-to-end tests of the analysis pipeline against in-memory task
//! storage, a temp-dir document store and a scripted inference backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use cv_analyzer::analysis::{AnalysisSettings, Analyzer, Scheduler, INTERRUPTED_REASON};
use cv_analyzer::error::AnalysisError;
use cv_analyzer::retrieval::RetrievalSettings;
use cv_analyzer::inference::{ChatMessage, InferenceClient, InferenceError};
use cv_analyzer::storage::LocalStorage;
use cv_analyzer::submission::{DocumentUpload, Submission};
use cv_analyzer::worker::{self, DrainSummary};
use cv_analyzer_core::models::{AnalysisTask, JobContext, SubjectContext, TaskOutcome, TaskStatus};
use cv_analyzer_core::prompt::check_report;
use cv_analyzer_core::store::memory::InMemoryTaskStore;
use cv_analyzer_core::store::TaskStore;

const REPORT: &str = "## Prepared for: Acme Corp\n### Prepared by: Jane Doe\n\n\
[GOOD] Strong Rust background.\n[BAD] No payments domain experience.\n";

#[derive(Clone, Copy)]
enum Reply {
    Report,
    Empty,
    Fail,
    Hang,
}

/// Inference backend that answers every chat with a fixed behavior and
/// records the prompts it was sent.
struct ScriptedClient {
    reply: Reply,
    embeddings_down: bool,
    chats: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(reply: Reply) -> Arc<Self> {
        Self::build(reply, false)
    }

    fn build(reply: Reply, embeddings_down: bool) -> Arc<Self> {
        Arc::new(Self {
            reply,
            embeddings_down,
            chats: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, InferenceError> {
        self.chats.fetch_add(1, Ordering::SeqCst);
        if let Some(last) = messages.last() {
            self.prompts.lock().unwrap().push(last.content.clone());
        }
        match self.reply {
            Reply::Report => Ok(REPORT.to_string()),
            Reply::Empty => Ok("   \n".to_string()),
            Reply::Fail => Err(InferenceError::Api {
                status: 500,
                message: "model not loaded".to_string(),
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(REPORT.to_string())
            }
        }
    }

    /// `[1, 0]` for texts mentioning Rust, `[0, 1]` otherwise.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        if self.embeddings_down {
            return Err(InferenceError::Api {
                status: 404,
                message: "embedding model not found".to_string(),
            });
        }
        if text.to_lowercase().contains("rust") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
}

#[derive(Default)]
struct RecordingScheduler {
    scheduled: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    fn ids(&self) -> Vec<String> {
        self.scheduled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn schedule(&self, task_id: &str) -> anyhow::Result<()> {
        self.scheduled.lock().unwrap().push(task_id.to_string());
        Ok(())
    }
}

struct Harness {
    _tmp: TempDir,
    root: std::path::PathBuf,
    store: Arc<InMemoryTaskStore>,
    client: Arc<ScriptedClient>,
    scheduler: Arc<RecordingScheduler>,
    analyzer: Analyzer,
}

fn settings(strict: bool, retrieval: Option<RetrievalSettings>) -> AnalysisSettings {
    AnalysisSettings {
        strict_extraction: strict,
        max_upload_bytes: 5120 * 1024,
        retrieval,
    }
}

fn harness_over(
    store: Arc<dyn TaskStore>,
    client: Arc<ScriptedClient>,
    settings: AnalysisSettings,
) -> (TempDir, Arc<RecordingScheduler>, Analyzer) {
    let tmp = TempDir::new().unwrap();
    let scheduler = Arc::new(RecordingScheduler::default());
    let analyzer = Analyzer::new(
        store,
        Arc::new(LocalStorage::new(tmp.path())),
        client,
        scheduler.clone(),
        settings,
    );
    (tmp, scheduler, analyzer)
}

fn harness_with_client(client: Arc<ScriptedClient>, settings: AnalysisSettings) -> Harness {
    let store = Arc::new(InMemoryTaskStore::new());
    let (tmp, scheduler, analyzer) = harness_over(store.clone(), client.clone(), settings);
    Harness {
        root: tmp.path().to_path_buf(),
        _tmp: tmp,
        store,
        client,
        scheduler,
        analyzer,
    }
}

fn harness_with(reply: Reply, strict: bool) -> Harness {
    harness_with_client(ScriptedClient::new(reply), settings(strict, None))
}

fn harness(reply: Reply) -> Harness {
    harness_with(reply, false)
}

fn docx_with_text(text: &str) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            text
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn submission(file_name: &str, bytes: Vec<u8>) -> Submission {
    Submission {
        cv: Some(DocumentUpload {
            file_name: file_name.to_string(),
            bytes,
        }),
        job_title: Some("Backend Engineer".to_string()),
        job_description: Some("Build payment services in Rust.".to_string()),
        target_company: Some("Acme Corp".to_string()),
        industry: Some("Fintech".to_string()),
        experience_level: Some("Senior".to_string()),
        analysis_preferences: vec!["ATS keywords".to_string()],
        target_country: Some("Germany".to_string()),
        current_career_level: Some("Mid".to_string()),
        name: Some("Jane Doe".to_string()),
        email: Some("jane@example.com".to_string()),
    }
}

/// Single-page PDF with a Helvetica text run and a correct xref table.
fn minimal_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 52 >> stream\nBT /F1 12 Tf 100 700 Td (Senior PHP developer) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn docx_submission() -> Submission {
    submission(
        "resume.docx",
        docx_with_text("Rust engineer who shipped payment services"),
    )
}

#[tokio::test]
async fn submit_then_execute_completes_with_report() {
    let h = harness(Reply::Report);

    let task = h.analyzer.submit(docx_submission()).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.document_ref.starts_with("cvs/"));
    assert!(task.document_ref.ends_with(".docx"));
    assert!(h.root.join(&task.document_ref).exists());
    assert_eq!(h.scheduler.ids(), vec![task.id.clone()]);

    let before = h.analyzer.status(&task.id).await.unwrap();
    assert_eq!(before.status, TaskStatus::Pending);
    assert_eq!(before.report, None);

    let status = h.analyzer.execute(&task.id).await.unwrap();
    assert_eq!(status, TaskStatus::Completed);

    let after = h.analyzer.status(&task.id).await.unwrap();
    assert_eq!(after.status, TaskStatus::Completed);
    assert_eq!(after.report.as_deref(), Some(REPORT));
    let record = h.analyzer.task(&task.id).await.unwrap();
    assert!(check_report(REPORT, &record.subject, &record.job).is_empty());

    let prompt = h.client.last_prompt();
    assert!(prompt.contains("Rust engineer who shipped payment services"));
    assert!(prompt.contains("Job Title: Backend Engineer"));
    assert!(prompt.contains("## Prepared for: Acme Corp"));
    assert!(prompt.contains("### Prepared by: Jane Doe"));
    assert!(prompt.contains("[GOOD]"));
    assert!(prompt.contains("[BAD]"));
}

#[tokio::test]
async fn pdf_submission_starts_pending() {
    let h = harness(Reply::Report);
    let mut sub = submission("resume.pdf", minimal_pdf());
    sub.job_title = Some("Senior Developer".to_string());
    sub.industry = Some("Information Technology".to_string());
    sub.experience_level = Some("Senior Level (5 to 10 years)".to_string());

    let task = h.analyzer.submit(sub).await.unwrap();
    assert!(!task.id.is_empty());
    assert_eq!(task.status, TaskStatus::Pending);

    let view = h.analyzer.status(&task.id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Pending);
    assert_eq!(view.report, None);

    assert_eq!(
        h.analyzer.execute(&task.id).await.unwrap(),
        TaskStatus::Completed
    );
    assert!(h
        .client
        .last_prompt()
        .contains("Experience Level: Senior Level (5 to 10 years)"));
}

#[tokio::test]
async fn inference_failure_marks_task_failed_without_report() {
    let h = harness(Reply::Fail);
    let task = h.analyzer.submit(docx_submission()).await.unwrap();

    let status = h.analyzer.execute(&task.id).await.unwrap();
    assert_eq!(status, TaskStatus::Failed);

    let view = h.analyzer.status(&task.id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Failed);
    assert_eq!(view.report, None);

    let record = h.analyzer.task(&task.id).await.unwrap();
    assert!(record.failure_reason.unwrap().contains("model not loaded"));
}

#[tokio::test]
async fn blank_model_reply_fails_task() {
    let h = harness(Reply::Empty);
    let task = h.analyzer.submit(docx_submission()).await.unwrap();
    assert_eq!(
        h.analyzer.execute(&task.id).await.unwrap(),
        TaskStatus::Failed
    );
    assert_eq!(h.analyzer.status(&task.id).await.unwrap().report, None);
}

#[tokio::test]
async fn invalid_submission_creates_no_task() {
    let h = harness(Reply::Report);
    let mut sub = docx_submission();
    sub.job_title = None;
    sub.industry = Some("   ".to_string());

    match h.analyzer.submit(sub).await {
        Err(AnalysisError::Validation(errors)) => {
            assert!(errors.contains("job_title"));
            assert!(errors.contains("industry"));
            assert!(!errors.contains("cv"));
        }
        other => panic!("expected validation error, got {:?}", other.map(|t| t.id)),
    }
    assert!(h.store.is_empty());
    assert!(h.scheduler.ids().is_empty());
}

#[tokio::test]
async fn unsupported_document_type_is_rejected() {
    let h = harness(Reply::Report);
    let err = h
        .analyzer
        .submit(submission("resume.txt", b"plain text".to_vec()))
        .await
        .unwrap_err();
    match err {
        AnalysisError::Validation(errors) => assert!(errors.contains("cv")),
        other => panic!("expected validation error, got {}", other),
    }
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn finished_task_is_not_executed_twice() {
    let h = harness(Reply::Report);
    let task = h.analyzer.submit(docx_submission()).await.unwrap();

    h.analyzer.execute(&task.id).await.unwrap();
    let again = h.analyzer.execute(&task.id).await.unwrap();

    assert_eq!(again, TaskStatus::Completed);
    assert_eq!(h.client.chats.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.analyzer.status(&task.id).await.unwrap().report.as_deref(),
        Some(REPORT)
    );
}

#[tokio::test]
async fn processing_task_refuses_redelivery() {
    let h = harness(Reply::Report);
    let task = h.analyzer.submit(docx_submission()).await.unwrap();
    h.store
        .transition(&task.id, TaskStatus::Pending, TaskStatus::Processing, None)
        .await
        .unwrap();

    let err = h.analyzer.execute(&task.id).await.unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::InvalidState {
            status: TaskStatus::Processing,
            ..
        }
    ));
    assert_eq!(h.client.chats.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.analyzer.status(&task.id).await.unwrap().status,
        TaskStatus::Processing
    );
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let h = harness(Reply::Report);
    assert!(matches!(
        h.analyzer.execute("no-such-id").await,
        Err(AnalysisError::NotFound(_))
    ));
    assert!(matches!(
        h.analyzer.status("no-such-id").await,
        Err(AnalysisError::NotFound(_))
    ));
}

#[tokio::test]
async fn stalled_execution_is_failed_by_timeout() {
    let h = harness(Reply::Hang);
    let task = h.analyzer.submit(docx_submission()).await.unwrap();

    let status = worker::run_with_timeout(&h.analyzer, &task.id, Duration::from_millis(200)).await;
    assert_eq!(status, Some(TaskStatus::Failed));

    let record = h.analyzer.task(&task.id).await.unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.report, None);
    assert!(record.failure_reason.unwrap().starts_with("timed out"));
}

#[tokio::test]
async fn unreadable_pdf_is_analyzed_with_empty_text_when_permissive() {
    let h = harness(Reply::Report);
    let task = h
        .analyzer
        .submit(submission("resume.pdf", b"definitely not a pdf".to_vec()))
        .await
        .unwrap();

    assert_eq!(
        h.analyzer.execute(&task.id).await.unwrap(),
        TaskStatus::Completed
    );
    assert!(h
        .client
        .last_prompt()
        .contains("RESUME / CV CONTENT:\n\"\"\"\n\n\"\"\""));
}

#[tokio::test]
async fn unreadable_pdf_fails_task_when_strict() {
    let h = harness_with(Reply::Report, true);
    let task = h
        .analyzer
        .submit(submission("resume.pdf", b"definitely not a pdf".to_vec()))
        .await
        .unwrap();

    assert_eq!(
        h.analyzer.execute(&task.id).await.unwrap(),
        TaskStatus::Failed
    );
    assert_eq!(h.client.chats.load(Ordering::SeqCst), 0);
}

fn stored_task() -> AnalysisTask {
    AnalysisTask::new(
        "cvs/missing.docx".to_string(),
        SubjectContext {
            name: None,
            email: None,
            target_country: "Spain".to_string(),
            current_career_level: "Junior".to_string(),
            analysis_preferences: Vec::new(),
        },
        JobContext {
            job_title: "Analyst".to_string(),
            job_description: "Spreadsheets".to_string(),
            target_company: "the Employer".to_string(),
            industry: "Finance".to_string(),
            experience_level: "Entry".to_string(),
        },
    )
}

#[tokio::test]
async fn recovery_fails_interrupted_and_reschedules_pending() {
    let h = harness(Reply::Report);

    let interrupted = stored_task();
    h.store.insert(&interrupted).await.unwrap();
    h.store
        .transition(
            &interrupted.id,
            TaskStatus::Pending,
            TaskStatus::Processing,
            None,
        )
        .await
        .unwrap();

    let waiting = stored_task();
    h.store.insert(&waiting).await.unwrap();

    let summary = h.analyzer.recover().await.unwrap();
    assert_eq!(summary.interrupted, 1);
    assert_eq!(summary.rescheduled, 1);
    assert_eq!(h.scheduler.ids(), vec![waiting.id.clone()]);

    let record = h.analyzer.task(&interrupted.id).await.unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some(INTERRUPTED_REASON));
    assert_eq!(
        h.analyzer.status(&waiting.id).await.unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn drain_runs_every_pending_task() {
    let h = harness(Reply::Report);
    let first = h.analyzer.submit(docx_submission()).await.unwrap();
    let second = h.analyzer.submit(docx_submission()).await.unwrap();

    let summary = worker::drain_pending(&h.analyzer, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(
        summary,
        DrainSummary {
            completed: 2,
            failed: 0,
            skipped: 0,
        }
    );
    for id in [&first.id, &second.id] {
        assert_eq!(
            h.analyzer.status(id).await.unwrap().status,
            TaskStatus::Completed
        );
    }
    assert!(h.analyzer.pending().await.unwrap().is_empty());
}

fn retrieval_settings() -> Option<RetrievalSettings> {
    Some(RetrievalSettings {
        chunk_size: 40,
        chunk_overlap: 0,
        semantic_weight: 0.7,
        limit: 2,
    })
}

fn long_cv_submission() -> Submission {
    let text = [
        "Managed the office supply inventory.",
        "Organized quarterly team events.",
        "Wrote Rust services for payments.",
        "Answered customer phone calls.",
        "Maintained Rust tooling and CI.",
    ]
    .join(" ");
    submission("resume.docx", docx_with_text(&text))
}

#[tokio::test]
async fn retrieval_sends_only_top_passages_to_the_model() {
    let h = harness_with_client(
        ScriptedClient::new(Reply::Report),
        settings(false, retrieval_settings()),
    );
    let task = h.analyzer.submit(long_cv_submission()).await.unwrap();

    assert_eq!(
        h.analyzer.execute(&task.id).await.unwrap(),
        TaskStatus::Completed
    );

    let prompt = h.client.last_prompt();
    assert!(prompt.contains(
        "Rust services for payments. Answered\n\ncustomer phone calls. Maintained Rust"
    ));
    assert!(!prompt.contains("office supply"));
    assert!(!prompt.contains("quarterly team events"));
    assert!(!prompt.contains("tooling and CI"));
}

#[tokio::test]
async fn embedding_failure_fails_task() {
    let h = harness_with_client(
        ScriptedClient::build(Reply::Report, true),
        settings(false, retrieval_settings()),
    );
    let task = h.analyzer.submit(long_cv_submission()).await.unwrap();

    assert_eq!(
        h.analyzer.execute(&task.id).await.unwrap(),
        TaskStatus::Failed
    );
    assert_eq!(h.client.chats.load(Ordering::SeqCst), 0);

    let view = h.analyzer.status(&task.id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Failed);
    assert_eq!(view.report, None);
    let record = h.analyzer.task(&task.id).await.unwrap();
    assert!(record
        .failure_reason
        .unwrap()
        .contains("embedding model not found"));
}

/// Task store whose writes of a `completed` outcome always fail.
struct CompletionWriteFails {
    inner: InMemoryTaskStore,
}

#[async_trait]
impl TaskStore for CompletionWriteFails {
    async fn insert(&self, task: &AnalysisTask) -> anyhow::Result<()> {
        self.inner.insert(task).await
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<AnalysisTask>> {
        self.inner.get(id).await
    }

    async fn transition(
        &self,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
        outcome: Option<&TaskOutcome>,
    ) -> anyhow::Result<bool> {
        if to == TaskStatus::Completed {
            anyhow::bail!("disk I/O error");
        }
        self.inner.transition(id, from, to, outcome).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> anyhow::Result<Vec<String>> {
        self.inner.list_by_status(status).await
    }
}

#[tokio::test]
async fn failed_result_write_leaves_task_failed_not_processing() {
    let store = Arc::new(CompletionWriteFails {
        inner: InMemoryTaskStore::new(),
    });
    let (_tmp, _scheduler, analyzer) = harness_over(
        store,
        ScriptedClient::new(Reply::Report),
        settings(false, None),
    );
    let task = analyzer.submit(docx_submission()).await.unwrap();

    let err = analyzer.execute(&task.id).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Persistence(_)));

    let record = analyzer.task(&task.id).await.unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.report, None);
    assert!(record.failure_reason.unwrap().contains("disk I/O error"));
}

#[tokio::test]
async fn worker_pool_executes_scheduled_tasks() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(InMemoryTaskStore::new());
    let client = ScriptedClient::new(Reply::Report);
    let (scheduler, queue) = worker::channel();
    let analyzer = Arc::new(Analyzer::new(
        store,
        Arc::new(LocalStorage::new(tmp.path())),
        client,
        Arc::new(scheduler),
        AnalysisSettings {
            strict_extraction: false,
            max_upload_bytes: 5120 * 1024,
            retrieval: None,
        },
    ));

    let config = cv_analyzer::config::WorkerConfig {
        concurrency: 2,
        timeout_secs: 30,
    };
    worker::WorkerPool::new(analyzer.clone(), &config).spawn(queue);

    let task = analyzer.submit(docx_submission()).await.unwrap();

    let mut status = TaskStatus::Pending;
    for _ in 0..100 {
        status = analyzer.status(&task.id).await.unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, TaskStatus::Completed);
}
