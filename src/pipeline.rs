//! Matrix generation pipeline
//!
//! Provides the `AiBackend` trait and `generate_matrices` function that
//! encapsulates the full validate → prompt → generate → parse flow.
//! The CLI and the WASM front end produce identical tables from the same
//! AI reply.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::extract::ReferenceSet;
use crate::parse::{parse_matrices_report, ParseIssue};
use crate::profile::PROFILE;
use crate::prompt::build_matrix_prompt;
use crate::table::Table;
use crate::validation::{check_strict, validate_request};

// ─── Errors ──────────────────────────────────────────────────────────

/// Pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither inline text nor any file text was supplied
    #[error("no reference material supplied")]
    MissingReference,
    /// No credential for the generation service
    #[error("missing API key: set GEMINI_API_KEY")]
    MissingApiKey,
    /// AI backend returned an error or no usable text
    #[error("AI error: {0}")]
    AiError(String),
    /// Reply parsed into zero tables
    #[error("reply contained no matrix sections")]
    EmptyResult,
    /// Strict mode rejected a reply that needed cell-level normalization
    #[error("reply needed {} normalizations in strict mode", .0.len())]
    StrictViolation(Vec<ParseIssue>),
    /// Another generation is already in flight
    #[error("a generation is already in progress")]
    Busy,
}

impl PipelineError {
    /// Message shown to the user, from the profile's message table.
    pub fn user_message(&self) -> String {
        let m = &PROFILE.messages;
        match self {
            Self::MissingReference => m.missing_reference.clone(),
            Self::MissingApiKey | Self::AiError(_) => m.generation_failed.clone(),
            Self::EmptyResult => m.empty_result.clone(),
            Self::StrictViolation(issues) => {
                let details: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
                format!("{} ({})", m.empty_result, details.join("; "))
            }
            Self::Busy => m.busy.clone(),
        }
    }
}

// ─── AiBackend trait ─────────────────────────────────────────────────

/// Trait for sending prompts to an AI model.
/// Implemented by the Gemini REST client natively and by mocks in tests.
pub trait AiBackend {
    /// Send a text prompt and return the raw text response.
    fn send_prompt(&self, prompt: &str) -> Result<String, PipelineError>;
}

// ─── Config / Result types ───────────────────────────────────────────

/// What the user asked for
#[derive(Debug, Clone, Default)]
pub struct MatrixRequest {
    pub reference: ReferenceSet,
    /// Raw column template, e.g. "STT, Nội dung, Số câu"
    pub template: String,
    /// Free-form extra instructions; blank means the profile default
    pub instructions: String,
}

/// Configuration for a generation run
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateConfig {
    /// Reject replies whose rows had to be padded, truncated or given
    /// fallback headers
    pub strict: bool,
}

/// Full result of a generation run
#[derive(Debug, Clone)]
pub struct MatrixResult {
    pub tables: Vec<Table>,
    pub issues: Vec<ParseIssue>,
    pub raw_response: String,
}

// ─── Single-flight guard ─────────────────────────────────────────────

/// Allows at most one generation in flight; a second caller is refused,
/// not queued.
#[derive(Debug, Default)]
pub struct InFlightGuard {
    busy: AtomicBool,
}

/// Held while a generation runs; releases the guard on drop
#[derive(Debug)]
pub struct InFlightPermit<'a> {
    guard: &'a InFlightGuard,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<InFlightPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit { guard: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

/// A user session: owns the guard so overlapping requests are refused.
#[derive(Debug, Default)]
pub struct MatrixSession {
    guard: InFlightGuard,
}

impl MatrixSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_generating(&self) -> bool {
        self.guard.is_busy()
    }

    /// Run `generate_matrices` unless another run is in flight.
    pub fn generate(
        &self,
        backend: &dyn AiBackend,
        request: &MatrixRequest,
        config: &GenerateConfig,
    ) -> Result<MatrixResult, PipelineError> {
        let _permit = self.guard.try_acquire().ok_or(PipelineError::Busy)?;
        generate_matrices(backend, request, config)
    }
}

// ─── Pipeline ────────────────────────────────────────────────────────

/// Run the full generation pipeline.
///
/// 1. Validate the request (reference material, template columns)
/// 2. Build the prompt and send it
/// 3. Parse the reply; zero tables is a failure
///
/// Nothing partial is returned alongside an error.
pub fn generate_matrices(
    backend: &dyn AiBackend,
    request: &MatrixRequest,
    config: &GenerateConfig,
) -> Result<MatrixResult, PipelineError> {
    // ── Step 1: Validate before any network call ──

    let columns = validate_request(request)?;

    // ── Step 2: Prompt + generation ──

    let prompt = build_matrix_prompt(&columns, &request.instructions, &request.reference);
    info!(
        columns = columns.len(),
        files = request.reference.files.len(),
        prompt_chars = prompt.chars().count(),
        "sending matrix prompt"
    );

    let response = backend.send_prompt(&prompt)?;
    if response.trim().is_empty() {
        return Err(PipelineError::AiError("empty response".to_string()));
    }
    debug!(response_chars = response.chars().count(), "received reply");

    // ── Step 3: Parse ──

    let report = parse_matrices_report(&response, &columns);
    for issue in &report.issues {
        warn!(%issue, "reply normalized");
    }

    if report.tables.is_empty() {
        return Err(PipelineError::EmptyResult);
    }
    if config.strict {
        check_strict(&report)?;
    }

    info!(tables = report.tables.len(), "matrices built");
    Ok(MatrixResult {
        tables: report.tables,
        issues: report.issues,
        raw_response: response,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::sync::mpsc;
    use std::sync::Mutex;

    /// Mock AI backend that returns a predefined response
    struct MockBackend {
        response: Result<String, String>,
        calls: Cell<usize>,
        last_prompt: RefCell<String>,
    }

    impl MockBackend {
        fn replying(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                calls: Cell::new(0),
                last_prompt: RefCell::new(String::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                calls: Cell::new(0),
                last_prompt: RefCell::new(String::new()),
            }
        }
    }

    impl AiBackend for MockBackend {
        fn send_prompt(&self, prompt: &str) -> Result<String, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            *self.last_prompt.borrow_mut() = prompt.to_string();
            self.response.clone().map_err(PipelineError::AiError)
        }
    }

    fn request(reference: &str, template: &str) -> MatrixRequest {
        MatrixRequest {
            reference: ReferenceSet::new(reference.to_string()),
            template: template.to_string(),
            instructions: String::new(),
        }
    }

    const REPLY: &str = "SECTION: MA TRẬN ĐỌC\nHEADERS: STT|||Nội dung\nROW: 1|||Thơ\n\
                         SECTION: MA TRẬN VIẾT\nROW: 1|||Nghị luận|||extra\n";

    #[test]
    fn test_full_pipeline_mock() {
        let backend = MockBackend::replying(REPLY);
        let result =
            generate_matrices(&backend, &request("Bài 1", "STT, Nội dung"), &GenerateConfig::default())
                .unwrap();

        assert_eq!(backend.calls.get(), 1);
        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.tables[0].title, "MA TRẬN ĐỌC");
        // second section has no header line: template columns used
        assert_eq!(result.tables[1].headers, vec!["STT", "Nội dung"]);
        assert_eq!(result.tables[1].rows, vec![vec!["1", "Nghị luận"]]);
        assert_eq!(result.raw_response, REPLY);
        assert_eq!(result.issues.len(), 2);
    }

    #[test]
    fn test_prompt_carries_template_and_reference() {
        let backend = MockBackend::replying(REPLY);
        let mut req = request("Bài 1: Lượm", "STT; Chuẩn cần đánh giá");
        req.reference.push("b.txt", "Bài 2: Mây và sóng");
        generate_matrices(&backend, &req, &GenerateConfig::default()).unwrap();

        let prompt = backend.last_prompt.borrow();
        assert!(prompt.contains("STT | Chuẩn cần đánh giá"));
        assert!(prompt.contains("Bài 1: Lượm"));
        assert!(prompt.contains("Bài 2: Mây và sóng"));
    }

    #[test]
    fn test_missing_reference_skips_network() {
        let backend = MockBackend::replying(REPLY);
        let result = generate_matrices(&backend, &request("  ", "A, B"), &GenerateConfig::default());
        assert!(matches!(result, Err(PipelineError::MissingReference)));
        assert_eq!(backend.calls.get(), 0);
    }

    #[test]
    fn test_file_text_alone_is_enough() {
        let backend = MockBackend::replying(REPLY);
        let mut req = request("", "A, B");
        req.reference.push("a.pdf", "Nội dung từ PDF");
        assert!(generate_matrices(&backend, &req, &GenerateConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_template_uses_reply_headers() {
        let backend = MockBackend::replying("SECTION: T\nHEADERS: A|||B\nROW: 1|||2");
        let result = generate_matrices(&backend, &request("x", ""), &GenerateConfig::default())
            .unwrap();
        assert_eq!(backend.calls.get(), 1);
        assert_eq!(result.tables.len(), 1);
        assert_eq!(result.tables[0].headers, vec!["A", "B"]);
        assert_eq!(result.tables[0].rows, vec![vec!["1", "2"]]);
    }

    #[test]
    fn test_backend_failure_surfaces() {
        let backend = MockBackend::failing("quota exceeded");
        let result = generate_matrices(&backend, &request("x", "A"), &GenerateConfig::default());
        let err = result.unwrap_err();
        assert!(matches!(err, PipelineError::AiError(ref m) if m == "quota exceeded"));
        assert_eq!(err.user_message(), PROFILE.messages.generation_failed);
    }

    #[test]
    fn test_blank_response_is_generation_failure() {
        let backend = MockBackend::replying("  \n ");
        let result = generate_matrices(&backend, &request("x", "A"), &GenerateConfig::default());
        assert!(matches!(result, Err(PipelineError::AiError(_))));
    }

    #[test]
    fn test_reply_without_sections_is_empty_result() {
        let backend = MockBackend::replying("Xin lỗi, tôi không thể giúp.");
        let err = generate_matrices(&backend, &request("x", "A"), &GenerateConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult));
        assert_eq!(err.user_message(), PROFILE.messages.empty_result);
    }

    #[test]
    fn test_strict_rejects_normalized_reply() {
        let backend = MockBackend::replying(REPLY);
        let config = GenerateConfig { strict: true };
        let result = generate_matrices(&backend, &request("x", "STT, Nội dung"), &config);
        match result {
            Err(PipelineError::StrictViolation(issues)) => assert_eq!(issues.len(), 2),
            other => panic!("expected strict violation, got {:?}", other),
        }
    }

    #[test]
    fn test_strict_accepts_clean_reply() {
        let backend = MockBackend::replying("SECTION: T\nHEADERS: A|||B\nROW: 1|||2");
        let config = GenerateConfig { strict: true };
        let result = generate_matrices(&backend, &request("x", "A, B"), &config).unwrap();
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_guard_single_slot() {
        let guard = InFlightGuard::new();
        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_session_releases_guard_after_error() {
        let session = MatrixSession::new();
        let backend = MockBackend::failing("boom");
        assert!(session.generate(&backend, &request("x", "A"), &GenerateConfig::default()).is_err());
        assert!(!session.is_generating());
        let backend = MockBackend::replying(REPLY);
        assert!(session.generate(&backend, &request("x", "A"), &GenerateConfig::default()).is_ok());
    }

    /// Backend that blocks until the test releases it
    struct BlockingBackend {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl AiBackend for BlockingBackend {
        fn send_prompt(&self, _prompt: &str) -> Result<String, PipelineError> {
            self.started.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(REPLY.to_string())
        }
    }

    #[test]
    fn test_session_refuses_overlapping_generation() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let backend = BlockingBackend {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        };
        let session = MatrixSession::new();
        let req = request("x", "A, B");

        std::thread::scope(|s| {
            let first = s.spawn(|| session.generate(&backend, &req, &GenerateConfig::default()));
            started_rx.recv().unwrap();

            assert!(session.is_generating());
            let second = session.generate(&backend, &req, &GenerateConfig::default());
            assert!(matches!(second, Err(PipelineError::Busy)));

            release_tx.send(()).unwrap();
            assert!(first.join().unwrap().is_ok());
        });
        assert!(!session.is_generating());
    }
}
