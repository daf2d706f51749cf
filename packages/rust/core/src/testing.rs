//! Test doubles shared by the core crate's unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use uuid::Uuid;

use studyqa_generator::{GenerationError, TextGenerator};
use studyqa_shared::{
    ContentVersion, FailureReason, GenerationStatus, Paragraph, ParagraphId, QaPair, Question,
    ReplaceOutcome, Result as StoreResult, StudyQaError,
};
use studyqa_storage::Storage;

use crate::events::{GenerationEvent, GenerationObserver};
use crate::repository::{ParagraphRepository, QuestionRepository};

pub(crate) async fn temp_storage() -> Arc<Storage> {
    let path = std::env::temp_dir().join(format!("studyqa_core_test_{}.db", Uuid::now_v7()));
    Arc::new(Storage::open(&path).await.expect("open temp storage"))
}

/// `n` well-formed pairs mentioning `topic`.
pub(crate) fn pairs(n: u32, topic: &str) -> Vec<QaPair> {
    (1..=n)
        .map(|i| QaPair {
            ordinal: i,
            question: format!("What is {topic} fact {i}?"),
            answer: format!("{topic} fact {i} is true."),
        })
        .collect()
}

/// Generated text in the prompt's output grammar.
pub(crate) fn qa_blocks(n: u32, topic: &str) -> String {
    pairs(n, topic)
        .iter()
        .map(|p| format!("Q{}: {}, Answer: {}", p.ordinal, p.question, p.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

type Responder = dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync;

/// Generator whose replies come from a closure. Optionally blocks on a gate
/// until the test hands out permits.
pub(crate) struct ScriptedGenerator {
    responder: Box<Responder>,
    calls: AtomicUsize,
    waiting: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(
        responder: impl Fn(&str) -> Result<String, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            gate: None,
        }
    }

    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls currently blocked on the gate.
    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        if let Some(gate) = &self.gate {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            gate.acquire().await.expect("gate open").forget();
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
        (self.responder)(prompt)
    }
}

/// Observer that keeps every event.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<GenerationEvent>>,
}

impl RecordingObserver {
    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

impl GenerationObserver for RecordingObserver {
    fn on_event(&self, event: &GenerationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Storage wrapper that can stall the first `mark_pending` call or make
/// status updates fail.
pub(crate) struct TestRepo {
    storage: Arc<Storage>,
    hold: Option<Arc<Semaphore>>,
    mark_calls: AtomicUsize,
    held: AtomicUsize,
    fail_status_updates: bool,
}

impl TestRepo {
    pub(crate) fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            hold: None,
            mark_calls: AtomicUsize::new(0),
            held: AtomicUsize::new(0),
            fail_status_updates: false,
        }
    }

    pub(crate) fn hold_first_mark_pending(mut self) -> Self {
        self.hold = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub(crate) fn failing_status_updates(mut self) -> Self {
        self.fail_status_updates = true;
        self
    }

    /// Calls currently stalled in `mark_pending`.
    pub(crate) fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub(crate) fn release(&self) {
        if let Some(hold) = &self.hold {
            hold.add_permits(1);
        }
    }
}

#[async_trait]
impl ParagraphRepository for TestRepo {
    async fn get(&self, id: &ParagraphId) -> StoreResult<Option<Paragraph>> {
        self.storage.get_paragraph(id).await
    }

    async fn mark_pending(&self, id: &ParagraphId, version: &ContentVersion) -> StoreResult<bool> {
        if let Some(hold) = &self.hold {
            if self.mark_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.held.fetch_add(1, Ordering::SeqCst);
                hold.acquire().await.expect("hold open").forget();
                self.held.fetch_sub(1, Ordering::SeqCst);
            }
        }
        self.storage.mark_pending(id, version).await
    }

    async fn update_status(
        &self,
        id: &ParagraphId,
        status: GenerationStatus,
        version: &ContentVersion,
        reason: Option<FailureReason>,
    ) -> StoreResult<bool> {
        if self.fail_status_updates {
            return Err(StudyQaError::Storage("database is locked".into()));
        }
        self.storage.update_status(id, status, version, reason).await
    }

    async fn content_changed(&self, id: &ParagraphId) -> StoreResult<bool> {
        ParagraphRepository::content_changed(self.storage.as_ref(), id).await
    }
}

#[async_trait]
impl QuestionRepository for TestRepo {
    async fn replace_all(
        &self,
        id: &ParagraphId,
        pairs: &[QaPair],
        version: &ContentVersion,
        status: GenerationStatus,
    ) -> StoreResult<ReplaceOutcome> {
        self.storage.replace_questions(id, pairs, version, status).await
    }

    async fn list_for(&self, id: &ParagraphId) -> StoreResult<Vec<Question>> {
        self.storage.list_questions(id).await
    }
}
