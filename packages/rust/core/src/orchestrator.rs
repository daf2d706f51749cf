//! Generation Orchestrator: reacts to paragraph events and runs attempts.
//!
//! [`Orchestrator::handle`] decides synchronously whether an event calls for
//! generation, records the target content version as pending, and spawns the
//! attempt on the runtime. The caller is never blocked on the generation
//! service and never sees an error; everything that goes wrong inside an
//! attempt ends up as a paragraph status and a [`GenerationEvent`].
//!
//! Attempts for the same paragraph run one at a time. Before generating and
//! again when committing, an attempt checks that its content version is
//! still the paragraph's current one; outdated work is discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use studyqa_generator::{
    GenerationError, ParseOutcome, PromptLimits, TextGenerator, build_prompt, parse,
};
use studyqa_sanitize::{content_version, sanitize};
use studyqa_shared::{ContentVersion, FailureReason, GenerationStatus, ParagraphId, Result};

use crate::events::{GenerationEvent, GenerationObserver, SilentObserver, TriggerEvent};
use crate::repository::{ParagraphRepository, QuestionRepository};
use crate::slots::GenerationSlots;
use crate::writer::{CommitOutcome, PersistenceWriter};

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/// What [`Orchestrator::handle`] did with an event.
#[derive(Debug)]
pub enum Dispatch {
    /// An attempt was spawned.
    Scheduled(AttemptHandle),
    /// Content edit that sanitizes to the last attempted version.
    Unchanged,
    /// The event's content is no longer what is stored; a later event covers it.
    Superseded,
    /// The paragraph does not exist (deleted before the event was handled).
    NotFound,
    /// The repository could not be read or written.
    Unavailable(String),
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded { persisted: usize },
    Partial { persisted: usize, requested: u8 },
    Failed(FailureReason),
    Skipped,
    /// Content changed while the attempt ran; nothing was written.
    Discarded,
    /// The attempt task panicked or was cancelled, or its final status
    /// could not be written. The paragraph may still read as pending.
    Aborted,
}

impl AttemptOutcome {
    pub fn status(&self) -> Option<GenerationStatus> {
        match self {
            Self::Succeeded { .. } => Some(GenerationStatus::Succeeded),
            Self::Partial { .. } => Some(GenerationStatus::Partial),
            Self::Failed(_) => Some(GenerationStatus::Failed),
            Self::Skipped => Some(GenerationStatus::Skipped),
            Self::Discarded | Self::Aborted => None,
        }
    }
}

/// A spawned attempt. Dropping it does not cancel the attempt.
#[derive(Debug)]
pub struct AttemptHandle {
    paragraph_id: ParagraphId,
    handle: JoinHandle<AttemptOutcome>,
}

impl AttemptHandle {
    pub fn paragraph_id(&self) -> ParagraphId {
        self.paragraph_id
    }

    /// Wait for the attempt to finish.
    pub async fn wait(self) -> AttemptOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(paragraph_id = %self.paragraph_id, error = %e, "generation attempt aborted");
                AttemptOutcome::Aborted
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Event-driven scheduler for question generation.
pub struct Orchestrator<R, G> {
    inner: Arc<Inner<R, G>>,
}

impl<R, G> Clone for Orchestrator<R, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<R, G> {
    repo: Arc<R>,
    generator: Arc<G>,
    writer: PersistenceWriter<R>,
    limits: PromptLimits,
    slots: GenerationSlots,
    observer: Arc<dyn GenerationObserver>,
}

enum Decision {
    Generate(ContentVersion),
    Ignore(Dispatch),
}

impl<R, G> Orchestrator<R, G>
where
    R: ParagraphRepository + QuestionRepository + 'static,
    G: TextGenerator + 'static,
{
    pub fn new(repo: Arc<R>, generator: Arc<G>, limits: PromptLimits) -> Self {
        Self::with_observer(repo, generator, limits, Arc::new(SilentObserver))
    }

    pub fn with_observer(
        repo: Arc<R>,
        generator: Arc<G>,
        limits: PromptLimits,
        observer: Arc<dyn GenerationObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                writer: PersistenceWriter::new(Arc::clone(&repo)),
                repo,
                generator,
                limits,
                slots: GenerationSlots::default(),
                observer,
            }),
        }
    }

    /// React to a content-management event.
    ///
    /// Must be called from within a Tokio runtime. Returns once the attempt
    /// is recorded as pending and spawned; it does not wait for generation.
    #[instrument(skip_all, fields(event = event.name(), paragraph_id = %event.paragraph_id()))]
    pub async fn handle(&self, event: TriggerEvent) -> Dispatch {
        let id = event.paragraph_id();

        let target = match self.decide(&event).await {
            Ok(Decision::Generate(target)) => target,
            Ok(Decision::Ignore(dispatch)) => {
                debug!(?dispatch, "no generation needed");
                return dispatch;
            }
            Err(e) => {
                error!(error = %e, "cannot read paragraph");
                return Dispatch::Unavailable(e.to_string());
            }
        };

        match self.inner.repo.mark_pending(&id, &target).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("content changed before the attempt was recorded");
                return Dispatch::Superseded;
            }
            Err(e) => {
                error!(error = %e, "cannot record pending generation");
                return Dispatch::Unavailable(e.to_string());
            }
        }

        info!(content_version = target.short(), "generation scheduled");
        let span = info_span!("attempt", paragraph_id = %id, content_version = target.short());
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_attempt(id, target).await }.instrument(span));

        Dispatch::Scheduled(AttemptHandle {
            paragraph_id: id,
            handle,
        })
    }

    async fn decide(&self, event: &TriggerEvent) -> Result<Decision> {
        let id = event.paragraph_id();
        let Some(paragraph) = self.inner.repo.get(&id).await? else {
            return Ok(Decision::Ignore(Dispatch::NotFound));
        };

        match event {
            TriggerEvent::ParagraphCreated {
                content,
                num_questions,
                ..
            } => {
                if *num_questions != paragraph.num_questions {
                    debug!(
                        event_count = *num_questions,
                        stored_count = paragraph.num_questions,
                        "using stored question count"
                    );
                }
                if content_version(content) != paragraph.content_hash {
                    return Ok(Decision::Ignore(Dispatch::Superseded));
                }
            }
            TriggerEvent::ParagraphContentUpdated { new_content, .. } => {
                if content_version(new_content) != paragraph.content_hash {
                    return Ok(Decision::Ignore(Dispatch::Superseded));
                }
                if !self.inner.repo.content_changed(&id).await? {
                    return Ok(Decision::Ignore(Dispatch::Unchanged));
                }
            }
            TriggerEvent::RegenerationRequested { .. } => {}
        }

        Ok(Decision::Generate(paragraph.content_hash))
    }
}

// ---------------------------------------------------------------------------
// Attempt
// ---------------------------------------------------------------------------

impl<R, G> Inner<R, G>
where
    R: ParagraphRepository + QuestionRepository,
    G: TextGenerator,
{
    async fn run_attempt(&self, id: ParagraphId, version: ContentVersion) -> AttemptOutcome {
        let _slot = self.slots.acquire(id).await;
        let started = Instant::now();

        let paragraph = match self.repo.get(&id).await {
            Ok(Some(p)) if p.is_current(&version) => p,
            Ok(_) => return self.discard(id, version),
            Err(e) => {
                error!(error = %e, "cannot re-read paragraph");
                return self
                    .fail(id, &version, FailureReason::PersistenceFailure, started, 0, 0)
                    .await;
            }
        };

        let text = sanitize(&paragraph.content);
        if paragraph.num_questions == 0 || text.is_empty() {
            return self.skip(id, &version).await;
        }

        self.emit(GenerationEvent::Started {
            paragraph_id: id,
            content_version: version.clone(),
        });

        let requested = paragraph.num_questions;
        let prompt = build_prompt(&text, requested, &self.limits);
        debug!(prompt_len = prompt.len(), requested, "requesting generation");

        let raw = match self.generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(GenerationError::MalformedEnvelope { pointer }) => {
                warn!(%pointer, "response envelope carried no text");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, error_kind = e.kind(), "generation failed");
                return self
                    .fail(id, &version, e.failure_reason(), started, 0, 0)
                    .await;
            }
        };

        let ParseOutcome { pairs, warnings } = parse(&raw, usize::from(requested));
        for warning in &warnings {
            warn!(%warning, "generated text did not parse cleanly");
        }
        if pairs.is_empty() {
            return self
                .fail(
                    id,
                    &version,
                    FailureReason::NothingParsed,
                    started,
                    0,
                    warnings.len(),
                )
                .await;
        }

        match self.writer.commit(&id, &pairs, &version, requested).await {
            Ok(CommitOutcome::Committed { persisted, status }) => {
                let duration = started.elapsed();
                info!(
                    %status,
                    persisted,
                    requested,
                    warnings = warnings.len(),
                    duration_ms = duration.as_millis() as u64,
                    "generation finished"
                );
                if status == GenerationStatus::Succeeded {
                    self.emit(GenerationEvent::Succeeded {
                        paragraph_id: id,
                        duration,
                        pairs: persisted,
                        warnings: warnings.len(),
                    });
                    AttemptOutcome::Succeeded { persisted }
                } else {
                    self.emit(GenerationEvent::Partial {
                        paragraph_id: id,
                        duration,
                        pairs: persisted,
                        requested,
                        warnings: warnings.len(),
                    });
                    AttemptOutcome::Partial {
                        persisted,
                        requested,
                    }
                }
            }
            Ok(CommitOutcome::Stale) => self.discard(id, version),
            Err(e) => {
                error!(error = %e, "cannot persist generated questions");
                self.fail(
                    id,
                    &version,
                    FailureReason::PersistenceFailure,
                    started,
                    pairs.len(),
                    warnings.len(),
                )
                .await
            }
        }
    }

    async fn skip(&self, id: ParagraphId, version: &ContentVersion) -> AttemptOutcome {
        match self.writer.clear(&id, version).await {
            Ok(CommitOutcome::Committed { .. }) => {
                info!("nothing to generate, questions cleared");
                self.emit(GenerationEvent::Skipped { paragraph_id: id });
                AttemptOutcome::Skipped
            }
            Ok(CommitOutcome::Stale) => self.discard(id, version.clone()),
            Err(e) => {
                error!(error = %e, "cannot clear questions");
                self.fail(
                    id,
                    version,
                    FailureReason::PersistenceFailure,
                    Instant::now(),
                    0,
                    0,
                )
                .await
            }
        }
    }

    /// Record a failure. The previous question set is left in place.
    async fn fail(
        &self,
        id: ParagraphId,
        version: &ContentVersion,
        reason: FailureReason,
        started: Instant,
        pairs: usize,
        warnings: usize,
    ) -> AttemptOutcome {
        match self
            .repo
            .update_status(&id, GenerationStatus::Failed, version, Some(reason))
            .await
        {
            Ok(true) => {}
            Ok(false) => return self.discard(id, version.clone()),
            Err(e) => {
                error!(error = %e, %reason, "cannot record failure status");
                return AttemptOutcome::Aborted;
            }
        }

        let duration = started.elapsed();
        warn!(
            %reason,
            duration_ms = duration.as_millis() as u64,
            "generation attempt failed"
        );
        self.emit(GenerationEvent::Failed {
            paragraph_id: id,
            duration,
            reason,
            pairs,
            warnings,
        });
        AttemptOutcome::Failed(reason)
    }

    fn discard(&self, id: ParagraphId, version: ContentVersion) -> AttemptOutcome {
        info!("content changed during generation, result discarded");
        self.emit(GenerationEvent::Discarded {
            paragraph_id: id,
            content_version: version,
        });
        AttemptOutcome::Discarded
    }

    fn emit(&self, event: GenerationEvent) {
        self.observer.on_event(&event);
    }
}

/// Upper bound on how long a caller may want to wait for an attempt, given
/// the generator's timeout and retry budget. Saturates at `Duration::MAX`.
pub fn attempt_budget(timeout: Duration, max_attempts: u32, max_delay: Duration) -> Duration {
    let attempts = max_attempts.max(1);
    timeout
        .checked_mul(attempts)
        .zip(max_delay.checked_mul(attempts - 1))
        .and_then(|(requests, delays)| requests.checked_add(delays))
        .unwrap_or(Duration::MAX)
}
