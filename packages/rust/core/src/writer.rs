//! Persistence Writer: validates a parsed batch and swaps it in atomically.

use std::sync::Arc;

use tracing::debug;

use studyqa_shared::{
    ContentVersion, GenerationStatus, ParagraphId, QaPair, ReplaceOutcome, Result, StudyQaError,
};

use crate::repository::QuestionRepository;

/// What happened to a batch handed to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The batch replaced the previous set; `status` was recorded with it.
    Committed {
        persisted: usize,
        status: GenerationStatus,
    },
    /// The paragraph moved on to newer content; nothing was written.
    Stale,
}

/// Build-then-swap writer over a [`QuestionRepository`].
pub struct PersistenceWriter<R> {
    repo: Arc<R>,
}

impl<R: QuestionRepository> PersistenceWriter<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Replace the paragraph's questions with `pairs` generated for `version`.
    ///
    /// The status is `Succeeded` when all `requested` pairs are present and
    /// `Partial` otherwise. An invalid batch is rejected before anything is
    /// touched, so the previous set survives.
    pub async fn commit(
        &self,
        id: &ParagraphId,
        pairs: &[QaPair],
        version: &ContentVersion,
        requested: u8,
    ) -> Result<CommitOutcome> {
        validate_batch(pairs, requested)?;

        let status = if pairs.len() == usize::from(requested) {
            GenerationStatus::Succeeded
        } else {
            GenerationStatus::Partial
        };

        let outcome = self.repo.replace_all(id, pairs, version, status).await?;
        debug!(paragraph_id = %id, ?outcome, %status, "commit finished");
        Ok(match outcome {
            ReplaceOutcome::Replaced(persisted) => CommitOutcome::Committed { persisted, status },
            ReplaceOutcome::Stale => CommitOutcome::Stale,
        })
    }

    /// Remove every question and mark the paragraph `Skipped` for `version`.
    pub async fn clear(&self, id: &ParagraphId, version: &ContentVersion) -> Result<CommitOutcome> {
        let status = GenerationStatus::Skipped;
        Ok(match self.repo.replace_all(id, &[], version, status).await? {
            ReplaceOutcome::Replaced(persisted) => CommitOutcome::Committed { persisted, status },
            ReplaceOutcome::Stale => CommitOutcome::Stale,
        })
    }
}

/// A batch must be non-empty, within the requested count, numbered 1..=n in
/// order, and free of blank text.
fn validate_batch(pairs: &[QaPair], requested: u8) -> Result<()> {
    if pairs.is_empty() {
        return Err(StudyQaError::validation("refusing to commit an empty batch"));
    }
    if pairs.len() > usize::from(requested) {
        return Err(StudyQaError::validation(format!(
            "batch has {} pairs but only {requested} were requested",
            pairs.len()
        )));
    }
    for (index, pair) in pairs.iter().enumerate() {
        let expected = index as u32 + 1;
        if pair.ordinal != expected {
            return Err(StudyQaError::validation(format!(
                "pair at position {expected} has ordinal {}",
                pair.ordinal
            )));
        }
        if pair.question.trim().is_empty() || pair.answer.trim().is_empty() {
            return Err(StudyQaError::validation(format!(
                "pair {expected} has blank question or answer text"
            )));
        }
    }
    Ok(())
}
