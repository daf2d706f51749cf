//! Repository seams between the pipeline and persistence.
//!
//! The orchestrator only talks to these traits; [`Storage`] implements both.

use async_trait::async_trait;

use studyqa_shared::{
    ContentVersion, FailureReason, GenerationStatus, Paragraph, ParagraphId, QaPair, Question,
    ReplaceOutcome, Result, StudyQaError,
};
use studyqa_storage::Storage;

/// Paragraph reads and generation-state writes.
#[async_trait]
pub trait ParagraphRepository: Send + Sync {
    async fn get(&self, id: &ParagraphId) -> Result<Option<Paragraph>>;

    /// Record that an attempt for `version` is scheduled, if `version` is
    /// still the current content. Returns whether it applied.
    async fn mark_pending(&self, id: &ParagraphId, version: &ContentVersion) -> Result<bool>;

    /// Set a terminal status if `version` is still current. Returns whether it applied.
    async fn update_status(
        &self,
        id: &ParagraphId,
        status: GenerationStatus,
        version: &ContentVersion,
        reason: Option<FailureReason>,
    ) -> Result<bool>;

    /// Whether the current content differs from the last attempted version.
    async fn content_changed(&self, id: &ParagraphId) -> Result<bool>;
}

/// Question-set persistence.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Atomically swap the paragraph's questions for `pairs` and set `status`.
    async fn replace_all(
        &self,
        id: &ParagraphId,
        pairs: &[QaPair],
        version: &ContentVersion,
        status: GenerationStatus,
    ) -> Result<ReplaceOutcome>;

    async fn list_for(&self, id: &ParagraphId) -> Result<Vec<Question>>;
}

#[async_trait]
impl ParagraphRepository for Storage {
    async fn get(&self, id: &ParagraphId) -> Result<Option<Paragraph>> {
        self.get_paragraph(id).await
    }

    async fn mark_pending(&self, id: &ParagraphId, version: &ContentVersion) -> Result<bool> {
        Storage::mark_pending(self, id, version).await
    }

    async fn update_status(
        &self,
        id: &ParagraphId,
        status: GenerationStatus,
        version: &ContentVersion,
        reason: Option<FailureReason>,
    ) -> Result<bool> {
        Storage::update_status(self, id, status, version, reason).await
    }

    async fn content_changed(&self, id: &ParagraphId) -> Result<bool> {
        self.get_paragraph(id)
            .await?
            .map(|p| p.content_changed())
            .ok_or_else(|| StudyQaError::not_found("paragraph", id))
    }
}

#[async_trait]
impl QuestionRepository for Storage {
    async fn replace_all(
        &self,
        id: &ParagraphId,
        pairs: &[QaPair],
        version: &ContentVersion,
        status: GenerationStatus,
    ) -> Result<ReplaceOutcome> {
        self.replace_questions(id, pairs, version, status).await
    }

    async fn list_for(&self, id: &ParagraphId) -> Result<Vec<Question>> {
        self.list_questions(id).await
    }
}
