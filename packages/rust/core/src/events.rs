//! Trigger events consumed and lifecycle events emitted by the orchestrator.

use std::time::Duration;

use studyqa_shared::{ContentVersion, FailureReason, ParagraphId};

// ---------------------------------------------------------------------------
// Trigger events
// ---------------------------------------------------------------------------

/// Something the content-management side did that may call for generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    ParagraphCreated {
        id: ParagraphId,
        content: String,
        num_questions: u8,
    },
    ParagraphContentUpdated {
        id: ParagraphId,
        new_content: String,
    },
    /// Explicit user request; regenerates even if the content is unchanged.
    RegenerationRequested { id: ParagraphId },
}

impl TriggerEvent {
    pub fn paragraph_id(&self) -> ParagraphId {
        match self {
            Self::ParagraphCreated { id, .. }
            | Self::ParagraphContentUpdated { id, .. }
            | Self::RegenerationRequested { id } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ParagraphCreated { .. } => "paragraph_created",
            Self::ParagraphContentUpdated { .. } => "paragraph_content_updated",
            Self::RegenerationRequested { .. } => "regeneration_requested",
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle events
// ---------------------------------------------------------------------------

/// Progress of one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Started {
        paragraph_id: ParagraphId,
        content_version: ContentVersion,
    },
    Succeeded {
        paragraph_id: ParagraphId,
        duration: Duration,
        pairs: usize,
        warnings: usize,
    },
    Partial {
        paragraph_id: ParagraphId,
        duration: Duration,
        pairs: usize,
        requested: u8,
        warnings: usize,
    },
    Failed {
        paragraph_id: ParagraphId,
        duration: Duration,
        reason: FailureReason,
        pairs: usize,
        warnings: usize,
    },
    /// Nothing to generate; questions cleared.
    Skipped { paragraph_id: ParagraphId },
    /// The result belonged to an outdated content version and was dropped.
    Discarded {
        paragraph_id: ParagraphId,
        content_version: ContentVersion,
    },
}

impl GenerationEvent {
    pub fn paragraph_id(&self) -> ParagraphId {
        match self {
            Self::Started { paragraph_id, .. }
            | Self::Succeeded { paragraph_id, .. }
            | Self::Partial { paragraph_id, .. }
            | Self::Failed { paragraph_id, .. }
            | Self::Skipped { paragraph_id }
            | Self::Discarded { paragraph_id, .. } => *paragraph_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Succeeded { .. } => "succeeded",
            Self::Partial { .. } => "partial",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
            Self::Discarded { .. } => "discarded",
        }
    }
}

// ---------------------------------------------------------------------------
// Observer trait
// ---------------------------------------------------------------------------

/// Receives every [`GenerationEvent`]. Called from the attempt's task.
pub trait GenerationObserver: Send + Sync {
    fn on_event(&self, event: &GenerationEvent);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl GenerationObserver for SilentObserver {
    fn on_event(&self, _event: &GenerationEvent) {}
}
