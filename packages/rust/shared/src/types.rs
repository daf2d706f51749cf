//! Core domain types for paragraphs and their generated question sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Question count used when a paragraph does not specify one.
pub const DEFAULT_NUM_QUESTIONS: u8 = 5;

/// Largest question count a paragraph may request.
pub const MAX_NUM_QUESTIONS: u8 = 20;

// ---------------------------------------------------------------------------
// ParagraphId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for paragraph identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParagraphId(pub Uuid);

impl ParagraphId {
    /// Generate a new time-sortable paragraph identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ParagraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParagraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ParagraphId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ContentVersion
// ---------------------------------------------------------------------------

/// SHA-256 hex fingerprint of a paragraph's sanitized content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentVersion(String);

impl ContentVersion {
    /// Fingerprint already-sanitized text.
    pub fn of(sanitized: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sanitized.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap a fingerprint read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ContentVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// GenerationStatus
// ---------------------------------------------------------------------------

/// Where a paragraph stands in the question-generation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Never attempted.
    None,
    /// An attempt is scheduled or running.
    Pending,
    /// Every requested pair was persisted.
    Succeeded,
    /// The attempt produced nothing usable; previous questions kept.
    Failed,
    /// Fewer pairs than requested were persisted.
    Partial,
    /// `num_questions` is 0 or there is no content to ask about.
    Skipped,
}

impl GenerationStatus {
    /// Storage key for the `generation_status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Partial => "partial",
            Self::Skipped => "skipped",
        }
    }

    /// Whether the status ends an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Partial | Self::Skipped
        )
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GenerationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "partial" => Ok(Self::Partial),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown generation status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// FailureReason
// ---------------------------------------------------------------------------

/// Why an attempt ended in [`GenerationStatus::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ConfigurationMissing,
    Unauthorized,
    Forbidden,
    RateLimited,
    Transient,
    Rejected,
    /// The service answered but no question block could be parsed.
    NothingParsed,
    PersistenceFailure,
}

impl FailureReason {
    /// Storage key for the `failure_reason` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "configuration_missing",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Rejected => "rejected",
            Self::NothingParsed => "nothing_parsed",
            Self::PersistenceFailure => "persistence_failure",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "configuration_missing" => Ok(Self::ConfigurationMissing),
            "unauthorized" => Ok(Self::Unauthorized),
            "forbidden" => Ok(Self::Forbidden),
            "rate_limited" => Ok(Self::RateLimited),
            "transient" => Ok(Self::Transient),
            "rejected" => Ok(Self::Rejected),
            "nothing_parsed" => Ok(Self::NothingParsed),
            "persistence_failure" => Ok(Self::PersistenceFailure),
            other => Err(format!("unknown failure reason '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Paragraph
// ---------------------------------------------------------------------------

/// A unit of study content that anchors one generated question set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: ParagraphId,
    /// Rich text as saved by the editor.
    pub content: String,
    /// Requested question count, 0 to [`MAX_NUM_QUESTIONS`].
    pub num_questions: u8,
    /// Fingerprint of the current sanitized content.
    pub content_hash: ContentVersion,
    /// Fingerprint recorded when the last attempt started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_version: Option<ContentVersion>,
    pub generation_status: GenerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Paragraph {
    /// True when the content differs from what was last sent for generation.
    pub fn content_changed(&self) -> bool {
        self.content_version.as_ref() != Some(&self.content_hash)
    }

    /// True when `version` is both the current content and the recorded attempt.
    pub fn is_current(&self, version: &ContentVersion) -> bool {
        &self.content_hash == version && self.content_version.as_ref() == Some(version)
    }
}

// ---------------------------------------------------------------------------
// Generated questions
// ---------------------------------------------------------------------------

/// One parsed question/answer unit, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    /// 1-based position within its batch.
    pub ordinal: u32,
    pub question: String,
    pub answer: String,
}

/// A persisted question with its answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub paragraph_id: ParagraphId,
    pub ordinal: u32,
    pub text: String,
    pub answers: Vec<Answer>,
    pub created_at: DateTime<Utc>,
}

/// A persisted answer to a [`Question`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub question_id: String,
    pub text: String,
}

/// Result of swapping a paragraph's question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The new set is in place; holds the number of questions written.
    Replaced(usize),
    /// The paragraph moved to a newer version; nothing was written.
    Stale,
}
