//! Shared types, error model, and configuration for StudyQA.
//!
//! This crate is the foundation depended on by all other StudyQA crates.
//! It provides:
//! - [`StudyQaError`] — the unified error type
//! - Domain types ([`Paragraph`], [`QaPair`], [`Question`], [`ContentVersion`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GenerationConfig, PromptConfig, RetryConfig, api_key,
    config_dir, config_file_path, database_path, init_config, load_config, load_config_from,
    validate_config,
};
pub use error::{Result, StudyQaError};
pub use types::{
    Answer, ContentVersion, DEFAULT_NUM_QUESTIONS, FailureReason, GenerationStatus,
    MAX_NUM_QUESTIONS, Paragraph, ParagraphId, QaPair, Question, ReplaceOutcome,
};
