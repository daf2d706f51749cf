//! Application configuration for StudyQA.
//!
//! User config lives at `~/.studyqa/studyqa.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyQaError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "studyqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".studyqa";

// ---------------------------------------------------------------------------
// Config structs (matching studyqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generation service settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Prompt length constraints.
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database file location. A leading `~/` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Question count for new paragraphs when none is given.
    #[serde(default = "default_num_questions")]
    pub num_questions: u8,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            num_questions: default_num_questions(),
        }
    }
}

fn default_database_path() -> String {
    "~/.studyqa/studyqa.db".into()
}
fn default_num_questions() -> u8 {
    crate::types::DEFAULT_NUM_QUESTIONS
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Full URL of the generate-content endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request header that carries the API key.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// JSON pointer to the generated text inside the response body.
    #[serde(default = "default_response_pointer")]
    pub response_pointer: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry and backoff schedule.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            api_key_header: default_api_key_header(),
            response_pointer: default_response_pointer(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        .into()
}
fn default_api_key_env() -> String {
    "STUDYQA_API_KEY".into()
}
fn default_api_key_header() -> String {
    "x-goog-api-key".into()
}
fn default_response_pointer() -> String {
    "/candidates/0/content/parts/0/text".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[generation.retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per generation request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff for transient failures; doubles each retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// First backoff after a rate-limit response; doubles each retry.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Upper bound on any single backoff.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    2_000
}
fn default_rate_limit_delay_ms() -> u64 {
    30_000
}
fn default_max_delay_ms() -> u64 {
    120_000
}

/// `[prompt]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Word limit stated in the prompt for each question.
    #[serde(default = "default_max_question_words")]
    pub max_question_words: u32,

    /// Word limit stated in the prompt for each answer.
    #[serde(default = "default_max_answer_words")]
    pub max_answer_words: u32,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_question_words: default_max_question_words(),
            max_answer_words: default_max_answer_words(),
        }
    }
}

fn default_max_question_words() -> u32 {
    13
}
fn default_max_answer_words() -> u32 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.studyqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| StudyQaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.studyqa/studyqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StudyQaError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        StudyQaError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values that would make the pipeline misbehave.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let n = config.defaults.num_questions;
    if n > crate::types::MAX_NUM_QUESTIONS {
        return Err(StudyQaError::config(format!(
            "defaults.num_questions must be between 0 and {}, got {n}",
            crate::types::MAX_NUM_QUESTIONS
        )));
    }
    if config.generation.retry.max_attempts == 0 {
        return Err(StudyQaError::config(
            "generation.retry.max_attempts must be at least 1",
        ));
    }
    if config.generation.timeout_secs == 0 {
        return Err(StudyQaError::config(
            "generation.timeout_secs must be at least 1",
        ));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StudyQaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StudyQaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StudyQaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the generation credential from the configured env var.
///
/// Unset or empty yields `None`; generation is then skipped rather than failing.
pub fn api_key(config: &AppConfig) -> Option<String> {
    match std::env::var(&config.generation.api_key_env) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

/// Resolve the configured database path, expanding a leading `~/`.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    expand_home(&config.defaults.database_path)
}

fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| StudyQaError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}
