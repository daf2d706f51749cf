//! Question generation: prompt, service client, and reply parser.
//!
//! - [`build_prompt`] turns sanitized paragraph text into an instruction
//!   string with an explicit output grammar.
//! - [`HttpGenerator`] sends it to the generation service with timeout,
//!   retry, and failure classification.
//! - [`parse`] turns the reply back into ordered [`QaPair`](studyqa_shared::QaPair)s.

pub mod client;
pub mod error;
pub mod parser;
pub mod prompt;
pub mod retry;

pub use client::{GeneratorConfig, HttpGenerator, TextGenerator};
pub use error::GenerationError;
pub use parser::{ParseOutcome, ParseWarning, parse};
pub use prompt::{PromptLimits, build_prompt};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
