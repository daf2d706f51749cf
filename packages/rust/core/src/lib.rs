//! Generation pipeline for StudyQA.
//!
//! This crate ties the prompt builder, generation client, and reply parser
//! to paragraph storage: trigger events go in, persisted question sets and
//! paragraph statuses come out.

pub mod events;
pub mod orchestrator;
pub mod repository;
pub mod writer;

mod slots;

#[cfg(test)]
pub(crate) mod testing;

pub use events::{GenerationEvent, GenerationObserver, SilentObserver, TriggerEvent};
pub use orchestrator::{AttemptHandle, AttemptOutcome, Dispatch, Orchestrator, attempt_budget};
pub use repository::{ParagraphRepository, QuestionRepository};
pub use writer::{CommitOutcome, PersistenceWriter};
