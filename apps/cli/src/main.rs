//! StudyQA CLI: manage study paragraphs and their generated questions.
//!
//! Paragraph edits made here go through the generation orchestrator, which
//! asks the text-generation service for question/answer pairs and stores them.

mod commands;
mod progress;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
