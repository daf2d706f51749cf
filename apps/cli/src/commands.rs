//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use tracing::{info, warn};

use studyqa_core::{AttemptOutcome, Dispatch, Orchestrator, TriggerEvent, attempt_budget};
use studyqa_generator::{GeneratorConfig, HttpGenerator, PromptLimits};
use studyqa_shared::{
    AppConfig, GenerationStatus, Paragraph, ParagraphId, api_key, database_path, init_config,
    load_config,
};
use studyqa_storage::Storage;

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// StudyQA: generate study questions from paragraphs.
#[derive(Parser)]
#[command(
    name = "studyqa",
    version,
    about = "Store study paragraphs and generate question/answer sets for them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `defaults.database_path`).
    #[arg(long, global = true, env = "STUDYQA_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Paragraph content given inline or read from a file.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub(crate) struct ContentSource {
    /// Paragraph content (plain text or HTML).
    #[arg(long)]
    pub content: Option<String>,

    /// Read paragraph content from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Add a paragraph and generate its questions.
    Add {
        #[command(flatten)]
        source: ContentSource,

        /// Questions to generate (defaults to `defaults.num_questions`).
        #[arg(short, long)]
        num_questions: Option<u8>,
    },

    /// Replace a paragraph's content; regenerates if the content changed.
    Edit {
        /// Paragraph ID.
        id: ParagraphId,

        #[command(flatten)]
        source: ContentSource,
    },

    /// Regenerate a paragraph's questions even if its content is unchanged.
    Regenerate {
        /// Paragraph ID.
        id: ParagraphId,
    },

    /// Change how many questions a paragraph gets, then regenerate.
    SetCount {
        /// Paragraph ID.
        id: ParagraphId,

        /// New question count (0 clears the questions).
        count: u8,
    },

    /// Show a paragraph with its questions and answers.
    Show {
        /// Paragraph ID.
        id: ParagraphId,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List paragraphs.
    List {
        /// Only paragraphs with this generation status.
        #[arg(long)]
        status: Option<GenerationStatus>,
    },

    /// Delete a paragraph and its questions.
    Remove {
        /// Paragraph ID.
        id: ParagraphId,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "studyqa=info",
        1 => "studyqa=debug",
        _ => "studyqa=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Add {
            source,
            num_questions,
        } => cmd_add(&open_app(db).await?, &source, num_questions).await,
        Command::Edit { id, source } => cmd_edit(&open_app(db).await?, id, &source).await,
        Command::Regenerate { id } => cmd_regenerate(&open_app(db).await?, id).await,
        Command::SetCount { id, count } => cmd_set_count(&open_app(db).await?, id, count).await,
        Command::Show { id, json } => cmd_show(&open_app(db).await?, id, json).await,
        Command::List { status } => cmd_list(&open_app(db).await?, status).await,
        Command::Remove { id } => cmd_remove(&open_app(db).await?, id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Loaded config plus the opened database.
struct App {
    config: AppConfig,
    storage: Arc<Storage>,
}

async fn open_app(db: Option<PathBuf>) -> Result<App> {
    let config = load_config()?;
    let db_path = match db {
        Some(path) => path,
        None => database_path(&config)?,
    };
    let storage = Storage::open(&db_path)
        .await
        .wrap_err_with(|| format!("cannot open database at {}", db_path.display()))?;
    Ok(App {
        config,
        storage: Arc::new(storage),
    })
}

// ---------------------------------------------------------------------------
// Paragraph commands
// ---------------------------------------------------------------------------

async fn cmd_add(app: &App, source: &ContentSource, num_questions: Option<u8>) -> Result<()> {
    let content = read_content(source)?;
    let num_questions = num_questions.unwrap_or(app.config.defaults.num_questions);

    let paragraph = app.storage.insert_paragraph(&content, num_questions).await?;
    info!(paragraph_id = %paragraph.id, num_questions, "paragraph added");
    println!("Paragraph {}", paragraph.id);

    generate(
        app,
        TriggerEvent::ParagraphCreated {
            id: paragraph.id,
            content,
            num_questions,
        },
    )
    .await?;
    print_paragraph(app, paragraph.id).await
}

async fn cmd_edit(app: &App, id: ParagraphId, source: &ContentSource) -> Result<()> {
    let content = read_content(source)?;
    app.storage.update_content(&id, &content).await?;
    info!(paragraph_id = %id, "paragraph content updated");

    generate(
        app,
        TriggerEvent::ParagraphContentUpdated {
            id,
            new_content: content,
        },
    )
    .await?;
    print_paragraph(app, id).await
}

async fn cmd_regenerate(app: &App, id: ParagraphId) -> Result<()> {
    generate(app, TriggerEvent::RegenerationRequested { id }).await?;
    print_paragraph(app, id).await
}

async fn cmd_set_count(app: &App, id: ParagraphId, count: u8) -> Result<()> {
    app.storage.set_num_questions(&id, count).await?;
    info!(paragraph_id = %id, count, "question count changed");

    generate(app, TriggerEvent::RegenerationRequested { id }).await?;
    print_paragraph(app, id).await
}

async fn cmd_show(app: &App, id: ParagraphId, json: bool) -> Result<()> {
    if !json {
        return print_paragraph(app, id).await;
    }

    let paragraph = require_paragraph(app, id).await?;
    let questions = app.storage.list_questions(&id).await?;
    let value = serde_json::json!({
        "paragraph": paragraph,
        "questions": questions,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn cmd_list(app: &App, status: Option<GenerationStatus>) -> Result<()> {
    let paragraphs = app.storage.list_paragraphs(status).await?;
    if paragraphs.is_empty() {
        println!("No paragraphs.");
        return Ok(());
    }

    for p in &paragraphs {
        println!(
            "{}  {:<9}  {:>2}q  {}",
            p.id,
            p.generation_status,
            p.num_questions,
            preview(&p.content, 60)
        );
    }
    Ok(())
}

async fn cmd_remove(app: &App, id: ParagraphId) -> Result<()> {
    if !app.storage.delete_paragraph(&id).await? {
        return Err(eyre!("paragraph {id} not found"));
    }
    println!("Removed paragraph {id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Hand the event to the orchestrator and wait for the attempt it schedules.
async fn generate(app: &App, event: TriggerEvent) -> Result<()> {
    let generator_config = GeneratorConfig::from_app_config(&app.config)?;
    let budget = attempt_budget(
        generator_config.timeout,
        generator_config.retry.max_attempts,
        generator_config.retry.max_delay,
    );
    let generator = Arc::new(HttpGenerator::new(generator_config)?);
    if !generator.has_credential() {
        warn!(
            env = %app.config.generation.api_key_env,
            "no API key set, generation will fail"
        );
    }

    let progress = Arc::new(CliProgress::new());
    progress.set_message("Scheduling generation");
    let orchestrator = Orchestrator::with_observer(
        Arc::clone(&app.storage),
        generator,
        PromptLimits::from(&app.config),
        progress.clone(),
    );

    let dispatch = orchestrator.handle(event).await;
    let handle = match dispatch {
        Dispatch::Scheduled(handle) => handle,
        Dispatch::Unchanged => {
            progress.finish();
            println!("Content unchanged; questions kept.");
            return Ok(());
        }
        Dispatch::Superseded => {
            progress.finish();
            println!("Content changed again before generation started; nothing to do.");
            return Ok(());
        }
        Dispatch::NotFound => {
            progress.finish();
            return Err(eyre!("paragraph not found"));
        }
        Dispatch::Unavailable(message) => {
            progress.finish();
            return Err(eyre!("storage unavailable: {message}"));
        }
    };

    let outcome = tokio::time::timeout(budget, handle.wait()).await;
    progress.finish();

    match outcome {
        Ok(AttemptOutcome::Succeeded { persisted }) => {
            println!("Generated {persisted} question(s).");
        }
        Ok(AttemptOutcome::Partial {
            persisted,
            requested,
        }) => {
            println!("Generated {persisted} of {requested} question(s).");
        }
        Ok(AttemptOutcome::Failed(reason)) => {
            println!("Generation failed: {reason}. Previous questions were kept.");
        }
        Ok(AttemptOutcome::Skipped) => println!("Nothing to generate; questions cleared."),
        Ok(AttemptOutcome::Discarded) => {
            println!("Content changed during generation; result discarded.")
        }
        Ok(AttemptOutcome::Aborted) => return Err(eyre!("generation attempt aborted")),
        Err(_) => {
            return Err(eyre!(
                "generation did not finish within {}s; paragraph left pending",
                budget.as_secs()
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

async fn require_paragraph(app: &App, id: ParagraphId) -> Result<Paragraph> {
    app.storage
        .get_paragraph(&id)
        .await?
        .ok_or_else(|| eyre!("paragraph {id} not found"))
}

async fn print_paragraph(app: &App, id: ParagraphId) -> Result<()> {
    let paragraph = require_paragraph(app, id).await?;
    let questions = app.storage.list_questions(&id).await?;

    println!();
    println!("  ID:        {}", paragraph.id);
    println!("  Status:    {}", paragraph.generation_status);
    if let Some(reason) = paragraph.failure_reason {
        println!("  Reason:    {reason}");
    }
    println!("  Questions: {}/{}", questions.len(), paragraph.num_questions);
    println!("  Content:   {}", preview(&paragraph.content, 70));
    println!();
    for q in &questions {
        println!("  Q{}: {}", q.ordinal, q.text);
        for a in &q.answers {
            println!("      Answer: {}", a.text);
        }
    }
    if !questions.is_empty() {
        println!();
    }
    Ok(())
}

fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn read_content(source: &ContentSource) -> Result<String> {
    match (&source.content, &source.file) {
        (Some(content), _) => Ok(content.clone()),
        (None, Some(path)) => read_file(path),
        (None, None) => Err(eyre!("either --content or --file is required")),
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("cannot read {}", path.display()))
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");

    let key_state = if api_key(&config).is_some() {
        "set"
    } else {
        "not set"
    };
    println!("# {} is {key_state}", config.generation.api_key_env);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn add_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["studyqa", "add"]).is_err());
        assert!(
            Cli::try_parse_from(["studyqa", "add", "--content", "x", "--file", "y"]).is_err()
        );
        assert!(Cli::try_parse_from(["studyqa", "add", "--content", "Cells divide."]).is_ok());
    }

    #[test]
    fn list_parses_status_filter() {
        let cli = Cli::try_parse_from(["studyqa", "list", "--status", "failed"]).unwrap();
        match cli.command {
            Command::List { status } => assert_eq!(status, Some(GenerationStatus::Failed)),
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("a  b\nc", 10), "a b c");
        assert_eq!(preview("ééééé", 3), "ééé…");
    }
}
