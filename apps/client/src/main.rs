use anyhow::{anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use quiz_core::{choice_set, Grade, MistakeReason, SessionMode};
use quizdeck_client::commands::{self, CommandError};
use quizdeck_client::state::AppState;
use quizdeck_client::sync::SyncError;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "quizdeck", about = "Spaced-repetition quiz practice", version)]
struct Cli {
    /// Progress database
    #[arg(long, global = true, env = "QUIZDECK_DB")]
    db: Option<PathBuf>,

    /// Question bank JSON (`{"questions": [...]}`)
    #[arg(long, global = true, env = "QUIZDECK_BANK")]
    bank: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Practice,
    Unlearned,
    Daily,
    Weak,
    MockReview,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Practice => SessionMode::Practice,
            ModeArg::Unlearned => SessionMode::UnlearnedFirst,
            ModeArg::Daily => SessionMode::DailyReview,
            ModeArg::Weak => SessionMode::WeakReview,
            ModeArg::MockReview => SessionMode::MockReview,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build a practice queue
    Study {
        #[arg(long, value_enum, default_value = "daily")]
        mode: ModeArg,
        /// Restrict to one tag
        #[arg(long)]
        tag: Option<String>,
        /// Comma-separated item ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
        #[arg(long)]
        count: Option<usize>,
    },

    /// Answer an item, e.g. `answer q12 AC`
    Answer { id: String, choices: String },

    /// Grade an item yourself (again, hard, good, easy)
    Grade { id: String, grade: String },

    /// Note why an answer was wrong
    Mistake {
        id: String,
        /// knowledge, misread, careless, confusion or guess
        reason: String,
        #[arg(long)]
        note: Option<String>,
    },

    /// Timed mock exam over the whole bank
    #[command(subcommand)]
    Mock(MockCommand),

    /// Score answers taken elsewhere ("-" reads stdin)
    ImportAnswers {
        text: String,
        #[arg(long)]
        label: Option<String>,
    },

    /// Progress overview
    Stats,

    /// Most missed items
    Worst {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Attempt history, newest first
    History,

    /// Item counts per topic and tag
    Tags,

    /// Print progress as JSON
    Export,

    /// Replace progress from an exported file ("-" reads stdin)
    Import { path: String },

    /// Clear all progress
    Reset,

    /// Revert the last import, mock result, pull or reset
    Undo,

    /// Remote sync
    #[command(subcommand)]
    Cloud(CloudCommand),
}

#[derive(Subcommand)]
enum MockCommand {
    /// Start a mock exam, or resume the ongoing one
    Start,
    Status,
    /// Answer the current question; "-" clears it
    Select { choices: String },
    Next,
    Prev,
    Goto { ordinal: usize },
    Submit,
}

#[derive(Subcommand)]
enum CloudCommand {
    Configure {
        endpoint: String,
        #[arg(long, env = "QUIZDECK_SYNC_TOKEN")]
        token: String,
    },
    Status,
    /// Check that the endpoint answers
    Ping,
    /// Replace local progress with the remote copy
    Pull,
    /// Upload local progress
    Push {
        /// Overwrite the remote copy even if it changed
        #[arg(long)]
        force: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(arg: &str) -> anyhow::Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(arg.to_string())
    }
}

fn run_mock(app: &AppState, command: MockCommand) -> anyhow::Result<()> {
    let now = Utc::now();
    if !matches!(command, MockCommand::Start) {
        match commands::mock::mock_status(app, now) {
            Ok(status) if status.expired && !matches!(command, MockCommand::Submit) => {
                eprintln!("Time is up, submitting the mock exam.");
                return print_json(&commands::mock::submit_mock(app, now)?);
            }
            Err(CommandError::NoOngoingMock) => bail!("no mock exam in progress, run `mock start`"),
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
    }

    let status = match command {
        MockCommand::Start => commands::mock::start_mock(app, now)?,
        MockCommand::Status => commands::mock::mock_status(app, now)?,
        MockCommand::Select { choices } => {
            let choices = if choices.trim() == "-" {
                Default::default()
            } else {
                choice_set([choices])
            };
            commands::mock::mock_select(app, choices, now)?
        }
        MockCommand::Next => commands::mock::mock_navigate(app, 1, now)?,
        MockCommand::Prev => commands::mock::mock_navigate(app, -1, now)?,
        MockCommand::Goto { ordinal } => commands::mock::mock_jump(app, ordinal, now)?,
        MockCommand::Submit => return print_json(&commands::mock::submit_mock(app, now)?),
    };
    print_json(&status)
}

async fn run_cloud(app: &AppState, command: CloudCommand) -> anyhow::Result<()> {
    let now = Utc::now();
    match command {
        CloudCommand::Configure { endpoint, token } => {
            commands::sync::configure_cloud(app, &endpoint, &token, now)?;
            println!("Sync configured for {}", endpoint.trim());
        }
        CloudCommand::Status => print_json(&commands::sync::get_sync_status(app)?)?,
        CloudCommand::Ping => {
            let reachable = app.sync_engine()?.check_connectivity().await?;
            println!("{}", if reachable { "reachable" } else { "unhealthy" });
        }
        CloudCommand::Pull => match commands::sync::pull_remote(app, now).await {
            Ok(version) => println!("Pulled remote version {}", version.unwrap_or_default()),
            Err(CommandError::Sync(SyncError::Empty)) => println!("Nothing saved remotely yet"),
            Err(e) => return Err(e.into()),
        },
        CloudCommand::Push { force } => match commands::sync::push_local(app, force, now).await {
            Ok(response) => println!("Pushed version {}", response.version),
            Err(CommandError::Sync(SyncError::Conflict(remote))) => {
                bail!(
                    "remote progress changed (version {}, updated {}); run `cloud pull` to take it or `cloud push --force` to overwrite it",
                    remote.version.unwrap_or_default(),
                    remote
                        .updated_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string()),
                )
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(quizdeck_client::default_db_path);
    let app = quizdeck_client::open_app(&db_path, cli.bank.as_deref())?;

    let now = Utc::now();
    if let Some(corrupt) = app.check_progress(now)? {
        eprintln!(
            "Warning: saved progress could not be read ({}); it was backed up and progress starts fresh.",
            corrupt.reason
        );
    }

    match cli.command {
        Command::Study { mode, tag, ids, count } => {
            let request = commands::study::SessionRequest {
                mode: Some(mode.into()),
                tag,
                ids,
                count,
            };
            let session =
                commands::study::start_session(&app, &request, now, &mut rand::thread_rng())?;
            print_json(&session)?;
        }
        Command::Answer { id, choices } => {
            print_json(&commands::study::answer_item(&app, &id, &choice_set([choices]), now)?)?;
        }
        Command::Grade { id, grade } => {
            let grade = Grade::parse(&grade).ok_or_else(|| anyhow!("unknown grade '{grade}'"))?;
            print_json(&commands::study::grade_item(&app, &id, grade, now)?)?;
        }
        Command::Mistake { id, reason, note } => {
            let reason = MistakeReason::parse(&reason)
                .ok_or_else(|| anyhow!("unknown mistake reason '{reason}'"))?;
            print_json(&commands::study::record_mistake(&app, &id, reason, note, now)?)?;
        }
        Command::Mock(command) => run_mock(&app, command)?,
        Command::ImportAnswers { text, label } => {
            let text = read_input(&text)?;
            match commands::mock::import_mock_answers(&app, &text, label.as_deref(), now) {
                Ok(record) => print_json(&record)?,
                Err(CommandError::Import(errors)) => {
                    for error in &errors {
                        eprintln!("  {error}");
                    }
                    bail!("{} problem(s) in the answer text, nothing was imported", errors.len());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Stats => print_json(&commands::stats::get_overview(&app, now)?)?,
        Command::Worst { limit } => print_json(&commands::stats::get_worst_items(&app, limit, now)?)?,
        Command::History => print_json(&commands::stats::get_history(&app, now)?)?,
        Command::Tags => print_json(&commands::stats::get_tags(&app))?,
        Command::Export => println!("{}", commands::data::export_progress(&app, now)?),
        Command::Import { path } => {
            let raw = if path == "-" {
                read_input(&path)?
            } else {
                std::fs::read_to_string(&path)?
            };
            commands::data::import_progress(&app, &raw, now)?;
            println!("Progress imported");
        }
        Command::Reset => {
            commands::data::reset_progress(&app, now)?;
            println!("Progress cleared; `undo` restores it");
        }
        Command::Undo => {
            if commands::data::undo_last(&app, now)? {
                println!("Reverted");
            } else {
                println!("Nothing to undo");
            }
        }
        Command::Cloud(command) => run_cloud(&app, command).await?,
    }

    Ok(())
}
