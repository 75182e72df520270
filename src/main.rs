use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scribe::banner::{BannerInfo, print_banner, print_session_summary};
use scribe::commands::{CommandRegistry, CommandResult, SessionInfo};
use scribe::config::{self, Settings};
use scribe::consts::{
    CREDENTIAL_ENV, CREDENTIALS_ENV, DEFAULT_TOOL, MODEL_ENV, default_db_path, default_projects_dir,
    estimate_label,
};
use scribe::executor::TaskExecutor;
use scribe::executor::process::{ProcessConfig, ProcessInvoker};
use scribe::notify::webhook::WebhookNotifier;
use scribe::projects::ProjectDirectory;
use scribe::queue::submission::Submission;
use scribe::queue::{QueueConfig, QueueManager, QueueParts};
use scribe::review::ReviewRecorder;
use scribe::store::sqlite::SqliteJobStore;

#[derive(Parser)]
#[command(
    name = "scribe",
    version,
    about = "Runs batches of prompts through an AI CLI and reports back by webhook."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// SQLite database for jobs and review records (use :memory: for ephemeral)
    #[arg(short, long, global = true)]
    db: Option<String>,

    /// Per-task deadline in seconds
    #[arg(short, long, global = true, default_value_t = 600)]
    timeout: u64,

    /// Seconds between SIGTERM and SIGKILL when a task overruns
    #[arg(long, global = true, default_value_t = 5)]
    grace: u64,

    /// Seconds between periodic state flushes
    #[arg(long, global = true, default_value_t = 30)]
    flush_interval: u64,

    /// Hours a finished job is kept before it is dropped
    #[arg(long, global = true, default_value_t = 24)]
    retention_hours: u64,

    /// AI CLI to invoke for each prompt
    #[arg(long, global = true, default_value = DEFAULT_TOOL)]
    tool: PathBuf,

    /// Model passed to the tool as --model
    #[arg(long, global = true, env = MODEL_ENV)]
    model: Option<String>,

    /// Comma-separated API keys, rotated on quota errors
    #[arg(long, global = true, env = CREDENTIALS_ENV, hide_env_values = true)]
    api_keys: Option<String>,

    /// Single API key, used when no list is given
    #[arg(long, global = true, env = CREDENTIAL_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Directory holding one subdirectory per project id
    #[arg(long, global = true)]
    projects_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single batch, wait for it, print the results and exit
    Run {
        /// Prompt to run (repeat for a batch)
        #[arg(short, long = "prompt", required = true)]
        prompts: Vec<String>,

        /// Webhook that receives progress and the final summary
        #[arg(short, long)]
        webhook: String,

        /// Sent as the X-Webhook-Secret header
        #[arg(short, long)]
        secret: Option<String>,

        /// Project id, resolved under --projects-dir
        #[arg(long)]
        project: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scribe=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = settings_from(&cli);
    prepare_db_dir(&settings.db_path)?;

    let (pool, source) =
        config::load_credentials(cli.api_keys.as_deref(), cli.api_key.as_deref());
    if pool.is_empty() {
        warn!("no API credentials configured; every task will fail until one is set");
    }
    let pool = Arc::new(pool);

    let invoker = ProcessInvoker::new(settings.process.clone());
    let tool_available = invoker.is_available().await;
    if !tool_available {
        warn!(tool = %settings.process.program.display(), "tool not found on PATH");
    }

    let parts = QueueParts {
        executor: TaskExecutor::new(Arc::new(invoker), pool),
        store: Arc::new(SqliteJobStore::open(&settings.db_path)?),
        reviews: Arc::new(ReviewRecorder::open(&settings.db_path)?),
        notifier: Arc::new(WebhookNotifier::new()?),
        projects: Arc::new(ProjectDirectory::new(&settings.projects_dir)),
    };
    let queue = QueueManager::new(parts, settings.queue.clone());

    let resumed = match queue.restore().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "could not load saved jobs, starting empty");
            0
        }
    };

    // One-shot mode
    if let Some(Command::Run {
        prompts,
        webhook,
        secret,
        project,
    }) = cli.command
    {
        queue.start().await;
        return run_once(&queue, prompts, webhook, secret, project).await;
    }

    let tool_label = settings.process.program.display().to_string();
    print_banner(&BannerInfo {
        tool: &tool_label,
        tool_available,
        keys: queue.executor().pool().size(),
        key_source: source.label(),
        deadline: settings.queue.task_deadline,
        db: &settings.db_path,
        resumed,
    });

    queue.start().await;
    let maintenance = queue.spawn_maintenance();

    let session = SessionInfo {
        queue: &queue,
        db_path: &settings.db_path,
        tool: &tool_label,
        tool_available,
    };
    console(&queue, &session).await?;

    maintenance.abort();
    if let Err(e) = queue.flush().await {
        warn!(error = %e, "final flush failed");
    }
    print_session_summary(&queue.list_jobs().await);
    Ok(())
}

fn settings_from(cli: &Cli) -> Settings {
    let process = ProcessConfig {
        program: cli.tool.clone(),
        kill_grace: Duration::from_secs(cli.grace),
        ..ProcessConfig::default()
    }
    .with_model(cli.model.as_deref());

    Settings {
        db_path: cli
            .db
            .clone()
            .unwrap_or_else(|| default_db_path().display().to_string()),
        projects_dir: cli.projects_dir.clone().unwrap_or_else(default_projects_dir),
        process,
        queue: QueueConfig {
            task_deadline: Duration::from_secs(cli.timeout),
            flush_interval: Duration::from_secs(cli.flush_interval.max(1)),
            retention: config::hours(cli.retention_hours),
        },
    }
}

fn prepare_db_dir(db_path: &str) -> anyhow::Result<()> {
    if db_path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

async fn run_once(
    queue: &QueueManager,
    prompts: Vec<String>,
    webhook: String,
    secret: Option<String>,
    project: Option<String>,
) -> anyhow::Result<()> {
    let submission = Submission {
        prompts,
        webhook_url: webhook,
        webhook_secret: secret,
        project_id: project,
    };
    let job_id = queue.submit(submission).await?;
    info!(%job_id, "waiting for job");

    let result = tokio::select! {
        job = queue.wait_for(job_id) => job,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\ninterrupted; progress is saved and resumes on next start");
            None
        }
    };
    if let Some(job) = result {
        println!("{}", serde_json::to_string_pretty(&job)?);
    }
    queue.flush().await?;
    Ok(())
}

async fn console(queue: &QueueManager, session: &SessionInfo<'_>) -> anyhow::Result<()> {
    let registry = CommandRegistry::new();
    let mut terminate = signal(SignalKind::terminate())?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("\nscribe> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // Ctrl+D (EOF)
                        println!();
                        break;
                    }
                    Err(e) => {
                        eprintln!("input error: {e}");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            _ = terminate.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match registry.dispatch(input, session).await {
            CommandResult::Quit => break,
            CommandResult::Handled => continue,
            CommandResult::NotACommand => {}
        }

        let submitted = match Submission::from_json(input) {
            Ok(submission) => {
                let count = submission.prompts.len();
                queue.submit(submission).await.map(|id| (id, count))
            }
            Err(e) => Err(e),
        };
        match submitted {
            Ok((job_id, count)) => {
                println!("queued {job_id}: {count} prompt(s), {}", estimate_label(count));
            }
            Err(e) => eprintln!("rejected: {e:#}"),
        }
    }
    Ok(())
}
