mod ai;
mod config;
mod constants;
mod credentials;
mod error;
mod mail;
mod notification;
mod pipeline;
mod scheduler;
mod store;
mod todo;

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::ai::{AiClient, GenerationConfig, JitterBand, OpenRouterTransport, RateLimiter};
use crate::config::{Config, RateWindow};
use crate::credentials::{CredentialStore, Secret};
use crate::mail::{ImapGateway, MessageFilter};
use crate::notification::DesktopNotifier;
use crate::pipeline::{
    AnalysisOrchestrator, SyncOrchestrator, SyncTarget, TodoSyncOrchestrator,
};
use crate::scheduler::{JobScheduler, SchedulerSettings};
use crate::store::SqliteStore;
use crate::todo::HttpTodoGateway;

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailflow=debug"));

    // Try to create a log file in the config directory
    let log_file = Config::config_dir()
        .ok()
        .and_then(|dir| std::fs::create_dir_all(&dir).ok().map(|_| dir))
        .map(|dir| dir.join("mailflow.log"))
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });

    if let Some(file) = log_file {
        // Log to file
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        // Fallback to stderr if file logging fails
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"mailflow - Turn new mail into to-dos

Usage: mailflow [command]

Commands:
    run                 Sync, analyze and push to-dos periodically (default)
    once                Run a single cycle and exit
    status              Show stored message counts and recent job runs
    set-secret <name>   Store a secret in the OS keyring (imap, ai, todo)
    help                Show this help message

Secrets can also come from MAILFLOW_IMAP_PASSWORD, MAILFLOW_AI_API_KEY
and MAILFLOW_TODO_TOKEN.

Configuration file: ~/.config/mailflow/config.toml
"#
    );
}

fn build_scheduler(config: &Config, store: Arc<SqliteStore>) -> Result<JobScheduler> {
    let creds = CredentialStore::new(&config.mail.username);

    let mail = ImapGateway::new(config.mail.clone(), creds.get(Secret::ImapPassword))?;
    let targets = config
        .targets
        .iter()
        .map(|target| {
            let filter = MessageFilter::new(
                &target.senders,
                &target.subjects,
                &target.keywords,
                target.has_attachments,
            )
            .with_context(|| format!("Invalid filter in target '{}'", target.name))?;
            Ok(SyncTarget::new(target.name.clone(), filter))
        })
        .collect::<Result<Vec<_>>>()?;

    let limiter = match config.ai.rate_window {
        RateWindow::Minute => RateLimiter::per_minute(config.ai.requests_per_minute),
        RateWindow::Hour => RateLimiter::per_hour(config.ai.requests_per_minute),
    };
    tracing::debug!(
        "AI rate limit: {} requests per {:?}",
        limiter.max_requests(),
        limiter.window()
    );
    let transport = OpenRouterTransport::new(
        config.ai.api_url.clone(),
        creds.get(Secret::AiApiKey).unwrap_or_default(),
        config.ai.model.clone(),
    )?;
    let ai = AiClient::new(
        Arc::new(transport),
        Arc::new(limiter),
        GenerationConfig::from(&config.ai),
        JitterBand::from_millis(config.ai.jitter_min_ms, config.ai.jitter_max_ms),
    );

    let todos = HttpTodoGateway::new(&config.todo, creds.get(Secret::TodoToken), store.clone())?;

    Ok(JobScheduler::new(
        SyncOrchestrator::new(Arc::new(mail), store.clone(), targets),
        AnalysisOrchestrator::new(ai, store.clone()),
        TodoSyncOrchestrator::new(Arc::new(todos), store.clone()),
        store,
        Arc::new(DesktopNotifier::new(&config.notifications)),
        SchedulerSettings::from_config(config),
    ))
}

async fn open_pipeline() -> Result<(Config, JobScheduler)> {
    let config = Config::load()?;
    config.ensure_dirs()?;

    let store = Arc::new(SqliteStore::open(&Config::database_path()?).await?);
    let scheduler = build_scheduler(&config, store)?;
    Ok((config, scheduler))
}

async fn run_periodic() -> Result<()> {
    let (config, scheduler) = open_pipeline().await?;

    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            on_interrupt.cancel();
        }
    });

    eprintln!(
        "mailflow running every {}s for {}. Press Ctrl-C to stop.",
        config.sync.interval_secs, config.mail.username
    );
    scheduler.run_periodic(shutdown).await;
    Ok(())
}

async fn run_once() -> Result<()> {
    let (_config, scheduler) = open_pipeline().await?;
    let report = scheduler.run_cycle().await;

    for job in &report.jobs {
        println!("{:<10} {:<10} {}", job.job, job.status.as_str(), job.status.detail());
    }
    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

async fn show_status() -> Result<()> {
    let config = Config::load()?;
    let store = SqliteStore::open(&Config::database_path()?).await?;
    let stats = store.stats().await?;

    println!("Account:        {}", config.mail.username);
    println!("Messages:       {}", stats.total);
    println!("Unprocessed:    {}", stats.unprocessed);
    println!("To-dos pending: {}", stats.todos_pending);
    println!("To-dos synced:  {}", stats.todos_synced);

    let creds = CredentialStore::new(&config.mail.username);
    println!("\nSecrets:");
    for secret in Secret::ALL {
        println!("  {:<5} {}", secret.to_string(), creds.source(secret));
    }

    let runs = store.recent_job_runs(10).await?;
    if !runs.is_empty() {
        println!("\nRecent jobs:");
        for run in runs {
            let when = chrono::DateTime::from_timestamp(run.finished_at, 0)
                .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "  {} {:<10} {:<10} x{} {}",
                when, run.job, run.status, run.attempts, run.message
            );
        }
    }
    Ok(())
}

fn set_secret(name: Option<&str>) -> Result<()> {
    use std::io::{self, Write};

    let secret: Secret = name
        .context("Missing secret name. Usage: mailflow set-secret <imap|ai|todo>")?
        .parse()?;
    let config = Config::load()?;

    print!("{} secret for {}: ", secret, config.mail.username);
    io::stdout().flush()?;
    let value = rpassword_read()?;
    println!();

    CredentialStore::new(&config.mail.username).set(secret, &value)?;
    println!("Stored {} secret in the OS keyring.", secret);
    Ok(())
}

fn rpassword_read() -> Result<String> {
    use std::io;

    // Disable echo
    let _guard = DisableEcho::new()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    Ok(password.trim().to_string())
}

struct DisableEcho {
    #[cfg(unix)]
    original: libc::termios,
}

impl DisableEcho {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use std::mem::MaybeUninit;
        use std::os::unix::io::AsRawFd;

        let fd = std::io::stdin().as_raw_fd();
        let mut termios = MaybeUninit::<libc::termios>::uninit();

        unsafe {
            if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
                anyhow::bail!("Failed to get terminal attributes");
            }
            let original = termios.assume_init();
            let mut new = original;
            new.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(fd, libc::TCSANOW, &new) != 0 {
                anyhow::bail!("Failed to set terminal attributes");
            }
            Ok(Self { original })
        }
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }
}

#[cfg(unix)]
impl Drop for DisableEcho {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        let fd = std::io::stdin().as_raw_fd();
        unsafe {
            libc::tcsetattr(fd, libc::TCSANOW, &self.original);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("set-secret") => set_secret(args.get(2).map(|s| s.as_str())),
        Some("status") => show_status().await,
        Some("once") => {
            setup_logging();
            run_once().await
        }
        Some("run") | None => {
            setup_logging();
            run_periodic().await
        }
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
    }
}
