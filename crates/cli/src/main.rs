//! freshwatch command-line entry point.
//!
//! Watches a site's version metadata, offers a refresh when it changes, and
//! inspects the bounded audit log of updates and errors.
//! Logging goes to stderr so command output on stdout stays clean.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use freshwatch_core::detector::{Confirmation, RefreshChoice};
use freshwatch_core::viewer::{ClearOutcome, ClearPrompt, LogFilter};
use freshwatch_core::{AppConfig, CheckOutcome};

mod app;
mod reload;
mod terminal;

use app::App;
use terminal::{AssumeYes, TerminalSurface};

#[derive(Parser)]
#[command(name = "freshwatch")]
#[command(about = "Detect new site content, refresh on demand, and audit what happened", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll for new content until interrupted
    Watch {
        /// Refresh without asking whenever new content appears
        #[arg(long)]
        auto_refresh: bool,
    },

    /// Run a single check now
    Check {
        /// Refresh without asking if new content is found
        #[arg(long, short)]
        yes: bool,
    },

    /// Clear caches and reload for a version, e.g. after a failed refresh
    Refresh {
        version: String,
    },

    /// Show the stored version, preference and last check time
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Show update and error logs, newest first
    Logs {
        /// Hide update entries
        #[arg(long)]
        no_updates: bool,

        /// Hide error entries
        #[arg(long)]
        no_errors: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show log statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Write both logs to update-logs-<millis>.json
    Export {
        /// Target directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Delete all log entries
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Forget the stored version and preference, clear caches and logs
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = AppConfig::load().context("failed to load configuration")?;
    let app = App::open(config).await.context("failed to open store")?;

    match cli.command {
        Commands::Watch { auto_refresh } => watch(&app, auto_refresh).await,
        Commands::Check { yes } => check(&app, yes).await,
        Commands::Refresh { version } => refresh(&app, &version).await,
        Commands::Status { json } => status(&app, json).await,
        Commands::Logs { no_updates, no_errors, json } => {
            logs(&app, LogFilter { show_updates: !no_updates, show_errors: !no_errors }, json).await
        }
        Commands::Stats { json } => stats(&app, json).await,
        Commands::Export { dir } => export(&app, &dir).await,
        Commands::Clear { yes } => clear(&app, yes).await,
        Commands::Reset => reset(&app).await,
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn surface(preset: Option<RefreshChoice>) -> Arc<TerminalSurface> {
    let surface = TerminalSurface::stdin();
    Arc::new(match preset {
        Some(choice) => surface.with_preset(Confirmation::new(choice, false)),
        None => surface,
    })
}

async fn watch(app: &App, auto_refresh: bool) -> Result<()> {
    let preset = auto_refresh.then_some(RefreshChoice::AlwaysAutoRefresh);
    let detector = app.detector(surface(preset))?;

    let mut states = detector.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::debug!(?state, "detector state");
        }
    });

    let handle = detector.start();
    tracing::info!(
        url = %app.config().version_url,
        interval_secs = app.config().check_interval_secs,
        "watching for new content, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    handle.stop();
    Ok(())
}

async fn check(app: &App, yes: bool) -> Result<()> {
    let detector = app.detector(surface(yes.then_some(RefreshChoice::RefreshNow)))?;
    report(detector.force_check().await)
}

async fn refresh(app: &App, version: &str) -> Result<()> {
    let detector = app.detector(surface(None))?;
    report(detector.retry_refresh(version).await)
}

fn report(outcome: CheckOutcome) -> Result<()> {
    match outcome {
        CheckOutcome::Skipped => println!("A check is already in progress"),
        CheckOutcome::UpToDate => println!("Content is up to date"),
        CheckOutcome::Declined { version } => println!("Version {version} noted, not refreshed"),
        CheckOutcome::Refreshed { version } => println!("Refreshed to version {version}"),
        CheckOutcome::Failed { phase, category } => bail!("{phase} failed ({category}): {}", category.user_message()),
    }
    Ok(())
}

async fn status(app: &App, json: bool) -> Result<()> {
    let versions = app.versions();
    let stored = versions.stored_version().await?;
    let preference = versions.preference().await?;
    let last_checked = versions.last_check().await?;

    if json {
        let value = serde_json::json!({
            "versionUrl": app.config().version_url,
            "storedVersion": stored,
            "preference": preference,
            "lastChecked": last_checked,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("endpoint:       {}", app.config().version_url);
    println!("stored version: {}", stored.as_deref().unwrap_or("none"));
    println!("preference:     {preference}");
    match last_checked {
        Some(at) => println!("last checked:   {}", at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")),
        None => println!("last checked:   never"),
    }
    Ok(())
}

async fn logs(app: &App, filter: LogFilter, json: bool) -> Result<()> {
    let view = app.viewer(filter).render().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{view}");
    }
    Ok(())
}

async fn stats(app: &App, json: bool) -> Result<()> {
    let stats = app.viewer(LogFilter::default()).stats().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let local = |at: Option<chrono::DateTime<chrono::Utc>>| {
        at.map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    };
    println!("total updates:    {}", stats.total_updates);
    println!("total errors:     {}", stats.total_errors);
    println!("last update:      {}", local(stats.last_update));
    println!("last error:       {}", local(stats.last_error));
    println!("update frequency: {}", stats.update_frequency);
    println!("error rate:       {}", stats.error_rate);
    Ok(())
}

async fn export(app: &App, dir: &Path) -> Result<()> {
    let export = app.viewer(LogFilter::default()).export().await;
    let path = dir.join(export.file_name());
    tokio::fs::write(&path, export.to_json_pretty()?)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

async fn clear(app: &App, yes: bool) -> Result<()> {
    let prompt: Box<dyn ClearPrompt> = if yes { Box::new(AssumeYes) } else { Box::new(TerminalSurface::stdin()) };
    match app.viewer(LogFilter::default()).clear(prompt.as_ref()).await? {
        ClearOutcome::Cancelled => println!("Cancelled"),
        ClearOutcome::Cleared(view) => print!("{view}"),
    }
    Ok(())
}

async fn reset(app: &App) -> Result<()> {
    let detector = app.detector(surface(None))?;
    detector.reset().await?;
    println!("Stored version, preference, caches and logs cleared");
    Ok(())
}
