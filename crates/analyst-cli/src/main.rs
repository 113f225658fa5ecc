//! Analyst CLI: drive a voice analyst session from the terminal.
//!
//! Usage:
//!   analyst upload data/sales.csv [--session <id>]
//!   analyst watch --session <id>
//!   analyst progress --session <id>
//!   analyst report --session <id> --email ana@example.com
//!   analyst config
//!
//! Configuration comes from `config/analyst.toml` (or `ANALYST_CONFIG`) and `ANALYST__*`
//! variables; `--backend` overrides the backend URL.

use analyst_client::{
    Backend, ProgressSession, ReportClient, SessionState, TranscriptSession, TranscriptView,
    UploadClient,
};
use analyst_core::{AnalystConfig, RenderUnit};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "analyst")]
#[command(about = "Voice analyst session client")]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides configuration)
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a CSV dataset and start a session
    Upload {
        file: PathBuf,
        /// Session id (a new one is generated when omitted)
        #[arg(long)]
        session: Option<String>,
    },
    /// Follow the live transcript of a session
    Watch {
        #[arg(long)]
        session: String,
    },
    /// Follow background enrichment progress
    Progress {
        #[arg(long)]
        session: String,
    },
    /// Ask the backend to email the analysis report
    Report {
        #[arg(long)]
        session: String,
        #[arg(long)]
        email: String,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = AnalystConfig::load()?;
    if let Some(url) = cli.backend {
        config.backend_url = url;
    }

    match cli.command {
        Command::Upload { file, session } => {
            let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let receipt = UploadClient::new(Backend::new(config)?)
                .upload_csv(&file, &session_id)
                .await?;
            if let Some(message) = receipt.message {
                info!("{}", message);
            }
            println!("{}", receipt.session_id.unwrap_or(session_id));
        }
        Command::Watch { session } => watch_transcript(config, &session).await?,
        Command::Progress { session } => watch_progress(config, &session).await?,
        Command::Report { session, email } => {
            let ack = ReportClient::new(Backend::new(config)?)
                .request_report(&session, &email)
                .await?;
            println!("{}", ack.message.as_deref().unwrap_or("Report requested"));
            if let Some(url) = ack.report_url {
                println!("{}", url);
            }
        }
        Command::Config => print!("{}", config.to_toml()?),
    }
    Ok(())
}

/// Units not yet printed. While streaming only settled units qualify; the tail is
/// released once the stream is over.
fn fresh_units(view: &TranscriptView, printed: usize, finished: bool) -> &[RenderUnit] {
    let ready = if finished {
        &view.units[..]
    } else {
        view.settled_units()
    };
    ready.get(printed..).unwrap_or_default()
}

async fn watch_transcript(config: AnalystConfig, session_id: &str) -> anyhow::Result<()> {
    let mut session = TranscriptSession::open(config, session_id)?;
    let mut updates = session.subscribe();
    let mut printed = 0;

    loop {
        let snapshot = updates.borrow_and_update().clone();
        let finished = snapshot.state.is_terminal();
        for unit in fresh_units(&snapshot.view, printed, finished) {
            println!("{}\n", unit);
            printed += 1;
        }
        if let SessionState::Failed(reason) = &snapshot.state {
            anyhow::bail!("transcript stream failed: {}", reason);
        }
        if finished {
            break;
        }

        tokio::select! {
            changed = updates.changed() => changed?,
            _ = tokio::signal::ctrl_c() => {
                session.close();
                break;
            }
        }
    }
    Ok(())
}

async fn watch_progress(config: AnalystConfig, session_id: &str) -> anyhow::Result<()> {
    let mut session = ProgressSession::open(config, session_id)?;
    let mut updates = session.subscribe();
    let mut announced_sheet = false;

    loop {
        let snapshot = updates.borrow_and_update().clone();
        let progress = &snapshot.view;
        if progress.is_started() {
            println!(
                "enriched {}/{} ({:.1}%)",
                progress.current,
                progress.total,
                progress.percent()
            );
        }
        if let (false, Some(url)) = (announced_sheet, &progress.sheet_url) {
            println!("sheet: {}", url);
            announced_sheet = true;
        }
        match &snapshot.state {
            SessionState::Failed(reason) => anyhow::bail!("progress stream failed: {}", reason),
            SessionState::Ended => break,
            _ => {}
        }

        tokio::select! {
            changed = updates.changed() => changed?,
            _ = tokio::signal::ctrl_c() => {
                session.close();
                break;
            }
        }
    }
    Ok(())
}
