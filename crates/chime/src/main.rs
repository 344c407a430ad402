//! Chime command-line interface.
//!
//! Subcommands:
//! - `daemon`: run the trigger loop and retention purge until Ctrl-C
//! - `fire`: deliver one trigger payload immediately, as an external
//!   scheduler invoking the orchestrator would

mod app;
mod daemon;
mod settings;

use std::io::Read;

use chime_notify::ChannelOutcome;
use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "chime")]
#[command(about = "Appointment reminder scheduling and delivery")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler daemon
    Daemon,

    /// Deliver a fired trigger payload now
    Fire {
        /// Payload JSON, or `-` to read it from stdin
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chime=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon => daemon::run(cli.settings).await,
        Commands::Fire { payload } => fire(&cli.settings, payload).await,
    }
}

async fn fire(settings: &Settings, payload: String) -> Result<()> {
    let payload = if payload == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| miette::miette!("failed to read payload: {}", e))?;
        buf
    } else {
        payload
    };

    let app = App::build(settings)?;
    let report = app
        .service
        .execute(&payload)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    match report.status {
        Some(status) => println!("{}: {}", report.notification_id, status),
        None => println!("{}: skipped (client opted out)", report.notification_id),
    }
    for entry in &report.outcomes {
        match &entry.outcome {
            ChannelOutcome::Sent => println!("  method {}: sent", entry.method),
            ChannelOutcome::Skipped(reason) => {
                println!("  method {}: skipped ({})", entry.method, reason)
            }
            ChannelOutcome::Failed(reason) => {
                println!("  method {}: failed ({})", entry.method, reason)
            }
        }
    }

    Ok(())
}
