//! Dokku Backup/Restore Tool
//!
//! Backs up and restores Dokku apps (VHOST, ENV, persistent storage) and
//! postgres/mongo databases over SSH into a local backup tree.

// dokkubackup/src/main.rs
mod backup;
mod batch;
mod config;
mod errors;
mod inventory;
mod remote;
mod restore;
mod utils;

use anyhow::{Context, Result};
use batch::{Action, Outcome};
use config::AppConfig;
use remote::ssh::SshExecutor;
use std::env;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    match run_app().await {
        Ok(()) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            if matches!(errors::classify(&e), Some(errors::AppError::Usage(_))) {
                eprintln!("{}", batch::USAGE);
            }
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_app() -> Result<()> {
    // a .env next to the working directory may point DOKKU_BACKUP_CONFIG elsewhere
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let action = Action::parse(&args)?;
    if action == Action::Help {
        println!("{}", batch::USAGE);
        return Ok(());
    }

    let config_path = AppConfig::default_path()?;
    let app_config = AppConfig::load(&config_path).with_context(|| {
        format!("Failed to load application configuration from {}", config_path.display())
    })?;
    if let Some(server) = action.server() {
        // unknown servers are fatal before any transport is set up
        app_config.resolve(server)?;
    }

    let outcome = if action.is_remote() {
        let executor = SshExecutor::new()?;
        batch::dispatch(&action, &app_config, &executor).await?
    } else {
        batch::run_local(&action, &app_config)?
    };

    match outcome {
        Outcome::Batch { verb, report } => {
            report.log_summary(verb);
            report.into_result()?;
        }
        Outcome::Output(text) => print!("{}", text),
        Outcome::Done(message) => tracing::info!("✓ {}", message),
    }
    Ok(())
}
