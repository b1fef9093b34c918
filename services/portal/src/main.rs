//! Kubex portal CLI
//!
//! Drives the portal client core from the command line: watch backend
//! health, sign in and out, and query the authenticated resources.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kubex_portal::health::{HealthMonitor, HealthSummary};
use kubex_portal::session::{Credentials, UsersOutcome};
use kubex_portal::{load_config, ApiHook, Config, PollData, Portal, PortalError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Parser)]
#[command(name = "kubex-portal")]
#[command(about = "Command-line client for the Kubex portal")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch backend health until interrupted
    Status {
        /// Polling interval (overrides config file), e.g. "10s"
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
    },
    /// Sign in and store the session
    SignIn {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Sign out and forget the session
    SignOut,
    /// List users (requires a session)
    Users,
    /// Show provider availability (requires a session)
    Providers,
    /// Show the latest scorecard entries (requires a session)
    Scorecard {
        /// Number of entries (overrides config file)
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show the signed-in user
    Whoami,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, log_level={:?}, command={:?}",
        args.config,
        args.log_level,
        args.command
    );

    let config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if config.storage.session_path.is_none() {
        tracing::debug!("Session storage is in memory; sessions end with this process");
    }

    let portal = Portal::new(config)?;
    tracing::debug!("API base: {:?}", portal.client().config().api_base);

    match args.command {
        Command::Status { interval } => watch_status(&portal, interval).await,
        Command::SignIn { username, password } => {
            let session = portal
                .session()
                .sign_in(&Credentials::new(username, password))
                .await?;
            print_json(&session.user)?;
        }
        Command::SignOut => portal.session().sign_out().await,
        Command::Users => match portal.session().list_users().await? {
            UsersOutcome::Users(users) => print_json(&users)?,
            UsersOutcome::SessionExpired => {
                return Err("Session expired, sign in again".into());
            }
        },
        Command::Providers => print_json(&settled(&portal, &portal.providers()).await?)?,
        Command::Scorecard { limit } => {
            print_json(&settled(&portal, &portal.scorecard(limit)).await?)?
        }
        Command::Whoami => match portal.auth().user() {
            Some(user) => print_json(&user)?,
            None if portal.auth().is_authenticated() => println!("Signed in (no user profile)"),
            None => println!("Not signed in"),
        },
    }

    Ok(())
}

/// Log every new health summary until Ctrl-C
async fn watch_status(portal: &Portal, interval: Option<Duration>) {
    let monitor = match interval {
        Some(interval) => HealthMonitor::new(portal.client().clone(), Some(interval)),
        None => portal.health_monitor(),
    };
    let mut updates = monitor.watch();
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
        tracing::info!("Shutdown signal received");
        cancel_for_signal.cancel();
    });

    let mut last: Option<HealthSummary> = None;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            alive = updates.changed() => {
                if !alive {
                    break;
                }
                if monitor.loading() {
                    continue;
                }
                if let Some(error) = monitor.error() {
                    tracing::warn!("Health check failed: {}", error);
                    continue;
                }
                let summary = monitor.summary();
                if last.as_ref() != Some(&summary) {
                    tracing::info!(
                        "Status {} ({:?}, {} services)",
                        summary.status,
                        summary.source,
                        summary.services.len()
                    );
                    for (name, service) in &summary.services {
                        tracing::info!(
                            "  {}: {}",
                            name,
                            if service.healthy { "healthy" } else { "unhealthy" }
                        );
                    }
                    last = Some(summary);
                }
            }
        }
    }

    monitor.dispose();
}

/// Wait for the hook's first fetch to settle and take its data
async fn settled<T: PollData>(
    portal: &Portal,
    hook: &ApiHook<T>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    if !hook.options().enabled {
        return Err(PortalError::Validation("Not signed in".to_string()).into());
    }
    match portal.session().settle(hook).await {
        Err(error) if error.is_unauthorized() => Err("Session expired, sign in again".into()),
        other => Ok(other?),
    }
}

fn print_json<T: Serialize>(value: &T) -> kubex_portal::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
