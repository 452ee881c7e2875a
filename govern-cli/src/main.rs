#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools
)]

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use govern_common::logging::init_logging;
use govern_common::{Config, OperationMode, Validate};
use govern_core::{GovernanceManager, ListFilter, NewRequest, RiskLevel, Scope};

mod report;

/// `govern` - dual-authority governance requests for agent operations.
#[derive(Parser, Debug)]
#[command(name = "govern")]
#[command(version = "0.1.0")]
#[command(about = "Create, inspect, decide, and sync governance requests.", long_about = None)]
struct Cli {
    /// Use the remote service only, never the local mirror
    #[arg(long, global = true, conflicts_with = "offline")]
    api_only: bool,

    /// Use the local mirror only, never call the remote service
    #[arg(long, global = true)]
    offline: bool,

    /// Base URL of the governance service
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a new governance request
    Create {
        /// Operation type (spawn, deploy, terminate, ...)
        #[arg(long = "type")]
        operation_type: String,

        /// Agent or resource name
        #[arg(long)]
        agent: String,

        /// Justification for the request
        #[arg(long)]
        reason: String,

        /// Requesting agent
        #[arg(long, default_value = "amcos-chief-of-staff")]
        requester: String,

        /// Operation scope (local, cross-team)
        #[arg(long, default_value = "local")]
        scope: Scope,

        /// Risk level (low, medium, high, critical)
        #[arg(long, default_value = "low")]
        risk: RiskLevel,

        /// Source chief-of-staff session name
        #[arg(long)]
        source_cos: Option<String>,

        /// Source manager session name
        #[arg(long)]
        source_manager: Option<String>,

        /// Target chief-of-staff (cross-team)
        #[arg(long)]
        target_cos: Option<String>,

        /// Target manager (cross-team)
        #[arg(long)]
        target_manager: Option<String>,
    },

    /// Show the reconciled state of a request
    Status {
        /// Request ID
        #[arg(long)]
        id: String,
    },

    /// List requests
    List {
        /// Filter: pending, all, or an explicit status
        #[arg(long, default_value = "pending")]
        status: String,
    },

    /// Approve or reject a request
    Respond {
        /// Request ID
        #[arg(long)]
        id: String,

        /// approved, rejected, or a later status
        #[arg(long)]
        decision: String,

        /// Decision comment
        #[arg(long)]
        comment: String,

        /// Who decided
        #[arg(long, default_value = "user")]
        decided_by: String,
    },

    /// Wait for a decision on a request
    Wait {
        /// Request ID
        #[arg(long)]
        id: String,

        /// Timeout in seconds (defaults to the configured wait timeout)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Push local-only requests to the remote service
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let doc = match load_config(&cli) {
        Ok(config) => {
            init_logging(&config.logging.level, &config.logging.format);
            run(cli.command, &config).await
        }
        Err(e) => report::config_failure(&format!("{e:#}")),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&doc).context("Failed to encode result document")?
    );

    std::process::exit(report::exit_code(&doc));
}

/// File and environment configuration with the global flags applied on top.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_with_env()?;

    if let Some(url) = &cli.api_url {
        config.api.base_url.clone_from(url);
    }
    if cli.api_only {
        config.api.mode = OperationMode::ApiOnly;
    } else if cli.offline {
        config.api.mode = OperationMode::Offline;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(command: Commands, config: &Config) -> Value {
    let manager = match GovernanceManager::from_config(config) {
        Ok(manager) => manager,
        Err(e) => return report::failure(&e),
    };

    match command {
        Commands::Create {
            operation_type,
            agent,
            reason,
            requester,
            scope,
            risk,
            source_cos,
            source_manager,
            target_cos,
            target_manager,
        } => {
            let request = NewRequest {
                operation_type,
                agent,
                reason,
                requester,
                scope,
                risk,
                source_cos,
                source_manager,
                target_cos,
                target_manager,
            };
            match manager.create(request).await {
                Ok(outcome) => report::created(&outcome),
                Err(e) => report::failure(&e),
            }
        }
        Commands::Status { id } => match manager.fetch(&id).await {
            Ok(view) => report::status(&view),
            Err(e) => report::failure(&e),
        },
        Commands::List { status } => {
            let filter = match status.parse::<ListFilter>() {
                Ok(filter) => filter,
                Err(e) => return report::failure(&e),
            };
            match manager.list(filter).await {
                Ok(outcome) => report::listed(&outcome),
                Err(e) => report::failure(&e),
            }
        }
        Commands::Respond {
            id,
            decision,
            comment,
            decided_by,
        } => match manager.decide(&id, &decision, &comment, &decided_by).await {
            Ok(outcome) => report::decided(&outcome),
            Err(e) => report::failure(&e),
        },
        Commands::Wait { id, timeout } => {
            let timeout = Duration::from_secs(timeout.unwrap_or(config.wait.default_timeout_secs));
            let cancel = CancellationToken::new();
            spawn_interrupt_handler(cancel.clone());
            match manager.wait(&id, timeout, cancel).await {
                Ok(outcome) => report::waited(&outcome),
                Err(e) => report::failure(&e),
            }
        }
        Commands::Sync => match manager.sync().await {
            Ok(outcome) => report::synced(&outcome),
            Err(e) => report::failure(&e),
        },
    }
}

/// Cancel `token` on Ctrl-C so a wait ends with a result document.
fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling wait");
            token.cancel();
        }
    });
}
