use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mg_config::{load_layered_yaml, report_unused_keys, LoadedConfig, UnusedKeyPolicy};
use mg_execution::{
    DryRunActionRepository, ExecutionRequest, SecurityActionExecutionEngine,
    SecurityActionExecutionResult,
};
use mg_protection::ResourceProtector;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mg")]
#[command(about = "Power-disconnect guard CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> host -> local...)
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Load and validate a layered config without running anything
    Validate {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Fail on keys outside the sections the guard reads
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Run the configured security actions against the dry-run repository
    /// and print the execution result as JSON.
    Simulate {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Ignore actions.action_delay_secs
        #[arg(long, default_value_t = false)]
        skip_delay: bool,
    },
}

/// stdout payload of `simulate`.
#[derive(Serialize)]
struct SimulationReport {
    config_hash: String,
    result: SecurityActionExecutionResult,
    /// Repository calls in the order they were made.
    calls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { config_paths } => {
            let loaded = load(&config_paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Validate {
            config_paths,
            strict,
        } => {
            let loaded = load(&config_paths)?;
            let policy = if strict {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let report = report_unused_keys(&loaded.config_json, policy)?;
            for leaf in &report.unused_leaf_pointers {
                warn!(leaf = %leaf, "unused config key");
            }

            let validated = loaded
                .guard_config()?
                .validate()
                .context("configuration rejected")?;

            println!("config_ok=true");
            println!("config_hash={}", loaded.config_hash);
            println!("grace_period_secs={}", validated.arming.grace_period.as_secs());
            let actions: Vec<&str> = validated
                .actions
                .ordered_actions()
                .iter()
                .map(|a| a.as_str())
                .collect();
            println!("actions={}", actions.join(","));
            println!("parallel={}", validated.actions.execute_in_parallel);
            println!("protection_enabled={}", validated.protection.enabled);
            println!("auto_arm_enabled={}", validated.auto_arm.is_enabled);
            println!("unused_keys={}", report.unused_leaf_pointers.len());
        }

        Commands::Simulate {
            config_paths,
            skip_delay,
        } => {
            let loaded = load(&config_paths)?;
            let mut validated = loaded
                .guard_config()?
                .validate()
                .context("configuration rejected")?;
            if skip_delay {
                validated.actions.action_delay = Duration::ZERO;
            }

            let repository = Arc::new(DryRunActionRepository::new());
            let protector = Arc::new(ResourceProtector::new(&validated.protection));
            let engine = SecurityActionExecutionEngine::new(repository.clone(), protector);

            info!(actions = validated.actions.enabled_actions.len(), "simulating trigger");
            let result = engine
                .execute_actions(ExecutionRequest::new(validated.actions))
                .await;

            let report = SimulationReport {
                config_hash: loaded.config_hash,
                result,
                calls: repository
                    .calls()
                    .await
                    .into_iter()
                    .map(|(_, call)| call)
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn load(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    load_layered_yaml(&path_refs)
}
