//! Command-line front end for the veriprobe verification engine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use veriprobe_core::core::config::load_config;
use veriprobe_core::{ValidationOptions, VerificationEngine};

#[derive(Parser, Debug)]
#[command(name = "veriprobe", version, about = "Email deliverability verification without sending mail")]
struct Cli {
    /// Path to a TOML configuration file (defaults to ./veriprobe.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a single email address.
    Validate {
        email: String,
        /// Skip the SMTP existence probe.
        #[arg(long)]
        no_smtp: bool,
        /// Skip DNS validation (implies no SMTP probe).
        #[arg(long)]
        no_dns: bool,
        /// Skip role-account detection.
        #[arg(long)]
        no_roles: bool,
        /// Overall budget for the network-facing checks, in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Emit the full result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run a health sweep over every configured relay and print the summary.
    Health,
    /// Print rotation statistics: identities, block set, usage counters.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let engine = VerificationEngine::new(config).context("failed to initialize engine")?;

    match cli.command {
        Command::Validate {
            email,
            no_smtp,
            no_dns,
            no_roles,
            timeout_ms,
            json,
        } => {
            let options = ValidationOptions {
                check_smtp: !no_smtp,
                timeout: timeout_ms.map(Duration::from_millis),
                validate_dns: !no_dns,
                detect_roles: !no_roles,
            };
            let result = engine.validate(&email, &options).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{email}: {} (score {}/100)",
                    if result.valid { "valid" } else { "not valid" },
                    result.score
                );
                if let Some(smtp) = &result.details.smtp {
                    let verdict = match smtp.valid {
                        Some(true) => "accepted",
                        Some(false) => "rejected",
                        None => "unknown",
                    };
                    println!("  smtp: {verdict} - {}", smtp.message);
                }
                if let Some(catch_all) = &result.details.catch_all {
                    if catch_all.is_catch_all == Some(true) {
                        println!("  note: {}", catch_all.reason);
                    }
                }
                for suggestion in &result.suggestions {
                    println!("  suggestion: {suggestion}");
                }
            }
        }
        Command::Health => {
            let summary = engine.check_health().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Stats => {
            let stats = engine.relay_stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
