//! Command-line interface for kv-loadgen
//!
//! # Usage Examples
//!
//! ```bash
//! # List and inspect the workload profiles
//! kv-loadgen list-profiles
//! kv-loadgen describe-profile transaction_heavy
//!
//! # Check that the server answers
//! kv-loadgen test-connection --host cache.internal --port 6380 --tls
//!
//! # Run until Ctrl-C with 8 clients of 20 threads each
//! kv-loadgen run --clients 8 --threads-per-client 20 --connections-per-client 4
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use kv_loadgen::cli::{ConnectionArgs, RunArgs};
use kv_loadgen::{logging, runner, summary};
use loadgen_profiles::Profile;

#[derive(Parser)]
#[command(name = "kv-loadgen")]
#[command(about = "A load generator for Redis-protocol key-value stores")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test
    Run(RunArgs),

    /// List the available workload profiles
    ListProfiles,

    /// Describe one workload profile
    DescribeProfile {
        /// Profile name
        name: Profile,
    },

    /// Connect to the server, PING it and report
    TestConnection {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Logging level: DEBUG, INFO, WARNING or ERROR
        #[arg(long, default_value = "INFO", env = "LOG_LEVEL")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_load_test(args).await,
        Commands::ListProfiles => {
            println!("Available workload profiles:");
            for profile in Profile::all() {
                let ops = profile
                    .workload()
                    .weighted_operations()
                    .iter()
                    .map(|(op, _)| op.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("  {profile}: {ops}");
                println!("      {}", profile.description());
            }
            Ok(())
        }
        Commands::DescribeProfile { name } => {
            println!("{}", name.details());
            Ok(())
        }
        Commands::TestConnection {
            connection,
            log_level,
        } => {
            logging::init(&log_level, None)?;
            let config = connection.to_config();
            let report = tokio::task::spawn_blocking(move || runner::test_connection(&config))
                .await
                .context("Connection test task failed")??;
            println!("Connected to {}", report.target);
            println!("  Nodes:        {}", report.nodes);
            println!(
                "  Connect time: {:.3}ms",
                report.connect_time.as_secs_f64() * 1000.0
            );
            println!(
                "  PING time:    {:.3}ms",
                report.ping_time.as_secs_f64() * 1000.0
            );
            Ok(())
        }
    }
}

async fn run_load_test(args: RunArgs) -> anyhow::Result<()> {
    let config = args.to_config()?;

    if let Some(path) = &args.save_config {
        config.validate()?;
        config.save(path)?;
        println!("Configuration saved to {}", path.display());
        return Ok(());
    }

    logging::init(&config.output.log_level, config.output.log_file.as_deref())?;
    tracing::info!(
        "Target {} ({} workload)",
        config.connection.describe(),
        config
            .test
            .profile
            .map(|p| p.to_string())
            .unwrap_or_else(|| "custom".to_string())
    );

    let result = runner::run(&config, args.seed).await?;
    summary::emit(&result, config.output.output_file.as_deref())?;
    Ok(())
}
