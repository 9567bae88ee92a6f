//! Corpus-Harvest main entry point
//!
//! This is the command-line interface for the Corpus-Harvest crawler.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corpus_harvest::config::{load_config_with_hash, Config};
use corpus_harvest::crawler::{resume_job, run_job};
use corpus_harvest::output::{export_corpus, load_report, print_report};
use corpus_harvest::profile::SiteProfile;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Corpus-Harvest: a polite focused crawler for article corpora
///
/// Corpus-Harvest crawls configured sources while respecting robots.txt and
/// per-domain politeness, stores each article once, and checkpoints every
/// job so it can be resumed after an interruption.
#[derive(Parser, Debug)]
#[command(name = "corpus-harvest")]
#[command(version)]
#[command(about = "A polite focused crawler for article corpora", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, default_value = "harvest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start (or continue) the job for a named profile
    Start {
        /// Source id of the profile
        profile: String,

        /// Ignore an existing checkpoint
        #[arg(long)]
        fresh: bool,
    },

    /// Resume a job from its checkpoint directory
    Resume {
        /// Job directory holding checkpoint.json
        job_dir: PathBuf,
    },

    /// Show counters for a job
    Report {
        /// Job directory holding checkpoint.json
        job_dir: PathBuf,
    },

    /// Export stored articles as NDJSON
    Export {
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// Only export this source
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Validate the configuration and every profile
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    match cli.command {
        Command::Start { profile, fresh } => {
            run_job(&config, &profile, &config_hash, fresh)
                .await
                .with_context(|| format!("job '{}' failed", profile))?;
        }
        Command::Resume { job_dir } => {
            resume_job(&config, &job_dir, &config_hash)
                .await
                .with_context(|| format!("cannot resume {}", job_dir.display()))?;
        }
        Command::Report { job_dir } => {
            let report = load_report(&config, &job_dir)
                .with_context(|| format!("cannot report on {}", job_dir.display()))?;
            print_report(&report);
        }
        Command::Export { output, source } => {
            let written = export_corpus(&config, source.as_deref(), &output)
                .with_context(|| format!("export to {} failed", output.display()))?;
            println!("Exported {} articles to {}", written, output.display());
        }
        Command::Check => handle_check(&config)?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG`, when set, replaces the verbosity flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            // Only show errors
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("corpus_harvest=info,warn"),
                1 => EnvFilter::new("corpus_harvest=debug,info"),
                2 => EnvFilter::new("corpus_harvest=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles `check`: compiles every profile and prints what would be crawled
fn handle_check(config: &Config) -> Result<()> {
    println!("=== Corpus-Harvest Configuration ===\n");

    println!("Crawler:");
    println!(
        "  Max concurrent fetches: {}",
        config.crawler.max_concurrent_fetches
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout);
    println!(
        "  Retries: {} (backoff {}ms)",
        config.crawler.max_retries, config.crawler.retry_backoff
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("Database: {}", config.output.database_path);

    println!("\nProfiles ({}):", config.profiles.len());
    for profile in &config.profiles {
        SiteProfile::from_config(profile)
            .with_context(|| format!("profile '{}' is invalid", profile.source_id))?;
        println!(
            "  - {} ({} seeds, depth {}, budget {}, robots {:?}) -> {}",
            profile.source_id,
            profile.seeds.len(),
            profile.depth_limit,
            profile.item_budget,
            profile.robots_policy,
            config.job_dir(profile).display()
        );
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}
