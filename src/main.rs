//! prospector CLI - bulk email discovery and validation for contact CSVs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prospector::checkpoint::CheckpointManager;
use prospector::finder::{EmailVerifier, LocalFinder};
use prospector::models::ContactRecord;
use prospector::{Config, EnrichPipeline};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "prospector")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Bulk email discovery and validation for contact CSVs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enrichment job over the configured input CSV
    Run {
        /// Input location (overrides config): gs://bucket/object or path
        #[arg(short, long)]
        input: Option<String>,

        /// Output location (overrides config): gs://bucket/object or path
        #[arg(short, long)]
        output: Option<String>,

        /// Checkpoint directory for resumable runs
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Look up one contact with the local finder
    Find {
        /// Contact first name
        #[arg(long)]
        first_name: String,

        /// Contact last name
        #[arg(long)]
        last_name: Option<String>,

        /// Company website
        #[arg(long)]
        website: String,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# prospector configuration file

[finder]
# Backend: "remote" posts rows to the finder service, "local" runs the
# pattern search in-process
mode = "remote"
url = "https://us-central1-mailtester-validator.cloudfunctions.net/find_email"
timeout_secs = 60
max_retries = 3
# Pause after each finder request, per worker
request_delay_secs = 0.5

[verifier]
# Used by local mode (key can also come from MAILTESTER_API_KEY env var)
base_url = "https://happy.mailtester.ninja/ninja"
# api_key = "sub_..."
timeout_secs = 10
attempt_delay_secs = 0.9

[storage]
# Bare object names resolve against this bucket; full gs:// URLs and local
# paths work everywhere
bucket = "mailtester-email-bulk"
input = "input.csv"
output = "output.csv"

[workers]
size = 5

[output]
# checkpoint_dir = "checkpoints/"
"#;
    println!("{example}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            config.validate().context("Configuration is not usable")?;

            info!("Configuration is valid");
            info!("  Finder mode: {:?}", config.finder.mode);
            info!("  Workers: {}", config.workers.size);
            info!(
                "  Input: {} (bucket: {})",
                config.storage.input,
                config.storage.bucket.as_deref().unwrap_or("none")
            );
            info!("  Output: {}", config.storage.output);
            return Ok(());
        }

        Commands::Find {
            first_name,
            last_name,
            website,
        } => {
            let config = if cli.config.exists() {
                Config::from_file(&cli.config)
                    .with_context(|| format!("Failed to load config from {:?}", cli.config))?
            } else {
                Config::default()
            };

            let api_key = config
                .resolve_verifier_key()
                .context("Failed to resolve verifier API key")?;
            let verifier = EmailVerifier::new(&config.verifier, api_key)?;
            let finder = LocalFinder::new(verifier, config.verifier.attempt_delay_secs);

            let contact = ContactRecord {
                first_name,
                last_name: last_name.unwrap_or_default(),
                company_website: website,
            };

            if !contact.has_required_fields() {
                anyhow::bail!("first name and website are required");
            }

            let report = finder.find(&contact.trimmed()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Run {
            input,
            output,
            checkpoint,
        } => {
            let mut config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            // CLI overrides
            if let Some(input) = input {
                config.storage.input = input;
            }
            if let Some(output) = output {
                config.storage.output = output;
            }

            config.validate().context("Configuration is not usable")?;

            let checkpoint_dir = checkpoint.or_else(|| config.output.checkpoint_dir.clone());
            let checkpoint_mgr = match checkpoint_dir {
                Some(dir) => Some(
                    CheckpointManager::new(&dir).context("Failed to create checkpoint manager")?,
                ),
                None => None,
            };

            let pipeline = EnrichPipeline::new(config)?;
            let stats = pipeline.run(checkpoint_mgr).await?;

            println!("\n=== Enrichment Complete ===");
            println!("Rows:        {}", stats.total_rows);
            println!("Enriched:    {}", stats.enriched);
            println!("Matched:     {}", stats.matched);
            println!("Skipped:     {}", stats.skipped);
            println!("Failed:      {}", stats.failed);
            println!("Match rate:  {:.1}%", stats.match_rate * 100.0);
            println!("Credits:     {}", stats.credits_used);
            println!("Throughput:  {:.0}/hr", stats.throughput_per_hour);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
        }
    }

    Ok(())
}
