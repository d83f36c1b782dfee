//! # Unicorn Stack CLI
//!
//! ```bash
//! # Render the stack template
//! unicorn-stack synth --settings stack.yaml --format yaml
//!
//! # Validate settings only
//! unicorn-stack validate --settings stack.yaml
//!
//! # Print the JSON schema of the settings file
//! unicorn-stack schema
//!
//! # Apply to the in-memory engine and show what would change
//! unicorn-stack plan --settings stack.yaml --repository unicorn-store --twice
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use unicorn_stack::config::{settings_schema, StackSettings};
use unicorn_stack::engine::{InMemoryEngine, ProvisioningEngine};
use unicorn_stack::observability::{init_logging, metrics, DEFAULT_LOG_FILTER};
use unicorn_stack::stack::build_stack;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Unicorn Store stack builder
#[derive(Parser)]
#[command(name = "unicorn-stack", version = VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the stack and print its template
    Synth {
        /// Settings file (YAML or JSON)
        #[arg(short, long, value_name = "FILE")]
        settings: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Load and validate a settings file
    Validate {
        /// Settings file (YAML or JSON)
        #[arg(short, long, value_name = "FILE")]
        settings: PathBuf,
    },
    /// Print the JSON schema of the settings file
    Schema,
    /// Apply the stack to an in-memory engine and print the report
    Plan {
        /// Settings file (YAML or JSON)
        #[arg(short, long, value_name = "FILE")]
        settings: PathBuf,

        /// Existing image repository known to the engine (repeatable)
        #[arg(long = "repository", value_name = "NAME")]
        repositories: Vec<String>,

        /// Apply a second time to show that re-applying changes nothing
        #[arg(long)]
        twice: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

fn load_settings(path: &Path) -> Result<StackSettings> {
    let mut settings = StackSettings::from_file(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    settings
        .apply_env_overrides()
        .context("Failed to apply environment overrides")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(DEFAULT_LOG_FILTER);
    metrics::register_metrics().context("Failed to register metrics")?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { settings, format } => {
            let settings = load_settings(&settings)?;
            let stack = build_stack(&settings).context("Failed to build stack")?;
            let template = stack.template();
            let rendered = match format {
                Format::Json => template.to_json()?,
                Format::Yaml => template.to_yaml()?,
            };
            println!("{rendered}");
        }
        Commands::Validate { settings } => {
            let loaded = load_settings(&settings)?;
            loaded.validate().context("Settings are invalid")?;
            println!("{} is valid (stack {})", settings.display(), loaded.stack_name());
        }
        Commands::Schema => {
            let schema = serde_json::to_string_pretty(&settings_schema())
                .context("Failed to render settings schema")?;
            println!("{schema}");
        }
        Commands::Plan {
            settings,
            repositories,
            twice,
        } => {
            let settings = load_settings(&settings)?;
            let template = build_stack(&settings)
                .context("Failed to build stack")?
                .template();

            let engine = InMemoryEngine::new();
            for repository in repositories {
                engine.register_repository(repository).await;
            }

            let report = engine
                .apply(&template)
                .await
                .context("Failed to apply stack")?;
            println!("{report}");

            if twice {
                info!("Re-applying the same template");
                let report = engine
                    .apply(&template)
                    .await
                    .context("Failed to re-apply stack")?;
                println!("{report}");
            }
        }
    }

    if cli.print_metrics {
        eprintln!("{}", metrics::render_metrics()?);
    }
    Ok(())
}
