//! CLI command definitions and handlers

mod bootstrap;
mod extract;
mod generate;
mod init;
mod prepare_reference;
mod record;
mod retrain;
mod score;
mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use keycrypt::service::FailureResponse;
use keycrypt::strength::{Label, OwnerContext};
use keycrypt::{EngineConfig, EngineError, StrengthEngine};

/// keycrypt - personalized password strength scoring
#[derive(Parser, Debug)]
#[command(name = "keycrypt")]
#[command(
    version,
    about = "Score password strength with per-owner models and generate strong candidates",
    after_help = "\
Examples:
  keycrypt init                                  Write an example config
  keycrypt prepare-reference data.csv            Build and upload the reference dataset
  keycrypt bootstrap                             Train the shared reference model
  keycrypt score alice --password 'P@ssw0rd1'    Score a password for an owner
  keycrypt generate alice -k tiger -k lily       Keyword-blended candidates
  keycrypt retrain alice                         Retrain alice's model"
)]
pub struct Cli {
    /// Config file (default: ~/.config/keycrypt/engine.toml)
    #[arg(long, global = true, env = "KEYCRYPT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Optional owner profile used for the similarity feature
#[derive(Args, Debug, Default, Clone)]
pub struct ContextArgs {
    /// Owner display name
    #[arg(long)]
    pub name: Option<String>,

    /// Owner email address
    #[arg(long)]
    pub email: Option<String>,

    /// Owner username
    #[arg(long)]
    pub username: Option<String>,
}

impl ContextArgs {
    pub fn to_context(&self) -> Option<OwnerContext> {
        if self.name.is_none() && self.email.is_none() && self.username.is_none() {
            return None;
        }
        Some(OwnerContext {
            name: self.name.clone().unwrap_or_default(),
            email: self.email.clone().unwrap_or_default(),
            username: self.username.clone().unwrap_or_default(),
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example engine.toml
    Init {
        /// Where to write it (default: the user config path)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Print the feature vector for a password
    Extract {
        password: String,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Score a password (or a JSON feature map) for an owner
    Score {
        owner: String,

        /// Password to extract features from
        #[arg(long, conflicts_with = "features", required_unless_present = "features")]
        password: Option<String>,

        /// Pre-computed features as a JSON object
        #[arg(long)]
        features: Option<String>,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Store a password sample for an owner
    Record {
        owner: String,

        password: String,

        /// Known strength (weak, medium, strong or 0-2); omit to auto-label at retrain
        #[arg(long)]
        label: Option<Label>,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Retrain an owner's model from the reference dataset plus their samples
    Retrain { owner: String },

    /// Generate keyword-blended candidate passwords ranked by strength
    Generate {
        owner: String,

        /// Keyword to blend in (repeatable)
        #[arg(long = "keyword", short = 'k')]
        keywords: Vec<String>,

        /// RNG seed for reproducible candidates
        #[arg(long)]
        seed: Option<u64>,

        /// Show only the N strongest candidates
        #[arg(long)]
        top: Option<usize>,
    },

    /// Build the reference dataset from a raw password,strength CSV
    PrepareReference {
        /// Raw CSV with `password` and `strength` columns
        input: PathBuf,

        /// Also write the feature table to this local file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Skip uploading to the configured store
        #[arg(long)]
        no_upload: bool,
    },

    /// Train the shared reference model from the reference dataset
    Bootstrap,

    /// Show which model resolves for an owner
    Status { owner: String },
}

/// Load config and wire up the engine.
pub(crate) fn load_engine(cli_config: Option<&std::path::Path>) -> Result<StrengthEngine> {
    let config = EngineConfig::load(cli_config).context("Failed to load configuration")?;
    StrengthEngine::from_config(config).context("Failed to open storage")
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run(cli: Cli) -> Result<()> {
    let format = cli.format;
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Init { path } => init::run(path.as_deref().or(config), format),
        Commands::Extract { password, context } => {
            extract::run(config, &password, context.to_context().as_ref(), format)
        }
        Commands::Score {
            owner,
            password,
            features,
            context,
        } => score::run(
            config,
            &owner,
            password.as_deref(),
            features.as_deref(),
            context.to_context().as_ref(),
            format,
        ),
        Commands::Record {
            owner,
            password,
            label,
            context,
        } => record::run(
            config,
            &owner,
            &password,
            label,
            context.to_context().as_ref(),
            format,
        ),
        Commands::Retrain { owner } => retrain::run(config, &owner, format),
        Commands::Generate {
            owner,
            keywords,
            seed,
            top,
        } => generate::run(config, &owner, &keywords, seed, top, format),
        Commands::PrepareReference {
            input,
            output,
            no_upload,
        } => prepare_reference::run(config, &input, output.as_deref(), !no_upload, format),
        Commands::Bootstrap => bootstrap::run(config, format),
        Commands::Status { owner } => status::run(config, &owner, format),
    };

    if let (Err(err), OutputFormat::Json) = (&result, format) {
        let failure = match err.downcast_ref::<EngineError>() {
            Some(engine_err) => FailureResponse::from(engine_err),
            None => FailureResponse {
                status: "error".into(),
                detail: format!("{err:#}"),
            },
        };
        print_json(&failure)?;
    }
    result
}
