//! Command-line interface for takeout
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and CLI overrides
//! - Subcommands (version, completion, config)
//! - Console presentation of a running export

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::categories::Category;
use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::export::ExportFormat;

pub mod completion;
pub mod console;

pub use console::{ConsoleSink, render_summary};

/// Takeout - bulk account export over a takeout session
#[derive(Parser, Debug)]
#[command(
    name = "takeout",
    version,
    about = "Bulk account export over a takeout session",
    long_about = "Opens a takeout session, exports the selected categories of account data \
concurrently, and writes one CSV or JSON file (plus media folders) per category."
)]
pub struct CliArgs {
    /// Account snapshot (JSON) to export from
    #[arg(short = 's', long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Category to export; repeat for several. Exports everything when omitted.
    #[arg(long = "category", value_enum, value_name = "CATEGORY")]
    pub categories: Vec<Category>,

    /// Record file format
    #[arg(short = 'f', long, value_enum, value_name = "FORMAT")]
    pub format: Option<ExportFormat>,

    /// Output directory
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Largest exported file in megabytes; enables file export for the session
    #[arg(long, value_name = "MB")]
    pub file_max_size_mb: Option<u64>,

    /// Delay every snapshot call by this many milliseconds
    #[arg(long, value_name = "MS")]
    pub latency_ms: Option<u64>,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Quiet mode (no progress bars)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for takeout
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Effective configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and apply argument overrides
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_export_args(config, args);
        Self::apply_logging_args(config, args);
    }

    fn apply_export_args(config: &mut Config, args: &CliArgs) {
        if let Some(format) = args.format {
            config.export.format = format;
        }
        if let Some(output) = &args.output {
            config.export.output_dir = output.clone();
        }
        if args.file_max_size_mb.is_some() {
            config.export.file_max_size_mb = args.file_max_size_mb;
        }
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Categories to export, in the order given and without repeats
    pub fn selected_categories(&self) -> Vec<Category> {
        if self.args.categories.is_empty() {
            return Category::ALL.to_vec();
        }
        let mut selected = Vec::new();
        for category in &self.args.categories {
            if !selected.contains(category) {
                selected.push(*category);
            }
        }
        selected
    }

    pub fn snapshot_path(&self) -> Result<&Path> {
        self.args.snapshot.as_deref().ok_or_else(|| {
            ConfigError::Generic("No account snapshot given. Use --snapshot <FILE>".to_string())
                .into()
        })
    }

    pub fn use_color(&self) -> bool {
        !self.args.no_color
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if a subcommand was handled, false to continue
    pub async fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Completion { shell }) => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn show_version(&self) {
        println!("takeout version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show {
            self.show_config()?;
        }

        Ok(())
    }

    fn validate_config_file(&self) {
        let path = self.config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("❌ Configuration file does not exist");
            return;
        }

        match Config::from_file(&path) {
            Ok(_) => println!("✅ Configuration is valid"),
            Err(e) => println!("❌ {}", e),
        }
    }

    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.config_path().display());
        println!();
        println!("=== Effective Configuration ===");
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Configuration file path (from args or default)
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    pub fn print_banner(&self) {
        if !self.args.quiet {
            let categories: Vec<&str> = self
                .selected_categories()
                .iter()
                .map(|c| c.slug())
                .collect();
            println!("Exporting: {}", categories.join(", "));
            println!(
                "Output: {} ({})",
                self.config.export.output_dir.display(),
                self.config.export.format
            );
        }
    }
}
