pub mod commands;

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yml";

#[derive(Parser, Debug)]
#[command(name = "teleflux")]
#[command(about = "Synchronize Telegram folders with Miniflux categories through RSSHub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, env = "TELEFLUX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Show what would be done without making any changes
    #[arg(short, long)]
    pub dry_run: bool,

    /// List all available Telegram folders
    #[arg(short, long)]
    pub list_folders: bool,

    /// List all Telegram channels that are not in any folder
    #[arg(short = 'u', long)]
    pub list_unfoldered_channels: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Custom path to Telegram session file (overrides config)
    #[arg(short, long)]
    pub session_file: Option<PathBuf>,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<clap_complete::Shell>,
}

impl Cli {
    /// Explicit `--config`, else `config/config.yml`, else the user config directory
    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }

        let local = PathBuf::from(DEFAULT_CONFIG_PATH);
        if local.exists() {
            return local;
        }

        Config::config_dir()
            .map(|dir| dir.join("config.yml"))
            .ok()
            .filter(|p| p.exists())
            .unwrap_or(local)
    }

    /// Run the selected mode and return the process exit code
    pub async fn run(self) -> i32 {
        if let Some(shell) = self.completions {
            commands::generate_completions(shell);
            return 0;
        }

        let _ = dotenvy::dotenv();

        let config_path = self.config_path();
        let mut config = match Config::load_with_env(&config_path) {
            Ok(config) => config,
            Err(e) => {
                if !self.quiet {
                    report_load_error(&e, self.config.is_none());
                }
                return e.exit_code();
            }
        };

        if let Some(session_file) = &self.session_file {
            config.telegram.session_file = session_file.clone();
        }

        let quiet = self.quiet || config.logging.quiet;
        config.logging.quiet = quiet;

        let _guard = match commands::init_logging(&config.logging, quiet) {
            Ok(guard) => guard,
            Err(e) => {
                if !quiet {
                    eprintln!("Configuration error: {}", e);
                }
                return e.exit_code();
            }
        };

        if let Err(e) = commands::ensure_session_dir(&config.telegram.session_file) {
            if !quiet {
                eprintln!("Error: {}", e);
            }
            return e.exit_code();
        }

        tracing::info!("Configuration loaded from: {}", config_path.display());

        let outcome = if self.list_unfoldered_channels {
            commands::list_unfoldered_channels(&config, quiet).await
        } else if self.list_folders {
            commands::list_folders(&config, quiet).await
        } else {
            commands::run_sync(&config, self.dry_run, quiet).await
        };

        match outcome {
            Ok(code) => code,
            Err(Error::Interrupted) => {
                if !quiet {
                    eprintln!("\n{}", Error::Interrupted);
                }
                Error::Interrupted.exit_code()
            }
            Err(e) => {
                if !quiet {
                    eprintln!("Critical error: {}", e);
                }
                tracing::error!("Critical error: {}", e);
                match e {
                    Error::ConfigNotFound(_) | Error::Config(_) => e.exit_code(),
                    _ => 4,
                }
            }
        }
    }
}

fn report_load_error(err: &Error, default_path: bool) {
    match err {
        Error::ConfigNotFound(_) => {
            eprintln!("Error: {}", err);
            if default_path {
                eprintln!(
                    "Hint: Create a config.yml file in ./config/ or specify a custom path with --config"
                );
            }
        }
        Error::Config(_) => eprintln!("{}", err),
        _ => eprintln!("Configuration error: {}", err),
    }
}
