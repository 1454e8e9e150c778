//! Command-line entry point for slack-shell.
//!
//! Without a subcommand the binary connects and starts the interactive
//! session. `completions` and `init-config` run without a workspace.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};

use crate::config::{default_cache_dir, default_config_path, Config};
use crate::error::{Result, ShellError};
use crate::tui::{self, RunOptions};

/// File name of the log inside the cache directory.
const LOG_FILE_NAME: &str = "slack-shell.log";

/// A Slack client with a Unix shell feel.
#[derive(Debug, Parser)]
#[command(name = "slack-shell")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Optional subcommand; without one the interactive session starts.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to a configuration file.
    #[arg(short = 'c', long, global = true, env = "SLACK_SHELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// User token; overrides the config file and SLACK_TOKEN.
    #[arg(long)]
    pub token: Option<String>,

    /// App-level token; enables realtime updates.
    #[arg(long)]
    pub app_token: Option<String>,

    /// Use the built-in demo workspace instead of Slack.
    #[arg(long)]
    pub demo: bool,

    /// Disable realtime updates.
    #[arg(long)]
    pub no_realtime: bool,

    /// Color theme (dark, light, high-contrast).
    #[arg(long, env = "SLACK_SHELL_THEME")]
    pub theme: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn", env = "SLACK_SHELL_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Log format (text, json, compact, pretty).
    #[arg(long, global = true, default_value = "text", env = "SLACK_SHELL_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Log output file (default: slack-shell.log in the cache directory).
    #[arg(long, global = true, env = "SLACK_SHELL_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// Log level options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    /// Only errors.
    Error,
    /// Errors and warnings.
    #[default]
    Warn,
    /// Errors, warnings, and informational messages.
    Info,
    /// All of the above plus debug messages.
    Debug,
    /// All messages including trace-level details.
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter level.
    #[must_use]
    pub fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Log format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format.
    #[default]
    Text,
    /// Structured JSON format for machine consumption.
    Json,
    /// Compact single-line format.
    Compact,
    /// Pretty format with full details.
    Pretty,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: CompletionShell,
    },

    /// Write a sample configuration file.
    InitConfig {
        /// Destination (default: the standard config location).
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompletionShell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// PowerShell.
    Powershell,
    /// Elvish shell.
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::Powershell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Generate shell completions and print to stdout.
pub fn generate_completions(shell: CompletionShell) {
    let mut cmd = Cli::command();
    let shell: Shell = shell.into();
    generate(shell, &mut cmd, "slack-shell", &mut io::stdout());
}

/// Write the sample configuration to `path`.
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(ShellError::ConfigError {
            message: format!("{} already exists (use --force to overwrite)", path.display()),
        });
    }
    crate::util::atomic_write(path, Config::sample()?.as_bytes())?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Load the configuration the session runs with.
///
/// An explicit `--config` path must exist; the default location is optional.
/// Environment tokens override the file and command-line tokens override both.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            config
        }
        None => Config::load()?,
    };

    if let Some(token) = &cli.token {
        config.slack_token = Some(token.clone());
    }
    if let Some(token) = &cli.app_token {
        config.app_token = Some(token.clone());
    }
    if cli.no_realtime {
        config.realtime.enabled = false;
    }
    Ok(config)
}

fn log_path(cli: &Cli, config: &Config) -> Option<PathBuf> {
    if let Some(path) = &cli.log_file {
        return Some(path.clone());
    }
    config
        .cache_dir()
        .or_else(|_| default_cache_dir())
        .ok()
        .map(|dir| dir.join(LOG_FILE_NAME))
}

/// Initialize logging into a file; the terminal belongs to the session.
fn init_logging(cli: &Cli, config: &Config) {
    use tracing_subscriber::{
        fmt::{self, format::FmtSpan},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    let level = if config.debug && cli.log_level == LogLevel::Warn {
        LogLevel::Debug
    } else {
        cli.log_level
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_filter_string()));

    let Some(path) = log_path(cli, config) else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {e}", path.display());
            return;
        }
    };
    let writer = Mutex::new(file);

    let result = match cli.log_format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Text => {
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
    };

    if let Err(e) = result {
        eprintln!("Warning: Failed to initialize logging: {e}");
    }
}

/// Parse arguments and run.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate_completions(*shell);
            return Ok(());
        }
        Some(Commands::InitConfig { path, force }) => {
            let path = match path {
                Some(path) => path.clone(),
                None => default_config_path()?,
            };
            return init_config(&path, *force);
        }
        None => {}
    }

    let config = load_config(&cli)?;
    init_logging(&cli, &config);

    let options = RunOptions {
        demo: cli.demo,
        theme: cli.theme.clone(),
        config_path: cli.config.clone().or_else(|| default_config_path().ok()),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ShellError::io("Failed to start async runtime", e))?;
    runtime.block_on(tui::run(config, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["slack-shell", "--demo", "--theme", "light"]).unwrap();
        assert!(cli.demo);
        assert_eq!(cli.theme.as_deref(), Some("light"));
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["slack-shell", "init-config", "/tmp/x.toml", "--force"]).unwrap();
        match cli.command {
            Some(Commands::InitConfig { path, force }) => {
                assert_eq!(path, Some(PathBuf::from("/tmp/x.toml")));
                assert!(force);
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from(["slack-shell", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: CompletionShell::Zsh })
        ));
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_config_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "slack_token = \"xoxp-file\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "slack-shell",
            "--config",
            path.to_str().unwrap(),
            "--token",
            "xoxp-flag",
            "--no-realtime",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.token(), Some("xoxp-flag"));
        assert!(!config.realtime.enabled);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let cli = Cli::try_parse_from(["slack-shell", "--config", "/nonexistent/slack-shell.toml"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
        assert!(Config::load_from(&path).is_ok());
    }
}
