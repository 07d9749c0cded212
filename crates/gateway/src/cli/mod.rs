pub mod config;
pub mod doctor;

use clap::{Parser, Subcommand};

/// cc-slack — a bridge between a chat platform and an interactive coding
/// agent CLI.
#[derive(Debug, Parser)]
#[command(name = "cc-slack", version, about)]
pub struct Cli {
    /// Path to the config file. Overrides `CC_SLACK_CONFIG`.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Override `working_dirs[]` for this invocation (repeatable,
    /// `name=path`); collapses to single-dir mode when exactly one is given.
    #[arg(long = "working-dirs", global = true)]
    pub working_dirs: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `--config`, falling
/// back to `CC_SLACK_CONFIG` and then `config.toml`, then apply a
/// `--working-dirs` override if one was given. Returns the parsed
/// [`Config`] and the path that was used.
///
/// Shared by `serve`, `doctor`, and `config` subcommands so the logic
/// lives in one place.
pub fn load_config(cli: &Cli) -> anyhow::Result<(sa_domain::config::Config, String)> {
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CC_SLACK_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".into());

    let mut config = sa_domain::config::Config::load(std::path::Path::new(&config_path))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if !cli.working_dirs.is_empty() {
        config.working_dirs = sa_domain::config::parse_cli_override(&cli.working_dirs)
            .map_err(|e| anyhow::anyhow!(e))?;
    }

    Ok((config, config_path))
}
