use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use sa_domain::config::{Config, ConfigSeverity};
use sa_gateway::cli::{Cli, Command, ConfigCommand};
use sa_gateway::front_door;
use sa_gateway::{bootstrap, cli};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        None | Some(Command::Serve) => {
            let (config, _config_path) = cli::load_config(&cli)?;
            init_tracing(&config);
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = cli::load_config(&cli)?;
            let passed = sa_gateway::cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config(&cli)?;
            let valid = sa_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config(&cli)?;
            sa_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("cc-slack {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    let default_filter = match &config.server.log_level {
        Some(level) => format!("{level},sa_gateway=debug"),
        None => "info,sa_gateway=debug".to_owned(),
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.server.log_format {
        sa_domain::config::LogFormat::Json => subscriber.json().init(),
        sa_domain::config::LogFormat::Pretty => subscriber.pretty().init(),
    }
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("cc-slack starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let state = bootstrap::build_app_state(config.clone())?;
    bootstrap::spawn_background_tasks(&state);

    let app = Router::new()
        .route("/health", get(front_door::health))
        .route("/slack/events", post(front_door::events))
        .route("/slack/commands", post(front_door::commands))
        .route("/slack/interactive", post(front_door::interactive))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
