use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use fitcoach::channels::{ChannelManager, CliChannel, TelegramChannel};
use fitcoach::coach::{Coach, Dispatcher};
use fitcoach::config::BotConfig;
use fitcoach::error::ConfigError;
use fitcoach::llm::create_provider;
use fitcoach::store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    let log_dir = std::env::var_os("FITCOACH_LOG_DIR");
    let _log_guard = init_tracing(log_dir.as_deref().map(Path::new))?;

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(ConfigError::MissingEnvVar(key)) => {
            eprintln!("Error: {key} is missing in environment variables.");
            eprintln!("  export {key}=...");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("💪 FitCoach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Validation: {:?}", config.dialog.validation);
    eprintln!("   Mid-dialog commands: {:?}", config.dialog.mid_dialog_commands);
    if let Some(dir) = &config.log_dir {
        eprintln!("   Logs: {}", dir.join("fitcoach.log.<date>").display());
    }
    if config.enable_cli {
        eprintln!("   CLI channel enabled. Type a message and press Enter.");
    }
    eprintln!();

    let db = store::open(&config.store)
        .await
        .context("failed to open profile store")?;
    let llm = create_provider(&config.llm).context("failed to create LLM provider")?;

    let mut channels = ChannelManager::new();
    channels.add(Box::new(TelegramChannel::new(
        config.telegram.bot_token.clone(),
        config.telegram.allowed_users.clone(),
    )));
    if config.enable_cli {
        channels.add(Box::new(CliChannel::new()));
    }

    let coach = Arc::new(Coach::new(db, llm, Arc::new(channels), config.dialog));
    Dispatcher::new(coach, config.worker_idle_timeout)
        .run()
        .await
        .context("bot stopped with an error")?;

    tracing::info!("FitCoach stopped");
    Ok(())
}

/// Log to stderr, and to a daily rolling file when a directory is given.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "fitcoach.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
