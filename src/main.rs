use clap::Parser;
use file_distributor::app::{self, Cli};
use file_distributor::config::settings::resolve_config;
use file_distributor::config::ConfigError;
use file_distributor::core::{CommandTranspiler, Transpiler};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let cwd = match std::env::current_dir().map_err(ConfigError::WorkingDirectory) {
        Ok(cwd) => cwd,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match resolve_config(cli.to_partial_config(), &cli.config_location(), &cwd).await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let transpiler: Arc<dyn Transpiler> =
        Arc::new(CommandTranspiler::esbuild(config.ts_config.as_deref()));
    let watch = config.watch;

    match app::run(config, transpiler).await {
        Ok(summary) if summary.failed > 0 && !watch => {
            tracing::error!(
                "Could not complete dist flow: {} of {} runs failed",
                summary.failed,
                summary.failed + summary.completed
            );
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Could not complete dist flow: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
