//! skillsync CLI entry point

use clap::Parser;
use console::style;
use skillsync::cli::commands::{self, CommandEnv};
use skillsync::cli::{Cli, Commands};
use skillsync::config::{Config, ConfigManager};
use skillsync::error::SkillsyncResult;
use skillsync::installer::CancelSignal;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SkillsyncResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    config.apply_env(|key| std::env::var(key).ok());

    init_logging(&config, cli.verbose);
    debug!("Config: {}", config_manager.path().display());

    let env = CommandEnv::new(config)?;
    let lock = cli.lock.as_deref();
    let client = cli.client.as_deref();

    match cli.command {
        Commands::Install(args) => {
            let cancel = CancelSignal::new();
            spawn_interrupt_handler(cancel.clone());
            commands::install(args, &env, lock, client, cancel).await
        }
        Commands::Resolve(args) => commands::resolve(args, &env, lock, client).await,
        Commands::Check(args) => commands::check(args, &env, lock).await,
        Commands::Cache(args) => commands::cache(args, &env).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; silent mode wins
fn init_logging(config: &Config, verbose: u8) {
    let filter = if config.general.silent {
        EnvFilter::new("skillsync=error")
    } else {
        match verbose {
            0 => EnvFilter::new("skillsync=warn"),
            1 => EnvFilter::new("skillsync=info"),
            _ => EnvFilter::new("skillsync=debug"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

/// First Ctrl-C cancels the run; in-flight installs finish or roll back
fn spawn_interrupt_handler(cancel: CancelSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
}
