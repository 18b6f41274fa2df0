//! Entry point: config + logging bootstrap, then command dispatch.

mod cli;
mod error_fmt;
mod measure;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    match run(cli) {
        Ok(()) => {}
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("Error: {}", error_fmt::humanize(&err));
            }
            std::process::exit(error_fmt::exit_code_for_error(&err));
        }
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let config = load_config(&cli)?;
    init_logging(&cli, &config.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match &cli.cmd {
        Commands::Measure {
            subject,
            operator,
            notes,
            max_wait_ms,
            tick_ms,
            direct,
        } => {
            config.validate()?;
            measure::run_measure(
                &cli,
                &config,
                *subject,
                *operator,
                notes.clone(),
                *max_wait_ms,
                *tick_ms,
                *direct,
            )
        }
        Commands::Stats => measure::run_stats(&cli, &config),
        Commands::Init => measure::run_init(&cli, &config),
        Commands::SelfCheck => measure::run_self_check(&cli, &config),
    }
}

/// Read the config file when present; an absent file means defaults, so the
/// tool works out of the box with the simulator.
fn load_config(cli: &Cli) -> eyre::Result<timbang_config::Config> {
    if !cli.config.exists() {
        return Ok(timbang_config::Config::default());
    }
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {:?}", cli.config))?;
    timbang_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {:?}: {}", cli.config, e))
}

/// Console logs go to stderr so --json output on stdout stays parseable; an
/// optional JSON-lines file sink comes from the [logging] config section.
fn init_logging(cli: &Cli, logging: &timbang_config::Logging) -> eyre::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = logging
        .level
        .clone()
        .unwrap_or_else(|| cli.log_level.clone());
    let filter = EnvFilter::try_new(&level)
        .map_err(|e| eyre::eyre!("invalid log level '{}': {}", level, e))?;

    let registry = tracing_subscriber::registry().with(filter);
    if let Some(file) = &logging.file {
        let path = std::path::Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().map(std::ffi::OsStr::to_owned).unwrap_or_default();
        let dir = dir.unwrap_or_else(|| std::path::Path::new("."));
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, &name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, &name),
            _ => tracing_appender::rolling::never(dir, &name),
        };
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(fmt::layer().json().with_writer(non_blocking))
            .init();
    } else if cli.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }
    Ok(())
}
