mod tui;

use std::{fs::File, path::Path, process};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Env, Target};
use log::LevelFilter;
use transmission_dashboard::config::{build_config, Cli};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    init_logging(config.log_level, config.log_file.as_deref())?;
    tui::run(config)
}

/// Logs go to `log_file` when set. Without one only warnings reach stderr,
/// which the alternate screen hides until exit.
fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let mut builder = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let env = Env::default().default_filter_or(level.to_string());
            let mut builder = env_logger::Builder::from_env(env);
            builder.target(Target::Pipe(Box::new(file)));
            builder
        }
        None => {
            let level = level.min(LevelFilter::Warn);
            let env = Env::default().default_filter_or(level.to_string());
            env_logger::Builder::from_env(env)
        }
    };
    let _ = builder
        .format_timestamp(None)
        .format_target(false)
        .try_init();
    Ok(())
}
