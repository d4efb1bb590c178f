mod cli;
mod commands;
mod context;
mod error;
mod output;

use anyhow::Context as _;
use clap::Parser;
use cli::{Cli, Commands};
use context::Context;
use dirsnap_core::utils::logger;
use dirsnap_core::SettingsLoader;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match try_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::from(error::exit_code(&e))
        }
    }
}

fn try_main(cli: Cli) -> anyhow::Result<()> {
    let mut loader = SettingsLoader::new();
    if let Some(path) = &cli.settings {
        loader = loader.with_file(path);
    }
    let mut settings = loader.load().context("failed to load settings")?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    logger::init(&settings.log_level)?;
    tracing::debug!("Settings: {:?}", settings);

    let ctx = Context::new(settings, cli.dir.as_deref(), cli.json)?;

    match cli.command {
        Commands::Run(args) => commands::run::run(&ctx, args),
        Commands::RunAll(args) => commands::run_all::run(&ctx, args),
        Commands::Init(args) => commands::init::run(&ctx, args),
        Commands::Status => commands::status::run(&ctx),
        Commands::List(args) => commands::list::run(&ctx, args),
        Commands::LargeFiles(args) => commands::large_files::run(&ctx, args),
        Commands::Restore(args) => commands::restore::run(&ctx, args),
        Commands::Target(command) => commands::target::run(&ctx, command),
        Commands::Encryption(command) => commands::encryption::run(&ctx, command),
    }
}
