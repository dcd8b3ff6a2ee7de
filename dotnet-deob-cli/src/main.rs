mod app;
mod commands;
mod output;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<ExitCode> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // Show dotnet_deob info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("dotnet_deob", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Run {
            path,
            toolchain,
            tools,
            max_size,
            no_size_limit,
            output,
            suffix,
            recursive,
            report,
        } => commands::run::run(
            path,
            &commands::run::RunOptions {
                config: commands::common::job_config(
                    toolchain,
                    tools,
                    (!*no_size_limit).then_some(*max_size),
                ),
                output: output.as_deref(),
                suffix,
                recursive: *recursive,
                report: report.as_deref(),
                global: &cli.global,
            },
        ),
        Command::Check { path } => {
            commands::check::run(path, &cli.global).map(|()| ExitCode::SUCCESS)
        }
        Command::Tools { toolchain } => {
            commands::tools::run(toolchain, &cli.global).map(|()| ExitCode::SUCCESS)
        }
    }
}
