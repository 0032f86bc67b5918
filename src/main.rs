//! protogen - incremental protobuf code generation
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use protogen::cli::{commands, Cli, Commands};
use protogen::error::ProtogenResult;
use std::process::ExitCode;
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
            if e.is_cancelled() {
                ExitCode::from(130)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run() -> ProtogenResult<()> {
    let cli = Cli::parse();

    // 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("protogen=warn"),
        1 => EnvFilter::new("protogen=info"),
        _ => EnvFilter::new("protogen=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate(args) => commands::generate(args, cli.project_dir).await,
        Commands::Clean(args) => commands::clean(args, cli.project_dir).await,
        Commands::Deps(args) => commands::deps(args, cli.project_dir).await,
    }
}
