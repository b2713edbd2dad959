//! AnnoFit main executable

pub mod annofit;
pub mod common;
pub mod curebase;
pub mod err;
pub mod pipeline;

use std::process::{ExitCode, Termination};

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Variant annotation merging and filtering",
    long_about = "This tool merges custom interval databases into ANNOVAR tables and filters \
                  the result down to clinically actionable variants"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum Commands {
    /// Annotation related commands.
    Anno(Anno),
    /// Pipeline related commands.
    Pipeline(Pipeline),
}

/// Parsing of "anno *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Anno {
    /// The sub command to run
    #[command(subcommand)]
    command: AnnoCommands,
}

/// Enum supporting the parsing of "anno *" sub commands.
#[derive(Debug, Subcommand)]
enum AnnoCommands {
    Encode(curebase::gff3::Args),
    Merge(curebase::Args),
    Fit(annofit::Args),
}

/// Parsing of "pipeline *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Pipeline {
    /// The sub command to run
    #[command(subcommand)]
    command: PipelineCommands,
}

/// Enum supporting the parsing of "pipeline *" sub commands.
#[derive(Debug, Subcommand)]
enum PipelineCommands {
    Run(pipeline::Args),
}

fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        tracing::info!("annofit {}", common::worker_version());
        match &cli.command {
            Commands::Anno(anno) => match &anno.command {
                AnnoCommands::Encode(args) => curebase::gff3::run(&cli.common, args)?,
                AnnoCommands::Merge(args) => curebase::run(&cli.common, args)?,
                AnnoCommands::Fit(args) => annofit::run(&cli.common, args)?,
            },
            Commands::Pipeline(pipeline) => match &pipeline.command {
                PipelineCommands::Run(args) => pipeline::run(&cli.common, args)?,
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            match e.downcast::<err::AppError>() {
                Ok(app_error) => app_error.report(),
                Err(_) => ExitCode::FAILURE,
            }
        }
    }
}
