use asmrand_cli::commands::{Cmd, Command};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// asmrand CLI
///
/// asmrand perturbs the memory layout of compiled programs by rewriting their assembly before it
/// reaches the assembler: heap allocation padding, stack frame padding, section reordering and
/// data sub-segment shuffling
#[derive(Parser)]
#[command(name = "asmrand")]
#[command(about = "asmrand: assembly layout randomizer")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the asmrand CLI with the provided arguments.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ASMRAND_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    cli.command.execute()
}
