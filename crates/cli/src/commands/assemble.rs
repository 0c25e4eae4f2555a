//! Module for the `assemble` subcommand, a drop-in wrapper around the system assembler.
//!
//! The wrapper reads its configuration from the `RANDOMIZATION` environment variable, randomizes
//! the source file named last on the command line and runs the real assembler on it, retrying
//! with milder randomization until the assembler accepts the result.

use crate::commands::CliError;
use asmrand_core::assembler::{Invocation, SystemAssembler};
use asmrand_transform::config::WrapperConfig;
use asmrand_transform::driver::{AssemblyDriver, Outcome};
use clap::Args;
use std::error::Error;

/// Arguments for the `assemble` subcommand.
#[derive(Args)]
pub struct AssembleArgs {
    /// Assembler to run, overriding `used_as` from the environment configuration.
    #[arg(long = "as", value_name = "PATH")]
    assembler: Option<String>,
    /// Seed (64 hex chars) for reproducible randomization.
    #[arg(long)]
    seed: Option<String>,
    /// Assembler command line. Its first element is replaced by the assembler, its last one is
    /// the source file.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    call: Vec<String>,
}

impl super::Command for AssembleArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let AssembleArgs {
            assembler,
            seed,
            call,
        } = self;

        let mut config = WrapperConfig::from_env().map_err(CliError::from)?;
        if let Some(assembler) = assembler {
            config.used_as = assembler;
        }
        if seed.is_some() {
            config.seed = seed;
        }

        let seed = config.seed().map_err(CliError::from)?;
        tracing::debug!("Randomization seed: {seed}");

        let invocation = Invocation::new(call.clone(), config.used_as.clone())
            .map_err(|_| CliError::MissingSource(call))?;

        let mut driver = AssemblyDriver::new(
            config.randomization,
            SystemAssembler,
            seed.create_deterministic_rng(),
        );
        let report = driver.run(&invocation).map_err(CliError::from)?;

        match report.outcome {
            Outcome::Randomized { phase, attempt } => tracing::debug!(
                "Randomized {} in {} phase (attempt {}, {} assembler runs)",
                invocation.source().display(),
                phase,
                attempt,
                report.attempts
            ),
            Outcome::Unmodified => tracing::debug!(
                "Assembled {} without randomization after {} runs",
                invocation.source().display(),
                report.attempts
            ),
        }
        Ok(())
    }
}
