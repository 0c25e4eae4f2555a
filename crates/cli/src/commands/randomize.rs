//! Module for the `randomize` subcommand, which applies one randomization pass to an assembly
//! file and prints or writes the result without assembling it.

use crate::commands::CliError;
use asmrand_core::StructureMode;
use asmrand_core::seed::Seed;
use asmrand_transform::config::RandomizationConfig;
use asmrand_transform::processor::AssemblyProcessor;
use clap::Args;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

/// Arguments for the `randomize` subcommand.
#[derive(Args)]
pub struct RandomizeArgs {
    /// Assembly source file.
    pub input: PathBuf,
    /// Pad allocation sizes by an amount in [0, HEAP).
    #[arg(long, default_value_t = 0)]
    heap: u64,
    /// Pad stack frames by an amount in [0, STACK).
    #[arg(long, default_value_t = 0)]
    stack: u64,
    /// Shuffle the bss sub-segments.
    #[arg(long)]
    bss: bool,
    /// Shuffle the data sub-segments.
    #[arg(long)]
    data: bool,
    /// Shuffle the rodata sub-segments.
    #[arg(long)]
    rodata: bool,
    /// Reorder the sections of the file.
    #[arg(long)]
    file_structure: bool,
    /// Only swap neighbouring sections when reordering.
    #[arg(long)]
    small_changes: bool,
    /// Seed (64 hex chars) for reproducible randomization.
    #[arg(long)]
    seed: Option<String>,
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl super::Command for RandomizeArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let config = RandomizationConfig {
            heap: self.heap,
            stack: self.stack,
            bss: self.bss,
            data: self.data,
            rodata: self.rodata,
            file_structure: self.file_structure,
        };
        let mode = if self.small_changes {
            StructureMode::SmallChanges
        } else {
            StructureMode::Shuffle
        };

        let seed = match &self.seed {
            Some(hex) => hex.parse::<Seed>()?,
            None => Seed::generate(),
        };
        tracing::debug!("Randomization seed: {seed}");
        let mut rng = seed.create_deterministic_rng();

        let text = fs::read_to_string(&self.input).map_err(CliError::from)?;
        let processor = AssemblyProcessor::new(config);
        let randomized = processor
            .process_text(&text, mode, &mut rng)
            .map_err(CliError::from)?
            .unwrap_or(text);

        match self.output {
            Some(path) => fs::write(path, randomized).map_err(CliError::from)?,
            None => print!("{randomized}"),
        }
        Ok(())
    }
}
