//! Module for the `sections` subcommand, which prints how an assembly file is partitioned.

use asmrand_core::{AssemblyFile, SectionKind};
use clap::Args;
use std::error::Error;

/// Arguments for the `sections` subcommand.
#[derive(Args)]
pub struct SectionsArgs {
    /// Assembly source file.
    pub input: String,
}

impl super::Command for SectionsArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let asm = AssemblyFile::from_file(&self.input)?;
        println!("dialect: {:?}", asm.dialect());
        for (i, section) in asm.sections().iter().enumerate() {
            let kind = match section.kind() {
                SectionKind::Function => "function",
                SectionKind::Plain => "plain",
            };
            let span = section.span();
            let first = section
                .lines()
                .iter()
                .find(|line| !line.is_blank())
                .map(|line| line.normalized())
                .unwrap_or_default();
            println!(
                "{:>4}  {:<8}  {:>6}..{:<6}  {}",
                i, kind, span.start, span.end, first
            );
        }
        Ok(())
    }
}
