use clap::Subcommand;
use thiserror::Error;

pub mod assemble;
pub mod randomize;
pub mod sections;

/// Errors raised while preparing a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// The wrapped assembler call carried no source file.
    #[error("expected an assembler command line ending in the source file, got {0:?}")]
    MissingSource(Vec<String>),
    /// File read/write error.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    /// Randomization or assembling failed.
    #[error(transparent)]
    Transform(#[from] asmrand_transform::Error),
}

/// CLI subcommands for asmrand.
#[derive(Subcommand)]
pub enum Cmd {
    /// Randomize an assembly file and assemble it, retrying until the assembler accepts it.
    Assemble(assemble::AssembleArgs),
    /// Apply one randomization pass to an assembly file without assembling it.
    Randomize(randomize::RandomizeArgs),
    /// Print the dialect and section partition of an assembly file.
    Sections(sections::SectionsArgs),
}

/// Trait for executing CLI subcommands.
pub trait Command {
    /// Executes the subcommand.
    ///
    /// # Returns
    /// A `Result` indicating success or an error if execution fails.
    fn execute(self) -> Result<(), Box<dyn std::error::Error>>;
}

impl Command for Cmd {
    fn execute(self) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            Cmd::Assemble(args) => args.execute(),
            Cmd::Randomize(args) => args.execute(),
            Cmd::Sections(args) => args.execute(),
        }
    }
}
