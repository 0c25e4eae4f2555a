pub mod config;
pub mod driver;
pub mod file_structure;
pub mod heap_padding;
pub mod pass;
pub mod processor;
pub mod segment_shuffle;
pub mod stack_padding;

use asmrand_core::AssemblyFile;
use rand::rngs::StdRng;
use thiserror::Error;

/// Transform error type encompassing all transform module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Every attempt, including the unmodified input, was rejected by the assembler.
    #[error("assembler failed after {attempts} attempts (status {status:?}):\n{stderr}")]
    AssemblerFailed {
        /// Number of assembler runs made.
        attempts: usize,
        /// Exit code of the last run.
        status: Option<i32>,
        /// Standard error of the last run.
        stderr: String,
    },

    /// Core operation failed.
    #[error("core operation failed: {0}")]
    Core(#[from] asmrand_core::Error),

    /// A padding bound whose samples do not fit a 32-bit signed immediate.
    #[error("{field} bound {bound} exceeds the largest immediate bound {max}")]
    PaddingBoundTooLarge {
        /// Configuration key holding the bound.
        field: &'static str,
        /// The rejected bound.
        bound: u64,
        /// Largest accepted bound.
        max: u64,
    },

    /// The randomization configuration could not be parsed.
    #[error("invalid randomization config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Transform result type
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for layout randomization transforms.
pub trait Transform: Send + Sync {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Applies the transform to the assembly file, returning whether changes were made.
    fn apply(&self, asm: &mut AssemblyFile, rng: &mut StdRng) -> Result<bool>;
}
