//! Core results and error types

use thiserror::Error;

/// Core error type encompassing all core module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The assembler invocation carried no arguments at all.
    #[error("assembler invocation is empty")]
    EmptyInvocation,

    /// Failed to read file at the specified path.
    #[error("could not read file '{path}': {source}")]
    FileRead {
        /// The path to the file that could not be read.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write file at the specified path.
    #[error("could not write file '{path}': {source}")]
    FileWrite {
        /// The path to the file that could not be written.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid hexadecimal in seed.
    #[error("invalid hexadecimal in seed")]
    InvalidSeedHex,

    /// Invalid seed length.
    #[error("invalid seed length: expected 64 hex chars, got {0}")]
    InvalidSeedLength(usize),

    /// A line that is not a statement was decoded as one.
    #[error("line {line} is not a statement ⇒ `{raw}`")]
    NotAStatement {
        /// The line number of the offending line.
        line: usize,
        /// The raw content of the line.
        raw: String,
    },

    /// The file matches neither the libfirm nor the gcc conventions.
    #[error("unknown assembler dialect ({lines} lines, no block marker or cfi directive)")]
    UnknownDialect {
        /// Number of lines inspected.
        lines: usize,
    },
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
