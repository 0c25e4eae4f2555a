//! Invocation of the real assembler.
//!
//! The retry driver only needs to know whether an assembler run succeeded and, if not, what it
//! printed on stderr. [`Assembler`] is the seam that lets tests script those outcomes.

use crate::result::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Default system assembler.
pub const DEFAULT_ASSEMBLER: &str = "/usr/bin/as";

/// Argument vector of one assembler call. The first element is the program, the last one the
/// source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    argv: Vec<String>,
}

impl Invocation {
    /// Takes an argument vector as received by the wrapper and swaps its program for `assembler`.
    pub fn new(mut argv: Vec<String>, assembler: impl Into<String>) -> Result<Self> {
        if argv.len() < 2 {
            return Err(Error::EmptyInvocation);
        }
        argv[0] = assembler.into();
        Ok(Self { argv })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// The assembly source handed to the assembler.
    pub fn source(&self) -> PathBuf {
        PathBuf::from(&self.argv[self.argv.len() - 1])
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// A failed assembler run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// Exit code, `None` when the process was killed by a signal or never started.
    pub status: Option<i32>,
    /// Captured standard error.
    pub stderr: String,
}

/// Something that assembles an [`Invocation`].
pub trait Assembler {
    fn assemble(&mut self, invocation: &Invocation) -> std::result::Result<(), Rejection>;
}

/// Runs the invocation as a child process and waits for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAssembler;

impl Assembler for SystemAssembler {
    fn assemble(&mut self, invocation: &Invocation) -> std::result::Result<(), Rejection> {
        let output = Command::new(invocation.program())
            .args(invocation.args())
            .output()
            .map_err(|e| Rejection {
                status: None,
                stderr: format!("failed to run {}: {e}", invocation.program()),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Rejection {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Reads the whole source file, attaching the path to IO errors.
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::FileRead {
        path: path.display().to_string(),
        source,
    })
}

/// Writes the whole source file, attaching the path to IO errors.
pub fn write_source(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|source| Error::FileWrite {
        path: path.display().to_string(),
        source,
    })
}
