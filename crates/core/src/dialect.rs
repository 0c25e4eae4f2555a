//! Compiler dialects recognised by the sectioning logic.

use crate::line::Line;
use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};

/// Stylistic convention a compiler backend uses to mark function and segment boundaries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// libfirm/cparser output: functions are announced by `# -- Begin <name>` comments and blocks
    /// are separated by blank lines.
    Libfirm,
    /// gcc/clang output: functions carry `.cfi_*` directives and blocks start at `.text` or a
    /// segment directive.
    Gcc,
}

impl Dialect {
    /// Sniffs the dialect from the marker lines present in the file.
    pub fn detect(lines: &[Line]) -> Result<Self> {
        if lines.iter().any(is_begin_marker) {
            Ok(Dialect::Libfirm)
        } else if lines.iter().any(|line| line.starts_with(".cfi")) {
            Ok(Dialect::Gcc)
        } else {
            Err(Error::UnknownDialect { lines: lines.len() })
        }
    }

    /// Whether `line` opens a new section.
    pub fn splits_before(self, line: &Line) -> bool {
        match self {
            Dialect::Libfirm => line.is_blank(),
            Dialect::Gcc => line.normalized() == ".text" || line.is_segment_statement(),
        }
    }

    /// Whether `line` announces a function body in this dialect.
    pub fn is_function_marker(self, line: &Line) -> bool {
        match self {
            Dialect::Libfirm => is_begin_marker(line),
            Dialect::Gcc => false,
        }
    }

    /// Whether the first section carrying call-frame directives stays in place during file
    /// structure randomization.
    pub fn pins_first_cfi_section(self) -> bool {
        matches!(self, Dialect::Gcc)
    }
}

/// Matches `#`, a run of `-` and spaces ending in a space, then `Begin `, at the start of the line.
fn is_begin_marker(line: &Line) -> bool {
    let Some(after_hash) = line.content().strip_prefix('#') else {
        return false;
    };
    let tail = after_hash.trim_start_matches(['-', ' ']);
    let filler = &after_hash[..after_hash.len() - tail.len()];
    filler.ends_with(' ') && tail.starts_with("Begin ")
}
