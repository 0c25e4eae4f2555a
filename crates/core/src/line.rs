//! Classification of single assembly lines.
//!
//! Every property here is derived from the line's own text. Nothing looks at neighbouring lines,
//! which keeps classification stable while sections are reordered and instructions are inserted.

use crate::result::Result;
use crate::statement::StatementLine;
use std::fmt;

/// Segments that open a new region of the file.
pub const SEGMENT_NAMES: [&str; 4] = ["bss", "data", "rodata", "text"];

/// One physical line of assembly, without its line terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    content: String,
    number: usize,
}

impl Line {
    /// Creates a line at the given 0-based position.
    pub fn new(content: impl Into<String>, number: usize) -> Self {
        Self {
            content: content.into(),
            number,
        }
    }

    /// Raw text of the line.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// 0-based position of the line in its file, valid after the last renumbering.
    pub fn number(&self) -> usize {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: usize) {
        self.number = number;
    }

    /// The line with leading/trailing whitespace removed and inner whitespace runs collapsed to a
    /// single space.
    pub fn normalized(&self) -> String {
        self.content.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Prefix match against the normalized line, so `\t.section\t.data` matches `.section .data`.
    pub fn starts_with(&self, pattern: &str) -> bool {
        self.normalized().starts_with(pattern)
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// A label holds a colon inside its first whitespace-delimited token (`main:`, `.L3:`).
    pub fn is_label(&self) -> bool {
        self.content
            .split_whitespace()
            .next()
            .is_some_and(|token| token.contains(':'))
    }

    /// Label name without the colon, if this line is a label.
    pub fn label(&self) -> Option<&str> {
        if !self.is_label() {
            return None;
        }
        self.content.trim_start().split(':').next()
    }

    /// Labels not starting with `.` name functions or global objects; dotted ones are local.
    pub fn is_function_label(&self) -> bool {
        self.label().is_some_and(|label| !label.starts_with('.'))
    }

    /// Anything that is neither a label, a `/`-comment nor blank.
    pub fn is_statement(&self) -> bool {
        !self.is_label() && !self.is_blank() && !self.content.trim_start().starts_with('/')
    }

    /// Statement opening one of `.bss`, `.data`, `.rodata` or `.text`.
    pub fn is_segment_statement(&self) -> bool {
        self.is_segment_statement_of(&SEGMENT_NAMES)
    }

    /// Statement opening one of the given segments, either directly (`.data`) or through a
    /// `.section .data…` directive.
    pub fn is_segment_statement_of(&self, names: &[&str]) -> bool {
        if !self.is_statement() {
            return false;
        }
        let normalized = self.normalized();
        names.iter().any(|name| {
            normalized.starts_with(&format!(".{name}"))
                || normalized.starts_with(&format!(".section .{name}"))
        })
    }

    /// Does this line split the current run of lines into two sections?
    pub fn is_section_boundary(&self) -> bool {
        self.is_blank() || (self.is_statement() && (self.is_segment_statement() || self.number == 0))
    }

    /// Decodes the line into mnemonic and operands.
    pub fn to_statement(&self) -> Result<StatementLine> {
        StatementLine::try_from(self)
    }

    /// First token of a statement line, `None` for labels, comments and blank lines.
    pub fn mnemonic(&self) -> Option<&str> {
        if !self.is_statement() {
            return None;
        }
        self.content.split_whitespace().next()
    }
}

impl From<Line> for String {
    fn from(line: Line) -> Self {
        line.content
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}
