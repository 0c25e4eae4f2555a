//! Statement lines split into mnemonic and operand text.

use crate::line::Line;
use crate::result::Error;
use std::ops::Deref;

/// A statement line decoded into its mnemonic and the remaining operand text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatementLine {
    line: Line,
    mnemonic: String,
    rest: String,
}

impl StatementLine {
    /// First whitespace-delimited token, e.g. `call` or `.section`.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Operand text after the mnemonic, possibly empty.
    pub fn rest(&self) -> &str {
        &self.rest
    }

    /// First whitespace-delimited operand token.
    pub fn first_operand(&self) -> Option<&str> {
        self.rest.split_whitespace().next()
    }
}

impl Deref for StatementLine {
    type Target = Line;

    fn deref(&self) -> &Line {
        &self.line
    }
}

impl TryFrom<&Line> for StatementLine {
    type Error = Error;

    fn try_from(line: &Line) -> Result<Self, Error> {
        if !line.is_statement() {
            return Err(Error::NotAStatement {
                line: line.number(),
                raw: line.content().to_string(),
            });
        }

        let trimmed = line.content().trim();
        let (mnemonic, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((mnemonic, rest)) => (mnemonic, rest.trim_start()),
            None => (trimmed, ""),
        };

        Ok(Self {
            line: line.clone(),
            mnemonic: mnemonic.to_string(),
            rest: rest.to_string(),
        })
    }
}
