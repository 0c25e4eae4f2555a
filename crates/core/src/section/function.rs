//! Prologue/epilogue aware stack padding for function sections.
//!
//! Assumptions about each function:
//! - `pushq %rbp` is its first frame instruction
//! - every `ret` is preceded by the matching `popq %rbp` (after `leave` has been expanded)
//! - every `popq %rbp` belongs to a return; a frame pop leading into a tail call cannot be
//!   patched, so such functions are skipped
//! - with call-frame info, `.cfi_endproc` closes the function
//!
//! Padding amounts are rounded down to the 16-byte stack alignment of the x86-64 SysV ABI.

use super::{Section, insert_after, insert_before};
use crate::dialect::Dialect;
use crate::line::Line;
use std::ops::Range;
use tracing::debug;

const FUNCTION_END: &str = ".cfi_endproc";

/// Stack pointer alignment required at call sites.
pub const STACK_ALIGNMENT: u64 = 16;

/// Why a function was left untouched by [`FunctionSection::pad_stack`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The function end was reached before any function label.
    MissingLabel { line: usize },
    /// No `pushq %rbp` between the label and the function end.
    MissingPrologue { function: String },
    /// A `ret` with no `popq %rbp` between it and the previous patch point.
    MissingEpilogue { function: String, ret_line: usize },
    /// A `popq %rbp` not followed by a return, e.g. before a tail call `jmp`.
    UnpatchedEpilogue { function: String, pop_line: usize },
    /// The section ends before the function's `.cfi_endproc`, so some returns live elsewhere.
    Truncated { function: String },
}

/// Outcome of padding every function of one section.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaddingReport {
    /// Labels of the functions that were padded.
    pub padded: Vec<String>,
    /// Functions that were rolled back.
    pub skipped: Vec<SkipReason>,
}

impl PaddingReport {
    /// True when at least one function was padded and none had to be rolled back.
    pub fn is_complete(&self) -> bool {
        !self.padded.is_empty() && self.skipped.is_empty()
    }

    pub fn merge(&mut self, other: PaddingReport) {
        self.padded.extend(other.padded);
        self.skipped.extend(other.skipped);
    }
}

/// Mutable view of a [`Section`] known to hold function bodies.
pub struct FunctionSection<'a> {
    section: &'a mut Section,
}

enum Extent {
    /// Label up to and including its `.cfi_endproc`, or the section end.
    Function(Range<usize>),
    /// A `.cfi_endproc` reached before any label.
    Orphan(usize),
}

impl<'a> FunctionSection<'a> {
    pub(super) fn new(section: &'a mut Section) -> Self {
        Self { section }
    }

    /// Grows the stack frame of every function in the section by `amount` bytes, rounded down to
    /// [`STACK_ALIGNMENT`].
    ///
    /// Each function is padded all-or-nothing: the edit happens on a copy of its lines, which is
    /// only written back when the prologue and every return could be patched. Functions that
    /// failed keep their original lines and are listed in [`PaddingReport::skipped`].
    pub fn pad_stack(&mut self, amount: u64) -> PaddingReport {
        let dialect = self.section.dialect();
        let amount = amount - amount % STACK_ALIGNMENT;
        let mut report = PaddingReport::default();

        self.section.edit(|lines| {
            let mut cursor = 0;
            while let Some(extent) = next_extent(lines, cursor) {
                let range = match extent {
                    Extent::Orphan(end) => {
                        report.skipped.push(SkipReason::MissingLabel {
                            line: lines[end].number(),
                        });
                        cursor = end + 1;
                        continue;
                    }
                    Extent::Function(range) => range,
                };

                let mut body = lines[range.clone()].to_vec();
                match pad_function(&mut body, amount, dialect) {
                    Ok((function, returns)) => {
                        debug!("padded {} by {} bytes ({} returns)", function, amount, returns);
                        cursor = range.start + body.len();
                        lines.splice(range, body);
                        report.padded.push(function);
                    }
                    Err(reason) => {
                        debug!("rolled back stack padding: {:?}", reason);
                        cursor = range.end;
                        report.skipped.push(reason);
                    }
                }
            }
        });

        if report.padded.is_empty() && report.skipped.is_empty() {
            let line = self.section.span().start;
            report.skipped.push(SkipReason::MissingLabel { line });
        }
        report
    }
}

fn next_extent(lines: &[Line], from: usize) -> Option<Extent> {
    let start = (from..lines.len())
        .find(|&pos| lines[pos].is_function_label() || is_function_end(&lines[pos]))?;
    if is_function_end(&lines[start]) {
        return Some(Extent::Orphan(start));
    }
    let end = (start + 1..lines.len())
        .find(|&pos| is_function_end(&lines[pos]))
        .map_or(lines.len(), |pos| pos + 1);
    Some(Extent::Function(start..end))
}

/// Pads one function body starting at its label. Any `Err` means the caller discards `body`.
fn pad_function(
    body: &mut Vec<Line>,
    amount: u64,
    dialect: Dialect,
) -> Result<(String, usize), SkipReason> {
    let function = body
        .first()
        .and_then(Line::label)
        .unwrap_or_default()
        .to_string();

    if dialect == Dialect::Gcc && !body.last().is_some_and(is_function_end) {
        return Err(SkipReason::Truncated { function });
    }

    expand_leave(body);

    let Some(push) = seek(body, 0, is_frame_push) else {
        return Err(SkipReason::MissingPrologue { function });
    };
    insert_after(body, push, format!("\tsubq ${amount}, %rsp"));

    let epilogue = format!("\taddq ${amount}, %rsp");
    let mut cursor = push + 2;
    let mut returns = 0;
    while let Some(ret) = seek(body, cursor, is_return) {
        let Some(pop) = (cursor..ret).rev().find(|&pos| is_frame_pop(&body[pos])) else {
            return Err(SkipReason::MissingEpilogue {
                function,
                ret_line: body[ret].number(),
            });
        };
        insert_before(body, pop, epilogue.clone());
        returns += 1;
        cursor = ret + 2;
    }

    let unpatched = (push..body.len())
        .take_while(|&pos| !is_function_end(&body[pos]))
        .find(|&pos| is_frame_pop(&body[pos]) && body[pos - 1].content() != epilogue);
    if let Some(pop) = unpatched {
        return Err(SkipReason::UnpatchedEpilogue {
            function,
            pop_line: body[pop].number(),
        });
    }

    Ok((function, returns))
}

/// Forward scan that stops at the function end.
fn seek(lines: &[Line], from: usize, pred: impl Fn(&Line) -> bool) -> Option<usize> {
    for (pos, line) in lines.iter().enumerate().skip(from) {
        if pred(line) {
            return Some(pos);
        }
        if is_function_end(line) {
            return None;
        }
    }
    None
}

/// Rewrites `leave` into `movq %rbp, %rsp` + `popq %rbp` so epilogues are explicit.
fn expand_leave(lines: &mut Vec<Line>) {
    let mut pos = 0;
    while pos < lines.len() {
        if matches!(lines[pos].mnemonic(), Some("leave" | "leaveq")) {
            lines[pos] = Line::new("\tmovq %rbp, %rsp", lines[pos].number());
            insert_after(lines, pos, "\tpopq %rbp".to_string());
            pos += 1;
        }
        pos += 1;
    }
}

fn is_function_end(line: &Line) -> bool {
    line.content().trim() == FUNCTION_END
}

fn is_frame_push(line: &Line) -> bool {
    line.to_statement()
        .is_ok_and(|stmt| stmt.mnemonic() == "pushq" && stmt.rest().starts_with("%rbp"))
}

fn is_frame_pop(line: &Line) -> bool {
    line.to_statement()
        .is_ok_and(|stmt| stmt.mnemonic() == "popq" && stmt.first_operand() == Some("%rbp"))
}

/// `ret`, `retq`, and the `rep ret` / `repz ret` spellings used to dodge branch predictor stalls.
fn is_return(line: &Line) -> bool {
    let Ok(stmt) = line.to_statement() else {
        return false;
    };
    match stmt.mnemonic() {
        "ret" | "retq" => true,
        "rep" | "repz" => matches!(stmt.first_operand(), Some("ret" | "retq")),
        _ => false,
    }
}
