//! Runs of lines between structural boundaries and the in-place transforms that work on them.

mod function;

pub use function::{FunctionSection, PaddingReport, STACK_ALIGNMENT, SkipReason};

use crate::dialect::Dialect;
use crate::line::Line;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use tracing::debug;

/// Call targets whose requested size is padded. `realloc` is not supported.
pub const ALLOCATION_ENTRY_POINTS: [&str; 4] = ["malloc", "_Znwm", "_Znam", "calloc"];

/// Data segments whose label-delimited sub-runs can be shuffled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSegment {
    Bss,
    Data,
    Rodata,
}

impl DataSegment {
    pub const ALL: [DataSegment; 3] = [DataSegment::Bss, DataSegment::Data, DataSegment::Rodata];

    pub fn name(self) -> &'static str {
        match self {
            DataSegment::Bss => "bss",
            DataSegment::Data => "data",
            DataSegment::Rodata => "rodata",
        }
    }

    /// `.data`, `.section data` and `.section .data` all open the data segment.
    fn is_opened_by(self, line: &Line) -> bool {
        if !line.is_statement() {
            return false;
        }
        let name = self.name();
        let normalized = line.normalized();
        normalized.starts_with(&format!(".{name}"))
            || normalized.starts_with(&format!(".section {name}"))
            || normalized.starts_with(&format!(".section .{name}"))
    }
}

impl fmt::Display for DataSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Width of pointers, deciding which first-argument register the heap padding adjusts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    /// Pointer width of the machine running the wrapper.
    pub fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            PointerWidth::Bits64
        } else {
            PointerWidth::Bits32
        }
    }

    /// Instruction adding `amount` to the first argument register.
    pub fn size_adjustment(self, amount: u64) -> String {
        match self {
            PointerWidth::Bits64 => format!("\taddq ${amount}, %rdi"),
            PointerWidth::Bits32 => format!("\tadd ${amount}, %edi"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    /// Data, directives or boilerplate.
    Plain,
    /// Holds a function label or a dialect begin marker.
    Function,
}

/// An ordered, contiguous run of lines of an assembly file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    kind: SectionKind,
    dialect: Dialect,
    lines: Vec<Line>,
}

impl Section {
    /// Wraps `lines`, promoting the section to a function section when it holds a function label
    /// or a begin marker of `dialect`.
    pub fn from_lines(lines: Vec<Line>, dialect: Dialect) -> Self {
        let is_function = lines
            .iter()
            .any(|line| line.is_function_label() || dialect.is_function_marker(line));
        let kind = if is_function {
            SectionKind::Function
        } else {
            SectionKind::Plain
        };
        Self {
            kind,
            dialect,
            lines,
        }
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    pub fn is_function(&self) -> bool {
        self.kind == SectionKind::Function
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line numbers covered by this section, based on the last renumbering.
    pub fn span(&self) -> Range<usize> {
        match (self.lines.first(), self.lines.last()) {
            (Some(first), Some(last)) => first.number()..last.number() + 1,
            _ => 0..0,
        }
    }

    /// Does the first non-blank line of this section open a segment?
    pub fn starts_with_segment_statement(&self) -> bool {
        self.lines
            .iter()
            .find(|line| !line.is_blank())
            .is_some_and(Line::is_segment_statement)
    }

    /// Function view of this section, if it was promoted to one.
    pub fn as_function_mut(&mut self) -> Option<FunctionSection<'_>> {
        if self.is_function() {
            Some(FunctionSection::new(self))
        } else {
            None
        }
    }

    /// Assigns dense numbers starting at `start` and returns the number after the last line.
    pub fn renumber(&mut self, start: usize) -> usize {
        for (offset, line) in self.lines.iter_mut().enumerate() {
            line.set_number(start + offset);
        }
        start + self.lines.len()
    }

    /// Serialized text, without `.loc` directives.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .filter(|line| !line.starts_with(".loc "))
            .map(Line::content)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Shuffles the label-delimited sub-runs of every `segment` extent in this section.
    ///
    /// An extent runs from the directive opening the segment up to the next section boundary or
    /// the end of the section. Sub-runs are moved as a whole; the directive itself stays first.
    /// Returns the number of extents that had more than one sub-run.
    pub fn randomize_segment<R: Rng + ?Sized>(&mut self, segment: DataSegment, rng: &mut R) -> usize {
        self.edit(|lines| {
            let mut shuffled = 0;
            let mut cursor = 0;
            while let Some(start) = position_from(lines, cursor, |line| segment.is_opened_by(line)) {
                let end = position_from(lines, start + 1, Line::is_section_boundary)
                    .unwrap_or(lines.len());

                let mut runs = split_sub_runs(&lines[start + 1..end]);
                if runs.len() > 1 {
                    runs.shuffle(&mut *rng);
                    debug!(
                        "shuffled {} sub-runs of .{} at line {}",
                        runs.len(),
                        segment,
                        lines[start].number()
                    );
                    lines.splice(start + 1..end, runs.into_iter().flatten());
                    shuffled += 1;
                }
                cursor = end;
            }
            shuffled
        })
    }

    /// Inserts a first-argument increase, sampled from `padding`, before every call to a known
    /// allocation entry point. Returns the number of padded call sites.
    pub fn randomize_malloc_calls<R: Rng + ?Sized>(
        &mut self,
        padding: Range<u64>,
        width: PointerWidth,
        rng: &mut R,
    ) -> usize {
        if padding.is_empty() {
            return 0;
        }
        let calls: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_allocation_call(line))
            .map(|(pos, _)| pos)
            .collect();
        if calls.is_empty() {
            return 0;
        }

        self.edit(|lines| {
            for &pos in calls.iter().rev() {
                let amount = rng.random_range(padding.clone());
                debug!("padding allocation at line {} by {}", lines[pos].number(), amount);
                insert_before(lines, pos, width.size_adjustment(amount));
            }
        });
        calls.len()
    }

    /// Runs a structural edit and renumbers the lines once afterwards, keeping the section's
    /// first number.
    fn edit<T>(&mut self, f: impl FnOnce(&mut Vec<Line>) -> T) -> T {
        let start = self.lines.first().map_or(0, Line::number);
        let out = f(&mut self.lines);
        self.renumber(start);
        out
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// First position at or after `from` whose line satisfies `pred`.
fn position_from(lines: &[Line], from: usize, pred: impl Fn(&Line) -> bool) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .find_map(|(pos, line)| pred(line).then_some(pos))
}

fn insert_before(lines: &mut Vec<Line>, pos: usize, content: String) {
    lines.insert(pos, Line::new(content, pos));
}

fn insert_after(lines: &mut Vec<Line>, pos: usize, content: String) {
    lines.insert(pos + 1, Line::new(content, pos + 1));
}

/// Groups lines into runs that each start at a label; the first run may lack one.
fn split_sub_runs(lines: &[Line]) -> Vec<Vec<Line>> {
    let mut runs: Vec<Vec<Line>> = Vec::new();
    for line in lines {
        match runs.last_mut() {
            Some(run) if !line.is_label() => run.push(line.clone()),
            _ => runs.push(vec![line.clone()]),
        }
    }
    runs
}

/// `call malloc`, `callq _Znwm`, `call calloc@PLT`, …
fn is_allocation_call(line: &Line) -> bool {
    let Ok(statement) = line.to_statement() else {
        return false;
    };
    if !matches!(statement.mnemonic(), "call" | "callq") {
        return false;
    }
    statement
        .first_operand()
        .and_then(|target| target.split('@').next())
        .is_some_and(|target| ALLOCATION_ENTRY_POINTS.contains(&target))
}
