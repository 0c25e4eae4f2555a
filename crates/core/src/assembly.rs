//! Whole-file model: ordered lines, dialect and section partition.

use crate::dialect::Dialect;
use crate::line::Line;
use crate::result::{Error, Result};
use crate::section::{DataSegment, PaddingReport, PointerWidth, Section};
use rand::Rng;
use rand::seq::SliceRandom;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// Comment placed between sections when rendering.
pub const SECTION_SEPARATOR: &str = "/****/";

/// How much the file structure randomization may move sections.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StructureMode {
    /// Any permutation of the movable sections.
    Shuffle,
    /// Movable sections are paired up and each pair is swapped with probability 1/2.
    SmallChanges,
}

/// An assembly file split into sections.
///
/// Every mutating method works on the sections in place; the concatenation of all section lines
/// is always the current line sequence of the file.
#[derive(Clone, Debug)]
pub struct AssemblyFile {
    dialect: Dialect,
    sections: Vec<Section>,
}

impl AssemblyFile {
    /// Builds the file from its lines, detecting the dialect.
    pub fn new<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<Line> = lines
            .into_iter()
            .enumerate()
            .map(|(number, content)| Line::new(content, number))
            .collect();
        let dialect = Dialect::detect(&lines)?;
        let sections = partition(dialect, lines);
        debug!("{:?} file with {} sections", dialect, sections.len());
        Ok(Self { dialect, sections })
    }

    /// Parses assembly text, dropping trailing whitespace from every line.
    pub fn parse(text: &str) -> Result<Self> {
        Self::new(text.lines().map(str::trim_end))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.render()).map_err(|source| Error::FileWrite {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// All lines in their current order.
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.sections.iter().flat_map(|section| section.lines())
    }

    pub fn line_count(&self) -> usize {
        self.sections.iter().map(Section::len).sum()
    }

    /// Appends lines and re-partitions the whole file with the dialect detected at construction.
    pub fn add_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all: Vec<Line> = self.lines().cloned().collect();
        all.extend(lines.into_iter().map(|content| Line::new(content, 0)));
        for (number, line) in all.iter_mut().enumerate() {
            line.set_number(number);
        }
        self.sections = partition(self.dialect, all);
    }

    /// Assigns dense 0-based numbers in the current order.
    pub fn renumber(&mut self) {
        let mut next = 0;
        for section in &mut self.sections {
            next = section.renumber(next);
        }
    }

    /// Reorders sections without touching their content.
    ///
    /// The first and last sections never move. gcc output additionally keeps the first section
    /// carrying `.cfi` directives in place. Returns whether the order changed.
    pub fn randomize_file_structure<R: Rng + ?Sized>(&mut self, mode: StructureMode, rng: &mut R) -> bool {
        let movable = self.movable_sections();
        if movable.len() < 2 {
            debug!("not enough movable sections ({})", movable.len());
            return false;
        }

        let mut order = movable.clone();
        match mode {
            StructureMode::Shuffle => order.shuffle(rng),
            StructureMode::SmallChanges => {
                for pair in order.chunks_exact_mut(2) {
                    if rng.random_bool(0.5) {
                        pair.swap(0, 1);
                    }
                }
            }
        }
        if order == movable {
            debug!("file structure randomization kept the original order");
            return false;
        }
        debug!("section order {:?} -> {:?}", movable, order);

        let mut taken: Vec<Option<Section>> = self.sections.drain(..).map(Some).collect();
        let mut arranged: Vec<Option<Section>> = (0..taken.len()).map(|_| None).collect();
        for (pos, slot) in arranged.iter_mut().enumerate() {
            if !movable.contains(&pos) {
                *slot = taken[pos].take();
            }
        }
        for (&target, &source) in movable.iter().zip(&order) {
            arranged[target] = taken[source].take();
        }
        self.sections = arranged.into_iter().flatten().collect();
        self.renumber();
        true
    }

    /// Pads every function section's stack frame by an amount sampled from `padding`, rounded
    /// down to [`STACK_ALIGNMENT`](crate::section::STACK_ALIGNMENT).
    pub fn randomize_stack<R: Rng + ?Sized>(&mut self, padding: Range<u64>, rng: &mut R) -> PaddingReport {
        let mut report = PaddingReport::default();
        if padding.is_empty() {
            return report;
        }
        for section in &mut self.sections {
            if let Some(mut function) = section.as_function_mut() {
                let amount = rng.random_range(padding.clone());
                report.merge(function.pad_stack(amount));
            }
        }
        self.renumber();
        report
    }

    /// Shuffles the sub-runs of `segment` in every section. Returns the number of shuffled extents.
    pub fn randomize_sub_segments<R: Rng + ?Sized>(&mut self, segment: DataSegment, rng: &mut R) -> usize {
        let shuffled: usize = self
            .sections
            .iter_mut()
            .map(|section| section.randomize_segment(segment, &mut *rng))
            .sum();
        self.renumber();
        shuffled
    }

    /// Pads the requested size of every allocation call. Returns the number of padded calls.
    pub fn randomize_malloc_calls<R: Rng + ?Sized>(
        &mut self,
        padding: Range<u64>,
        width: PointerWidth,
        rng: &mut R,
    ) -> usize {
        let padded: usize = self
            .sections
            .iter_mut()
            .map(|section| section.randomize_malloc_calls(padding.clone(), width, &mut *rng))
            .sum();
        self.renumber();
        padded
    }

    /// Sections joined by [`SECTION_SEPARATOR`] lines, `.loc` directives dropped.
    pub fn render(&self) -> String {
        let separator = format!("\n{SECTION_SEPARATOR}\n");
        let mut text = self
            .sections
            .iter()
            .map(Section::render)
            .collect::<Vec<_>>()
            .join(&separator);
        text.push('\n');
        text
    }

    /// Indices of the sections the file structure randomization may move.
    fn movable_sections(&self) -> Vec<usize> {
        let count = self.sections.len();
        if count < 3 {
            return Vec::new();
        }
        let pinned_cfi = self
            .dialect
            .pins_first_cfi_section()
            .then(|| {
                self.sections
                    .iter()
                    .position(|section| section.lines().iter().any(|line| line.starts_with(".cfi")))
            })
            .flatten();
        (1..count - 1)
            .filter(|&pos| Some(pos) != pinned_cfi)
            .collect()
    }
}

impl fmt::Display for AssemblyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Splits `lines` into sections at the dialect's boundaries, never producing empty sections.
fn partition(dialect: Dialect, lines: Vec<Line>) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Vec<Line> = Vec::new();
    for line in lines {
        if dialect.splits_before(&line) && !current.is_empty() {
            sections.push(Section::from_lines(std::mem::take(&mut current), dialect));
        }
        current.push(line);
    }
    if !current.is_empty() {
        sections.push(Section::from_lines(current, dialect));
    }
    sections
}
