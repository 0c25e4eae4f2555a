//! Applies the configured transforms to one assembly file.

use crate::Result;
use crate::Transform;
use crate::config::RandomizationConfig;
use crate::file_structure::FileStructure;
use crate::heap_padding::HeapPadding;
use crate::pass::{DefaultPass, Pass};
use crate::segment_shuffle::SegmentShuffle;
use crate::stack_padding::StackPadding;
use asmrand_core::assembler::{read_source, write_source};
use asmrand_core::{AssemblyFile, PointerWidth, StructureMode};
use rand::rngs::StdRng;
use std::path::Path;

/// Turns a [`RandomizationConfig`] into an ordered transform pipeline.
#[derive(Debug, Clone)]
pub struct AssemblyProcessor {
    config: RandomizationConfig,
    pointer_width: PointerWidth,
}

impl AssemblyProcessor {
    pub fn new(config: RandomizationConfig) -> Self {
        Self {
            config,
            pointer_width: PointerWidth::host(),
        }
    }

    pub fn with_pointer_width(mut self, width: PointerWidth) -> Self {
        self.pointer_width = width;
        self
    }

    pub fn config(&self) -> &RandomizationConfig {
        &self.config
    }

    /// Enabled transforms in application order: file structure, heap, stack, bss, data, rodata.
    ///
    /// Each transform re-scans the file from scratch, so the order only decides which layout the
    /// later ones see.
    pub fn transforms(&self, mode: StructureMode) -> Vec<Box<dyn Transform>> {
        let mut transforms: Vec<Box<dyn Transform>> = Vec::new();
        if self.config.file_structure {
            transforms.push(Box::new(FileStructure::new(mode)));
        }
        if self.config.heap > 0 {
            transforms.push(Box::new(HeapPadding::with_width(
                self.config.heap,
                self.pointer_width,
            )));
        }
        if self.config.stack > 0 {
            transforms.push(Box::new(StackPadding::new(self.config.stack)));
        }
        for segment in self.config.segments() {
            transforms.push(Box::new(SegmentShuffle::new(segment)));
        }
        transforms
    }

    /// Randomizes `text`. Returns `None` without parsing when every transform is disabled.
    pub fn process_text(
        &self,
        text: &str,
        mode: StructureMode,
        rng: &mut StdRng,
    ) -> Result<Option<String>> {
        if !self.config.is_active() {
            return Ok(None);
        }
        self.config.validate()?;
        let mut asm = AssemblyFile::parse(text)?;
        let applied = DefaultPass.run(&mut asm, &self.transforms(mode), rng)?;
        tracing::debug!("Applied transforms: {:?}", applied);
        Ok(Some(asm.render()))
    }

    /// Randomizes the file at `path` in place. Returns whether the file was rewritten.
    pub fn process_file(&self, path: &Path, mode: StructureMode, rng: &mut StdRng) -> Result<bool> {
        if !self.config.is_active() {
            return Ok(false);
        }
        let text = read_source(path)?;
        match self.process_text(&text, mode, rng)? {
            Some(randomized) => {
                write_source(path, &randomized)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
