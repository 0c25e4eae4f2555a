use crate::Result;
use crate::Transform;
use asmrand_core::{AssemblyFile, StructureMode};
use rand::rngs::StdRng;
use tracing::debug;

/// Reorders whole sections, leaving the pinned ones in place.
pub struct FileStructure {
    mode: StructureMode,
}

impl FileStructure {
    pub fn new(mode: StructureMode) -> Self {
        Self { mode }
    }
}

impl Transform for FileStructure {
    fn name(&self) -> &'static str {
        "FileStructure"
    }

    fn apply(&self, asm: &mut AssemblyFile, rng: &mut StdRng) -> Result<bool> {
        let before: Vec<usize> = asm.sections().iter().map(|s| s.span().start).collect();
        debug!("Original section order (by first line): {:?}", before);

        let changed = asm.randomize_file_structure(self.mode, rng);
        if !changed {
            debug!("Section order unchanged ({:?})", self.mode);
        }
        Ok(changed)
    }
}
