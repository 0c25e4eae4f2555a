use crate::{Result, Transform};
use asmrand_core::{AssemblyFile, DataSegment};
use rand::rngs::StdRng;
use tracing::debug;

/// Shuffles the label-delimited objects inside one data segment.
pub struct SegmentShuffle {
    segment: DataSegment,
}

impl SegmentShuffle {
    pub fn new(segment: DataSegment) -> Self {
        Self { segment }
    }
}

impl Transform for SegmentShuffle {
    fn name(&self) -> &'static str {
        match self.segment {
            DataSegment::Bss => "BssShuffle",
            DataSegment::Data => "DataShuffle",
            DataSegment::Rodata => "RodataShuffle",
        }
    }

    fn apply(&self, asm: &mut AssemblyFile, rng: &mut StdRng) -> Result<bool> {
        let shuffled = asm.randomize_sub_segments(self.segment, rng);
        debug!("Shuffled {} .{} extents", shuffled, self.segment);
        Ok(shuffled > 0)
    }
}
