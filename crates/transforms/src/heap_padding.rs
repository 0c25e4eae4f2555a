//! Heap layout randomization.
//!
//! Every call to an allocation entry point gets its requested size increased by a random amount,
//! so the allocator hands out differently placed chunks from run to run:
//! ```assembly
//! // before
//! movl    $16, %edi
//! call    malloc@PLT
//!
//! // after
//! movl    $16, %edi
//! addq    $37, %rdi
//! call    malloc@PLT
//! ```

use crate::{Result, Transform};
use asmrand_core::{AssemblyFile, PointerWidth};
use rand::rngs::StdRng;
use tracing::debug;

pub struct HeapPadding {
    bound: u64,
    width: PointerWidth,
}

impl HeapPadding {
    /// Pads by amounts in `[0, bound)` on the host's pointer width.
    pub fn new(bound: u64) -> Self {
        Self::with_width(bound, PointerWidth::host())
    }

    pub fn with_width(bound: u64, width: PointerWidth) -> Self {
        Self { bound, width }
    }
}

impl Transform for HeapPadding {
    fn name(&self) -> &'static str {
        "HeapPadding"
    }

    fn apply(&self, asm: &mut AssemblyFile, rng: &mut StdRng) -> Result<bool> {
        let padded = asm.randomize_malloc_calls(0..self.bound, self.width, rng);
        debug!("Padded {} allocation calls (bound {})", padded, self.bound);
        Ok(padded > 0)
    }
}
