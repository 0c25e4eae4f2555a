use crate::{Result, Transform};
use asmrand_core::AssemblyFile;
use rand::rngs::StdRng;
use tracing::debug;

/// Grows each function's stack frame by a random amount in `[0, bound)`.
pub struct StackPadding {
    bound: u64,
}

impl StackPadding {
    pub fn new(bound: u64) -> Self {
        Self { bound }
    }
}

impl Transform for StackPadding {
    fn name(&self) -> &'static str {
        "StackPadding"
    }

    fn apply(&self, asm: &mut AssemblyFile, rng: &mut StdRng) -> Result<bool> {
        let report = asm.randomize_stack(0..self.bound, rng);
        for skipped in &report.skipped {
            debug!("Skipped stack padding: {:?}", skipped);
        }
        debug!(
            "Padded {} functions, skipped {}",
            report.padded.len(),
            report.skipped.len()
        );
        Ok(!report.padded.is_empty())
    }
}
