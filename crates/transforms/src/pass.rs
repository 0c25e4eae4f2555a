use crate::Result;
use crate::Transform;
use asmrand_core::AssemblyFile;
use rand::rngs::StdRng;
use tracing::info;

/// Trait for running a sequence of transforms on an assembly file.
pub trait Pass {
    /// Runs `passes` in order and returns the names of those that changed the file.
    fn run(
        &self,
        asm: &mut AssemblyFile,
        passes: &[Box<dyn Transform>],
        rng: &mut StdRng,
    ) -> Result<Vec<&'static str>>;
}

/// Default implementation of the Pass trait.
pub struct DefaultPass;

impl Pass for DefaultPass {
    fn run(
        &self,
        asm: &mut AssemblyFile,
        passes: &[Box<dyn Transform>],
        rng: &mut StdRng,
    ) -> Result<Vec<&'static str>> {
        let mut applied = Vec::new();

        for pass in passes {
            let before = asm.line_count();
            let mut snapshot = asm.clone();

            let mutated = pass.apply(&mut snapshot, rng)?;
            if !mutated {
                continue;
            }

            let delta = snapshot.line_count() as i64 - before as i64;
            info!("{:>14} Δ{:+} lines", pass.name(), delta);
            *asm = snapshot;
            applied.push(pass.name());
        }
        Ok(applied)
    }
}
