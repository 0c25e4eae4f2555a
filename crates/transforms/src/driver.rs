//! Assemble-verify-retry loop around the real assembler.
//!
//! Randomized assembly is only kept if the assembler accepts it. Each attempt starts from the
//! pristine source; rejected attempts are rolled back before the next one:
//!
//! 1. strict: all configured transforms, full file structure shuffle
//! 2. relaxed: file structure limited to swapping neighbouring sections
//! 3. fallback: only when file structure randomization was on, which is then switched off
//! 4. the unmodified source, whose rejection is fatal

use crate::config::RandomizationConfig;
use crate::processor::AssemblyProcessor;
use crate::{Error, Result};
use asmrand_core::assembler::{Assembler, Invocation, Rejection, read_source, write_source};
use asmrand_core::{PointerWidth, StructureMode};
use rand::rngs::StdRng;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Number of attempts per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub strict: usize,
    pub relaxed: usize,
    pub fallback: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strict: 2,
            relaxed: 6,
            fallback: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Strict,
    Relaxed,
    Fallback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Strict => f.write_str("strict"),
            Phase::Relaxed => f.write_str("relaxed"),
            Phase::Fallback => f.write_str("fallback"),
        }
    }
}

/// Which input the assembler finally accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A randomized source, produced in `phase` on its `attempt`-th try.
    Randomized { phase: Phase, attempt: usize },
    /// Only the original source assembled; randomization did not take effect.
    Unmodified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverReport {
    pub outcome: Outcome,
    /// Total number of assembler runs.
    pub attempts: usize,
}

struct PhasePlan {
    phase: Phase,
    attempts: usize,
    config: RandomizationConfig,
    mode: StructureMode,
}

/// Drives one assembler invocation through the retry phases.
pub struct AssemblyDriver<A> {
    config: RandomizationConfig,
    assembler: A,
    policy: RetryPolicy,
    pointer_width: PointerWidth,
    rng: StdRng,
}

impl<A: Assembler> AssemblyDriver<A> {
    /// `rng` is shared by every attempt, so retries never replay an earlier mutation.
    pub fn new(config: RandomizationConfig, assembler: A, rng: StdRng) -> Self {
        Self {
            config,
            assembler,
            policy: RetryPolicy::default(),
            pointer_width: PointerWidth::host(),
            rng,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pointer_width(mut self, width: PointerWidth) -> Self {
        self.pointer_width = width;
        self
    }

    pub fn assembler(&self) -> &A {
        &self.assembler
    }

    /// Randomizes and assembles the invocation's source file.
    ///
    /// On success the source holds the accepted text; on every other exit path it is restored to
    /// its original content.
    pub fn run(&mut self, invocation: &Invocation) -> Result<DriverReport> {
        let source = invocation.source();
        let pristine = PristineSource::capture(&source)?;
        let mut attempts = 0;

        for plan in self.phases() {
            if plan.phase == Phase::Fallback {
                warn!("Disabled file structure randomization");
            }
            let processor =
                AssemblyProcessor::new(plan.config).with_pointer_width(self.pointer_width);

            for attempt in 1..=plan.attempts {
                processor.process_file(&source, plan.mode, &mut self.rng)?;
                attempts += 1;

                match self.assembler.assemble(invocation) {
                    Ok(()) => {
                        pristine.keep();
                        info!(
                            "Assembled {} ({} phase, attempt {})",
                            source.display(),
                            plan.phase,
                            attempt
                        );
                        return Ok(DriverReport {
                            outcome: Outcome::Randomized {
                                phase: plan.phase,
                                attempt,
                            },
                            attempts,
                        });
                    }
                    Err(rejection) => {
                        warn!(
                            "Assembler rejected {} phase attempt {}: {}",
                            plan.phase,
                            attempt,
                            rejection.stderr.trim()
                        );
                        pristine.restore()?;
                    }
                }
            }
        }

        attempts += 1;
        match self.assembler.assemble(invocation) {
            Ok(()) => {
                warn!("Randomization failed, assembled {} unmodified", source.display());
                Ok(DriverReport {
                    outcome: Outcome::Unmodified,
                    attempts,
                })
            }
            Err(Rejection { status, stderr }) => {
                error!("{}", stderr);
                Err(Error::AssemblerFailed {
                    attempts,
                    status,
                    stderr,
                })
            }
        }
    }

    fn phases(&self) -> Vec<PhasePlan> {
        let mut phases = vec![
            PhasePlan {
                phase: Phase::Strict,
                attempts: self.policy.strict,
                config: self.config.clone(),
                mode: StructureMode::Shuffle,
            },
            PhasePlan {
                phase: Phase::Relaxed,
                attempts: self.policy.relaxed,
                config: self.config.clone(),
                mode: StructureMode::SmallChanges,
            },
        ];
        if self.config.file_structure {
            phases.push(PhasePlan {
                phase: Phase::Fallback,
                attempts: self.policy.fallback,
                config: self.config.without_file_structure(),
                mode: StructureMode::Shuffle,
            });
        }
        phases
    }
}

/// Original source text, written back when dropped unless [`PristineSource::keep`] was called.
struct PristineSource {
    path: PathBuf,
    text: String,
    armed: bool,
}

impl PristineSource {
    fn capture(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            text: read_source(path)?,
            armed: true,
        })
    }

    fn restore(&self) -> Result<()> {
        Ok(write_source(&self.path, &self.text)?)
    }

    /// Leaves the current file content in place.
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PristineSource {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.restore() {
            error!("Could not restore {}: {}", self.path.display(), e);
        }
    }
}
