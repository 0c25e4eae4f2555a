//! Configuration bundle supplied by the benchmarking pipeline.

use crate::{Error, Result};
use asmrand_core::DataSegment;
use asmrand_core::assembler::DEFAULT_ASSEMBLER;
use asmrand_core::seed::Seed;
use serde::{Deserialize, Serialize};

/// Environment variable holding the wrapper configuration as a JSON object.
pub const RANDOMIZATION_ENV: &str = "RANDOMIZATION";

/// Largest padding bound. Sampled amounts stay below it, so they fit the sign-extended 32-bit
/// immediate of `addq`/`subq`.
pub const MAX_PADDING_BOUND: u64 = 1 << 31;

/// Which transforms run and with what parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomizationConfig {
    /// 0: don't randomize, > 0: pad allocation sizes by an amount in `[0, heap)`
    pub heap: u64,
    /// 0: don't randomize, > 0: pad stack frames by an amount in `[0, stack)`
    pub stack: u64,
    /// Shuffle the bss sub-segments
    pub bss: bool,
    /// Shuffle the data sub-segments
    pub data: bool,
    /// Shuffle the rodata sub-segments
    pub rodata: bool,
    /// Reorder the sections of the file
    pub file_structure: bool,
}

impl RandomizationConfig {
    /// True when at least one transform is enabled.
    pub fn is_active(&self) -> bool {
        self.heap > 0
            || self.stack > 0
            || self.bss
            || self.data
            || self.rodata
            || self.file_structure
    }

    /// Rejects padding bounds the assembler could not encode.
    pub fn validate(&self) -> Result<()> {
        for (field, bound) in [("heap", self.heap), ("stack", self.stack)] {
            if bound > MAX_PADDING_BOUND {
                return Err(Error::PaddingBoundTooLarge {
                    field,
                    bound,
                    max: MAX_PADDING_BOUND,
                });
            }
        }
        Ok(())
    }

    /// Enabled sub-segment shuffles, in bss, data, rodata order.
    pub fn segments(&self) -> Vec<DataSegment> {
        DataSegment::ALL
            .into_iter()
            .filter(|segment| match segment {
                DataSegment::Bss => self.bss,
                DataSegment::Data => self.data,
                DataSegment::Rodata => self.rodata,
            })
            .collect()
    }

    /// The same configuration with file structure randomization switched off.
    pub fn without_file_structure(&self) -> Self {
        Self {
            file_structure: false,
            ..self.clone()
        }
    }
}

/// Everything the assembler wrapper reads from [`RANDOMIZATION_ENV`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    #[serde(flatten)]
    pub randomization: RandomizationConfig,
    /// Assembler that is actually run.
    pub used_as: String,
    /// Hex seed for reproducible runs; a fresh one is generated when absent.
    pub seed: Option<String>,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            randomization: RandomizationConfig::default(),
            used_as: DEFAULT_ASSEMBLER.to_string(),
            seed: None,
        }
    }
}

impl WrapperConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.randomization.validate()?;
        Ok(config)
    }

    /// Reads [`RANDOMIZATION_ENV`], falling back to defaults when it is unset or blank.
    pub fn from_env() -> Result<Self> {
        match std::env::var(RANDOMIZATION_ENV) {
            Ok(json) if !json.trim().is_empty() => Self::from_json(&json),
            _ => Ok(Self::default()),
        }
    }

    /// The configured seed, or a freshly generated one.
    pub fn seed(&self) -> Result<Seed> {
        match &self.seed {
            Some(hex) => Ok(hex.parse::<Seed>()?),
            None => Ok(Seed::generate()),
        }
    }
}
