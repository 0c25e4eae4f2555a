//! Reproducible randomness for a whole randomization run.
//!
//! A run draws every decision (section order, padding amounts, sub-run permutations, and the
//! values of each retry) from one generator derived from a [`Seed`]. Logging the seed and feeding
//! it back through `RANDOMIZATION`'s `seed` key or `--seed` replays the exact same layouts, which
//! is how a surprising benchmark result is traced back to the assembly that produced it.

use crate::result::Error;
use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;

/// Domain tag mixed into the generator seed, so the same bytes used elsewhere give a different
/// stream.
const RNG_DOMAIN: &[u8] = b"ASMRAND_LAYOUT_RANDOMIZATION";

/// 256 bits that fully determine one randomization run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed([u8; 32]);

impl Seed {
    /// Fresh seed from the thread-local generator, for runs that were not asked to replay.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parses 64 hex digits, optionally prefixed with `0x`, as printed by [`Seed::to_hex`].
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let digits = hex.strip_prefix("0x").unwrap_or(hex);
        if digits.len() != 64 {
            return Err(Error::InvalidSeedLength(digits.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| Error::InvalidSeedHex)?;
        Ok(Self(bytes))
    }

    /// `0x`-prefixed form accepted back by [`Seed::from_hex`].
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Generator shared by all transforms and retry attempts of one run.
    ///
    /// The SHA3 digest of the domain tag and the seed bytes seeds the generator, so equal seeds
    /// always yield equal streams and thus byte-identical output for the same input file.
    pub fn create_deterministic_rng(&self) -> StdRng {
        let digest = Sha3_256::new()
            .chain_update(RNG_DOMAIN)
            .chain_update(self.0)
            .finalize();
        StdRng::from_seed(digest.into())
    }
}

impl FromStr for Seed {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Seed").field(&self.to_hex()).finish()
    }
}
