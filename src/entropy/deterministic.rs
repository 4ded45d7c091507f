//! Reproducible entropy stream.
//!
//! Expands a 32-byte seed with BLAKE3 in XOF mode. Intended for tests and for
//! replaying a simulated run; never use it to key a real deployment.

use blake3::OutputReader;
use super::{EntropyError, EntropySource};

const CONTEXT: &str = "secagg-engine 2024 deterministic entropy";

/// Deterministic source: the same seed always yields the same byte stream.
pub struct DeterministicSource {
    reader: OutputReader,
}

impl DeterministicSource {
    /// Creates a stream from `seed`.
    pub fn new(seed: &[u8]) -> Self {
        let key = blake3::derive_key(CONTEXT, seed);
        Self {
            reader: blake3::Hasher::new_keyed(&key).finalize_xof(),
        }
    }

    /// Convenience constructor for tests: a stream labelled by a small integer.
    pub fn from_u64(label: u64) -> Self {
        Self::new(&label.to_le_bytes())
    }
}

impl EntropySource for DeterministicSource {
    fn name(&self) -> &'static str {
        "Deterministic"
    }

    fn fill(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        self.reader.fill(dest);
        Ok(())
    }
}
