//! Fixed-output hash accumulator backing `openslide.quickhash-1`.
//!
//! The update ordering is part of the contract: a `Slide::open` must feed
//! the primary file GUID, then the file GUID, then the whole metadata XML,
//! in that order, for the hash to be reproducible across tools.

use sha2::{Digest, Sha256};

pub struct HashAccumulator {
    hasher: Sha256,
}

impl HashAccumulator {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update_bytes(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn update_string(&mut self, s: &str) {
        self.hasher.update(s.as_bytes());
        self.hasher.update([0u8]); // null terminator, matching the C contract
    }

    /// Finalize into a lowercase hex string. Consumes the accumulator since
    /// `Sha256::finalize` does.
    pub fn finish(self) -> String {
        let digest = self.hasher.finalize();
        hex_encode(&digest)
    }
}

impl Default for HashAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
