// SPDX-License-Identifier: Apache-2.0

//! Path to fixed-width store key translation.
//!
//! LMDB bounds the key size, so paths are stored under a 32 byte digest of
//! their OS-string bytes. Digests of hot paths are kept in a small idle-expiring
//! cache; a miss only costs a rehash.

use std::path::{Path, PathBuf};
use std::time::Duration;

use moka::sync::Cache;
use sha2::{Digest, Sha256, Sha512_256};

/// Length in bytes of a store key
pub const PATH_KEY_LEN: usize = 32;

/// Fixed-width store key for a path
pub type PathKey = [u8; PATH_KEY_LEN];

/// Digest used to derive store keys from paths.
///
/// Changing the algorithm of an existing store orphans every stored offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-512 truncated to 256 bits
    Sha512_256,
}

impl DigestAlgorithm {
    pub fn digest(&self, path: &Path) -> PathKey {
        let bytes = path.as_os_str().as_encoded_bytes();
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(bytes).into(),
            DigestAlgorithm::Sha512_256 => Sha512_256::digest(bytes).into(),
        }
    }
}

/// Cache-backed provider of store keys
pub struct KeyHashProvider {
    algorithm: DigestAlgorithm,
    cache: Cache<PathBuf, PathKey>,
}

impl KeyHashProvider {
    pub fn new(algorithm: DigestAlgorithm, capacity: u64, idle_expiry: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(idle_expiry)
            .build();
        Self { algorithm, cache }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Get the store key for `path`, hashing it on a cache miss.
    pub fn key(&self, path: &Path) -> PathKey {
        self.cache.get_with_by_ref(path, || self.algorithm.digest(path))
    }
}

impl Default for KeyHashProvider {
    fn default() -> Self {
        Self::new(DigestAlgorithm::Sha256, 512, Duration::from_secs(5 * 60))
    }
}

impl std::fmt::Debug for KeyHashProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHashProvider")
            .field("algorithm", &self.algorithm)
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}
