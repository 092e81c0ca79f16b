// SPDX-License-Identifier: Apache-2.0

//! Configuration for the stateful tailer.

use std::time::Duration;

use crate::tail::engine::{
    DEFAULT_MAX_RECORD_SIZE, DEFAULT_READ_CHUNK_SIZE, PersistPolicy, ReadOptions,
};
use crate::tail::handle_cache::{DEFAULT_HANDLE_CAPACITY, DEFAULT_HANDLE_IDLE_EXPIRY};
use crate::tail::persistence::{DigestAlgorithm, LmdbOptions};

/// Configuration for the tailer
#[derive(Debug, Clone)]
pub struct TailConfig {
    /// Bytes requested from a file per read
    pub read_chunk_size: usize,
    /// Maximum record size in bytes, longer lines are cut
    pub max_record_size: usize,
    /// Maximum number of open handles kept in the cache
    pub handle_cache_capacity: u64,
    /// Idle time after which a cached handle is closed
    pub handle_idle_expiry: Duration,
    /// LMDB map size in bytes
    pub store_map_size: usize,
    /// LMDB maximum number of named databases
    pub store_max_dbs: u32,
    /// Number of path digests kept in memory
    pub key_cache_capacity: u64,
    /// Idle time after which a cached path digest is dropped
    pub key_cache_idle_expiry: Duration,
    /// Digest used to derive store keys from paths
    pub digest: DigestAlgorithm,
    /// When read progress is written to the store
    pub persist_policy: PersistPolicy,
}

impl Default for TailConfig {
    fn default() -> Self {
        let lmdb = LmdbOptions::default();
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            handle_cache_capacity: DEFAULT_HANDLE_CAPACITY,
            handle_idle_expiry: DEFAULT_HANDLE_IDLE_EXPIRY,
            store_map_size: lmdb.map_size,
            store_max_dbs: lmdb.max_dbs,
            key_cache_capacity: lmdb.key_cache_capacity,
            key_cache_idle_expiry: lmdb.key_cache_idle_expiry,
            digest: lmdb.digest,
            persist_policy: PersistPolicy::PerPass,
        }
    }
}

impl TailConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.read_chunk_size == 0 {
            return Err("Read chunk size must be greater than zero".to_string());
        }

        if self.max_record_size == 0 {
            return Err("Maximum record size must be at least one byte".to_string());
        }

        if self.handle_cache_capacity == 0 {
            return Err("Handle cache capacity must be greater than zero".to_string());
        }

        if self.handle_idle_expiry.is_zero() {
            return Err("Handle idle expiry must be greater than zero".to_string());
        }

        if self.store_map_size == 0 {
            return Err("Store map size must be greater than zero".to_string());
        }

        if self.store_max_dbs < 2 {
            return Err(format!(
                "Store needs at least 2 named databases, got {}",
                self.store_max_dbs
            ));
        }

        if self.key_cache_capacity == 0 {
            return Err("Key cache capacity must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Options for opening the durable offset store
    pub fn lmdb_options(&self) -> LmdbOptions {
        LmdbOptions {
            map_size: self.store_map_size,
            max_dbs: self.store_max_dbs,
            digest: self.digest,
            key_cache_capacity: self.key_cache_capacity,
            key_cache_idle_expiry: self.key_cache_idle_expiry,
        }
    }

    /// Options for each read pass
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            read_chunk_size: self.read_chunk_size,
            max_record_size: self.max_record_size,
            persist_policy: self.persist_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TailConfig::default();
        assert_eq!(config.read_chunk_size, 32 * 1024);
        assert_eq!(config.max_record_size, 1024 * 1024);
        assert_eq!(config.handle_cache_capacity, 512);
        assert_eq!(config.handle_idle_expiry, Duration::from_secs(300));
        assert_eq!(config.store_map_size, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.store_max_dbs, 2);
        assert_eq!(config.digest, DigestAlgorithm::Sha256);
        assert_eq!(config.persist_policy, PersistPolicy::PerPass);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = TailConfig {
            read_chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TailConfig {
            max_record_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TailConfig {
            handle_cache_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TailConfig {
            store_map_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_too_few_dbs() {
        let config = TailConfig {
            store_max_dbs: 1,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("at least 2"));
    }

    #[test]
    fn test_derived_options() {
        let config = TailConfig {
            read_chunk_size: 128,
            max_record_size: 64,
            persist_policy: PersistPolicy::PerRecord,
            digest: DigestAlgorithm::Sha512_256,
            store_map_size: 1 << 20,
            ..Default::default()
        };

        let read = config.read_options();
        assert_eq!(read.read_chunk_size, 128);
        assert_eq!(read.max_record_size, 64);
        assert_eq!(read.persist_policy, PersistPolicy::PerRecord);

        let lmdb = config.lmdb_options();
        assert_eq!(lmdb.map_size, 1 << 20);
        assert_eq!(lmdb.max_dbs, 2);
        assert_eq!(lmdb.digest, DigestAlgorithm::Sha512_256);
    }
}
