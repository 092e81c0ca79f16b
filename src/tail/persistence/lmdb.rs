// SPDX-License-Identifier: Apache-2.0

//! LMDB-backed offset store.
//!
//! The environment lives in a single directory and holds two named databases:
//! a version table with one reserved key, and the offset table keyed by the
//! path digest. Every write commits its own transaction before returning, so a
//! crash never loses an acknowledged offset. LMDB allows one writer at a time
//! alongside any number of readers.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use heed::byteorder::BigEndian;
use heed::types::{Bytes, I64, Str};
use heed::{Database, Env, EnvOpenOptions};
use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::tail::error::{Error, Result};
use crate::tail::persistence::key_hash::{DigestAlgorithm, KeyHashProvider};
use crate::tail::persistence::store::OffsetStore;

/// Name of the database holding path offsets
pub const STATE_DB_NAME: &str = "StateStore";

/// Name of the database holding the format version
pub const VERSION_DB_NAME: &str = "VersionStore";

/// Reserved key of the version record
pub const VERSION_KEY: &str = "StateStoreVersion";

/// Newest store format this build reads and writes
pub const STORE_VERSION: i64 = 1;

type OffsetDb = Database<Bytes, I64<BigEndian>>;
type VersionDb = Database<Str, I64<BigEndian>>;

/// Options fixed when the environment is opened
#[derive(Debug, Clone)]
pub struct LmdbOptions {
    /// Maximum size of the memory map, which bounds the store size
    pub map_size: usize,
    /// Maximum number of named databases
    pub max_dbs: u32,
    /// Digest used to derive keys from paths
    pub digest: DigestAlgorithm,
    /// Capacity of the path digest cache
    pub key_cache_capacity: u64,
    /// Idle expiry of the path digest cache
    pub key_cache_idle_expiry: Duration,
}

impl Default for LmdbOptions {
    fn default() -> Self {
        Self {
            // 2 GiB / (32 byte key + 8 byte value) leaves room for tens of millions of paths
            map_size: 2 * 1024 * 1024 * 1024,
            max_dbs: 2,
            digest: DigestAlgorithm::Sha256,
            key_cache_capacity: 512,
            key_cache_idle_expiry: Duration::from_secs(5 * 60),
        }
    }
}

struct OpenEnv {
    env: Env,
    offsets: OffsetDb,
    version: i64,
}

/// Durable offset store on top of an LMDB environment
pub struct LmdbOffsetStore {
    path: PathBuf,
    keys: KeyHashProvider,
    /// `None` once closed. Operations hold the read side for their whole
    /// transaction so `close` waits for them.
    inner: RwLock<Option<OpenEnv>>,
}

impl LmdbOffsetStore {
    /// Open or create a store in the directory `path`.
    pub fn open(path: impl AsRef<Path>, options: &LmdbOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per store and never through a
        // second handle in this process while the store is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.map_size)
                .max_dbs(options.max_dbs)
                .open(&path)?
        };

        let mut wtxn = env.write_txn()?;
        let versions: VersionDb = env.create_database(&mut wtxn, Some(VERSION_DB_NAME))?;
        let offsets: OffsetDb = env.create_database(&mut wtxn, Some(STATE_DB_NAME))?;

        let version = match versions.get(&wtxn, VERSION_KEY)? {
            Some(version) => {
                trace!(path = ?path, version, "Found existing offset store");
                version
            }
            None => {
                versions.put(&mut wtxn, VERSION_KEY, &STORE_VERSION)?;
                trace!(path = ?path, version = STORE_VERSION, "Created new offset store");
                STORE_VERSION
            }
        };

        if version > STORE_VERSION {
            return Err(Error::UnsupportedVersion {
                found: version,
                supported: STORE_VERSION,
            });
        }
        wtxn.commit()?;

        info!(
            path = ?path,
            version,
            map_size = options.map_size,
            digest = ?options.digest,
            "Opened offset store"
        );

        Ok(Self {
            path,
            keys: KeyHashProvider::new(
                options.digest,
                options.key_cache_capacity,
                options.key_cache_idle_expiry,
            ),
            inner: RwLock::new(Some(OpenEnv {
                env,
                offsets,
                version,
            })),
        })
    }

    /// Directory holding the environment
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format version recorded in the store
    pub fn version(&self) -> Result<i64> {
        let guard = self.inner.read();
        let open = guard.as_ref().ok_or(Error::StoreClosed)?;
        Ok(open.version)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }
}

impl OffsetStore for LmdbOffsetStore {
    fn get_offset(&self, path: &Path) -> Result<u64> {
        let guard = self.inner.read();
        let open = guard.as_ref().ok_or(Error::StoreClosed)?;
        let key = self.keys.key(path);

        let rtxn = open.env.read_txn()?;
        match open.offsets.get(&rtxn, &key[..])? {
            None => Ok(0),
            Some(offset) => u64::try_from(offset).map_err(|_| Error::CorruptOffset {
                path: path.to_path_buf(),
                offset,
            }),
        }
    }

    fn set_offset(&self, path: &Path, offset: u64) -> Result<()> {
        let value = i64::try_from(offset).map_err(|_| Error::OffsetOutOfRange {
            path: path.to_path_buf(),
            offset,
        })?;

        let guard = self.inner.read();
        let open = guard.as_ref().ok_or(Error::StoreClosed)?;
        let key = self.keys.key(path);

        let mut wtxn = open.env.write_txn()?;
        open.offsets.put(&mut wtxn, &key[..], &value)?;
        wtxn.commit()?;
        Ok(())
    }

    fn delete_offset(&self, path: &Path) -> Result<()> {
        let guard = self.inner.read();
        let open = guard.as_ref().ok_or(Error::StoreClosed)?;
        let key = self.keys.key(path);

        let mut wtxn = open.env.write_txn()?;
        let existed = open.offsets.delete(&mut wtxn, &key[..])?;
        wtxn.commit()?;
        if existed {
            trace!(path = ?path, "Deleted offset");
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let open = self.inner.write().take();
        if let Some(open) = open {
            open.env.prepare_for_closing().wait();
            debug!(path = ?self.path, "Closed offset store");
        }
        Ok(())
    }
}

impl Drop for LmdbOffsetStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
