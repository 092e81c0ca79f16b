// SPDX-License-Identifier: Apache-2.0

//! Persistence of per-file read offsets.
//!
//! Offsets are stored in an LMDB environment keyed by a fixed-width digest of
//! the file path, so a restart resumes from the last durable offset. An
//! in-memory store with the same interface backs tests and no-persistence mode.

mod key_hash;
mod lmdb;
mod memory;
mod store;

pub use key_hash::{DigestAlgorithm, KeyHashProvider, PATH_KEY_LEN, PathKey};
pub use lmdb::{
    LmdbOffsetStore, LmdbOptions, STATE_DB_NAME, STORE_VERSION, VERSION_DB_NAME, VERSION_KEY,
};
pub use memory::InMemoryOffsetStore;
pub use store::OffsetStore;
