// SPDX-License-Identifier: Apache-2.0

//! Stateful tailing of growing, rotating and truncating log files.
//!
//! This module provides:
//! - A bounded, idle-expiring cache of open read handles that never closes a
//!   handle while a read pass holds it
//! - A durable offset store (LMDB) keyed by a digest of the file path, plus a
//!   volatile in-memory variant
//! - A tail engine that turns lifecycle events into read passes, framing
//!   newline-delimited records with exact byte offsets
//!
//! An external watcher reports lifecycle events; downstream delivery of records
//! is up to the [`RecordConsumer`].

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod handle_cache;
pub mod persistence;
pub mod reader;
pub mod record;

pub use config::TailConfig;
pub use dispatch::WorkerPool;
pub use engine::{PassSummary, PersistPolicy, ReadOptions, TailEngine};
pub use error::{Error, Result};
pub use event::{EventKind, LifecycleEvent};
pub use handle_cache::{EvictionAction, FileHandle, HandleCache, HandleCacheStats, HandleLease};
pub use persistence::{DigestAlgorithm, InMemoryOffsetStore, LmdbOffsetStore, OffsetStore};
pub use reader::StatefulReader;
pub use record::{FileRecord, RecordConsumer};
