// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Offset store error: {0}")]
    Store(#[from] heed::Error),

    #[error("Offset store is closed")]
    StoreClosed,

    #[error("Unsupported offset store version {found}, newest supported is {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },

    #[error("Corrupt offset {offset} stored for {path}")]
    CorruptOffset { path: PathBuf, offset: i64 },

    #[error("Offset {offset} for {path} does not fit the store format")]
    OffsetOutOfRange { path: PathBuf, offset: u64 },

    #[error("Handle lifecycle violation: {0}")]
    Lifecycle(String),

    #[error("Unknown lifecycle event kind: {0}")]
    UnknownEvent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tail worker {0} stopped")]
    WorkerStopped(usize),

    #[error("Tail worker {0} panicked")]
    WorkerPanicked(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
