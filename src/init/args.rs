// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::tail::config::TailConfig;
use crate::tail::engine::PersistPolicy;
use crate::tail::persistence::DigestAlgorithm;

/// Digest used to derive store keys from paths
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DigestArg {
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-512 truncated to 256 bits
    #[value(name = "sha512_256")]
    Sha512_256,
}

impl From<DigestArg> for DigestAlgorithm {
    fn from(d: DigestArg) -> Self {
        match d {
            DigestArg::Sha256 => DigestAlgorithm::Sha256,
            DigestArg::Sha512_256 => DigestAlgorithm::Sha512_256,
        }
    }
}

/// When read progress is written to the offset store
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicyArg {
    /// Once per read pass
    #[default]
    #[value(name = "per_pass")]
    PerPass,
    /// After every record
    #[value(name = "per_record")]
    PerRecord,
}

impl From<PersistPolicyArg> for PersistPolicy {
    fn from(p: PersistPolicyArg) -> Self {
        match p {
            PersistPolicyArg::PerPass => PersistPolicy::PerPass,
            PersistPolicyArg::PerRecord => PersistPolicy::PerRecord,
        }
    }
}

#[derive(Debug, Args, Clone, Deserialize)]
#[serde(default)]
pub struct TailArgs {
    /// Directory holding the offset store
    #[arg(
        long,
        env = "STATEFUL_TAIL_STATE_PATH",
        default_value = "/var/lib/stateful-tail/state"
    )]
    pub tail_state_path: PathBuf,

    /// Keep offsets in memory only, nothing survives a restart
    #[arg(long, env = "STATEFUL_TAIL_IN_MEMORY", default_value = "false")]
    pub tail_in_memory: bool,

    /// Bytes requested from a file per read
    #[arg(long, env = "STATEFUL_TAIL_READ_CHUNK_SIZE", default_value = "32768")]
    pub tail_read_chunk_size: usize,

    /// Maximum record size in bytes, longer lines are cut into several records
    #[arg(
        long,
        env = "STATEFUL_TAIL_MAX_RECORD_SIZE",
        default_value = "1048576"
    )]
    pub tail_max_record_size: usize,

    /// Maximum number of open file handles kept in the cache
    #[arg(
        long,
        env = "STATEFUL_TAIL_HANDLE_CACHE_CAPACITY",
        default_value = "512"
    )]
    pub tail_handle_cache_capacity: u64,

    /// Idle time in milliseconds after which a cached file handle is closed
    #[arg(
        long,
        env = "STATEFUL_TAIL_HANDLE_IDLE_EXPIRY_MS",
        default_value = "300000"
    )]
    pub tail_handle_idle_expiry_ms: u64,

    /// Offset store map size in bytes
    #[arg(
        long,
        env = "STATEFUL_TAIL_STORE_MAP_SIZE",
        default_value = "2147483648"
    )]
    pub tail_store_map_size: usize,

    /// Number of path digests kept in memory
    #[arg(
        long,
        env = "STATEFUL_TAIL_KEY_CACHE_CAPACITY",
        default_value = "512"
    )]
    pub tail_key_cache_capacity: u64,

    /// Idle time in milliseconds after which a cached path digest is dropped
    #[arg(
        long,
        env = "STATEFUL_TAIL_KEY_CACHE_IDLE_EXPIRY_MS",
        default_value = "300000"
    )]
    pub tail_key_cache_idle_expiry_ms: u64,

    /// Digest for store keys: sha256, sha512_256
    #[arg(
        value_enum,
        long,
        env = "STATEFUL_TAIL_DIGEST",
        default_value = "sha256"
    )]
    pub tail_digest: DigestArg,

    /// When progress is persisted: per_pass, per_record
    #[arg(
        value_enum,
        long,
        env = "STATEFUL_TAIL_PERSIST_POLICY",
        default_value = "per_pass"
    )]
    pub tail_persist_policy: PersistPolicyArg,
}

impl Default for TailArgs {
    fn default() -> Self {
        Self {
            tail_state_path: PathBuf::from("/var/lib/stateful-tail/state"),
            tail_in_memory: false,
            tail_read_chunk_size: 32768,
            tail_max_record_size: 1048576,
            tail_handle_cache_capacity: 512,
            tail_handle_idle_expiry_ms: 300_000,
            tail_store_map_size: 2 * 1024 * 1024 * 1024,
            tail_key_cache_capacity: 512,
            tail_key_cache_idle_expiry_ms: 300_000,
            tail_digest: DigestArg::Sha256,
            tail_persist_policy: PersistPolicyArg::PerPass,
        }
    }
}

impl From<&TailArgs> for TailConfig {
    fn from(args: &TailArgs) -> Self {
        TailConfig {
            read_chunk_size: args.tail_read_chunk_size,
            max_record_size: args.tail_max_record_size,
            handle_cache_capacity: args.tail_handle_cache_capacity,
            handle_idle_expiry: Duration::from_millis(args.tail_handle_idle_expiry_ms),
            store_map_size: args.tail_store_map_size,
            key_cache_capacity: args.tail_key_cache_capacity,
            key_cache_idle_expiry: Duration::from_millis(args.tail_key_cache_idle_expiry_ms),
            digest: args.tail_digest.into(),
            persist_policy: args.tail_persist_policy.into(),
            ..Default::default()
        }
    }
}
