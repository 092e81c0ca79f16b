// SPDX-License-Identifier: Apache-2.0

//! Lifecycle-event driven tailing of one file at a time.
//!
//! A read pass drains everything between the persisted offset of a path and
//! its current end of file, framing newline-delimited records. Only complete
//! records advance the offset; a trailing partial line is scanned again by the
//! next pass. Callers must not run two passes for the same path concurrently.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::tail::error::{Error, Result};
use crate::tail::event::{EventKind, LifecycleEvent};
use crate::tail::handle_cache::{FileHandle, HandleCache};
use crate::tail::persistence::OffsetStore;
use crate::tail::record::{FileRecord, RecordConsumer};

/// Default number of bytes requested from the file per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 32 * 1024;

/// Default maximum record size, longer lines are cut into several records
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1024 * 1024;

const DELIMITER: u8 = b'\n';

/// When the engine writes progress to the offset store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistPolicy {
    /// Once at the end of every read pass that moved the offset
    #[default]
    PerPass,
    /// After every emitted record
    PerRecord,
}

/// Tunables for the read pass
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub read_chunk_size: usize,
    pub max_record_size: usize,
    pub persist_policy: PersistPolicy,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            persist_policy: PersistPolicy::default(),
        }
    }
}

/// Outcome of one read pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Records handed to the consumer
    pub records: u64,
    /// Offset the scan started from
    pub start_offset: u64,
    /// End offset of the last complete record, the value left in the store
    pub end_offset: u64,
    /// The scan reached the end of the file rather than aborting on I/O
    pub reached_eof: bool,
    /// The file was shorter than its stored offset and was read from 0
    pub truncated: bool,
    /// A handle could be acquired for the path
    pub readable: bool,
}

struct ScanResult {
    records: u64,
    last_end: u64,
    reached_eof: bool,
}

/// Reacts to lifecycle events for files and emits their records.
///
/// Each worker owns one engine. Engines share the handle cache and the offset
/// store, and own their consumer and read buffers.
pub struct TailEngine<C> {
    handles: Arc<HandleCache>,
    store: Arc<dyn OffsetStore>,
    consumer: C,
    options: ReadOptions,
    chunk: Vec<u8>,
    payload: Vec<u8>,
}

impl<C: RecordConsumer> TailEngine<C> {
    pub fn new(
        handles: Arc<HandleCache>,
        store: Arc<dyn OffsetStore>,
        consumer: C,
        options: ReadOptions,
    ) -> Self {
        let chunk = vec![0; options.read_chunk_size.max(1)];
        Self {
            handles,
            store,
            consumer,
            options,
            chunk,
            payload: Vec::new(),
        }
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Apply one lifecycle event.
    ///
    /// Terminal events drain what is still readable through a cached handle
    /// before the handle and the stored offset are dropped.
    pub fn on_event(&mut self, event: &LifecycleEvent) -> Result<()> {
        let path = event.path.as_path();
        debug!(path = ?path, kind = %event.kind, "Handling lifecycle event");

        match event.kind {
            EventKind::Created | EventKind::Modified => {
                self.read_pass(path)?;
            }
            EventKind::Deleted => {
                self.read_pass(path)?;
                self.forget(path)?;
            }
            EventKind::Recreated => {
                self.read_pass(path)?;
                self.forget(path)?;
                self.read_pass(path)?;
            }
        }
        Ok(())
    }

    fn forget(&self, path: &Path) -> Result<()> {
        self.handles.invalidate(path)?;
        self.store.delete_offset(path)?;
        trace!(path = ?path, "Forgot handle and offset");
        Ok(())
    }

    /// Read every complete record between the stored offset and the end of
    /// the file.
    pub fn read_pass(&mut self, path: &Path) -> Result<PassSummary> {
        let handles = Arc::clone(&self.handles);
        let Some(handle) = handles.lease(path)? else {
            self.store.delete_offset(path)?;
            return Ok(PassSummary::default());
        };

        let stored = self.store.get_offset(path)?;
        let mut persisted = stored;
        let mut truncated = false;

        let size = match handle.size() {
            Ok(size) => size,
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to stat file, skipping read pass");
                return Ok(PassSummary {
                    start_offset: stored,
                    end_offset: stored,
                    readable: true,
                    ..Default::default()
                });
            }
        };

        if size < stored {
            warn!(path = ?path, offset = stored, size, "File truncated, reading from start");
            self.store.set_offset(path, 0)?;
            persisted = 0;
            truncated = true;
        }
        let start = persisted;

        let scan = self.scan(&handle, path, start, &mut persisted)?;

        if scan.last_end != persisted {
            self.store.set_offset(path, scan.last_end)?;
        }

        let summary = PassSummary {
            records: scan.records,
            start_offset: start,
            end_offset: scan.last_end,
            reached_eof: scan.reached_eof,
            truncated,
            readable: true,
        };
        debug!(
            path = ?path,
            records = summary.records,
            start = summary.start_offset,
            end = summary.end_offset,
            eof = summary.reached_eof,
            "Finished read pass"
        );
        Ok(summary)
    }

    fn scan(
        &mut self,
        handle: &FileHandle,
        path: &Path,
        start: u64,
        persisted: &mut u64,
    ) -> Result<ScanResult> {
        let TailEngine {
            store,
            consumer,
            options,
            chunk,
            payload,
            ..
        } = self;
        let max_record_size = options.max_record_size;

        let mut result = ScanResult {
            records: 0,
            last_end: start,
            reached_eof: false,
        };

        if let Err(e) = handle.seek(start) {
            warn!(path = ?path, offset = start, error = %e, "Failed to seek, aborting scan");
            return Ok(result);
        }

        let mut record = FileRecord::new(path, 0);
        record.payload = std::mem::take(payload);
        record.payload.clear();
        record.start_offset = start;
        let mut position = start;

        result.reached_eof = loop {
            let size = match handle.size() {
                Ok(size) => size,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to stat file, aborting scan");
                    break false;
                }
            };
            if position >= size {
                break true;
            }

            let read = match handle.read(chunk) {
                Ok(0) => {
                    warn!(path = ?path, position, size, "Read returned no data before end of file, aborting scan");
                    break false;
                }
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(path = ?path, position, error = %e, "Failed to read file, aborting scan");
                    break false;
                }
            };
            position += read as u64;

            let mut window = &chunk[..read];
            while !window.is_empty() {
                let room = max_record_size.saturating_sub(record.payload.len());
                if room == 0 {
                    return Err(Error::Lifecycle(format!(
                        "record buffer overflow reading {}",
                        path.display()
                    )));
                }

                let limit = window.len().min(room);
                let (take, delimited) = match window[..limit].iter().position(|&b| b == DELIMITER)
                {
                    Some(index) => (index + 1, true),
                    None => (limit, false),
                };
                record.payload.extend_from_slice(&window[..take]);
                window = &window[take..];

                if delimited || record.payload.len() == max_record_size {
                    record.end_offset = record.start_offset + record.payload.len() as u64;
                    trace!(
                        path = ?path,
                        start = record.start_offset,
                        end = record.end_offset,
                        "Emitting record"
                    );
                    consumer.accept(&record);
                    result.records += 1;
                    result.last_end = record.end_offset;

                    if options.persist_policy == PersistPolicy::PerRecord {
                        store.set_offset(path, result.last_end)?;
                        *persisted = result.last_end;
                    }

                    record.payload.clear();
                    record.start_offset = result.last_end;
                }
            }
        };

        if !record.payload.is_empty() {
            trace!(
                path = ?path,
                pending = record.payload.len(),
                "Leaving partial record for the next pass"
            );
        }
        *payload = std::mem::take(&mut record.payload);
        Ok(result)
    }
}

impl<C> std::fmt::Debug for TailEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailEngine")
            .field("options", &self.options)
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}
