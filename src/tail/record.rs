// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::{Path, PathBuf};

/// One framed unit of output: a delimiter-terminated (or size-cut) byte range
/// of a tailed file.
///
/// The read pass owns a single `FileRecord` and refills it for every emission,
/// so consumers only ever see it through a shared borrow for the duration of
/// one callback. Anything that must outlive the callback has to be copied out.
#[derive(Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path of the file the record was read from
    path: PathBuf,
    /// Parent directory of `path`, empty for a bare filename
    directory: PathBuf,
    /// Final component of `path`
    filename: String,
    /// Absolute position of the previous record boundary (exclusive)
    pub(crate) start_offset: u64,
    /// Absolute position right after the last byte of this record (inclusive)
    pub(crate) end_offset: u64,
    /// Raw bytes, delimiter included
    pub(crate) payload: Vec<u8>,
}

impl FileRecord {
    pub(crate) fn new(path: &Path, payload_capacity: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            start_offset: 0,
            end_offset: 0,
            payload: Vec::with_capacity(payload_capacity),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    /// The record bytes, including the trailing newline unless the record was
    /// cut at the maximum record size.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Length of the payload in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether the record ends with the newline delimiter (false for forced cuts)
    pub fn is_terminated(&self) -> bool {
        self.payload.last() == Some(&b'\n')
    }
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRecord")
            .field("path", &self.path)
            .field("directory", &self.directory)
            .field("filename", &self.filename)
            .field("start_offset", &self.start_offset)
            .field("end_offset", &self.end_offset)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .finish()
    }
}

/// Downstream sink for completed records.
///
/// Invoked synchronously on the worker thread running the read pass, once per
/// record and in offset order. A consumer that blocks stalls tailing for every
/// path handled by that worker.
pub trait RecordConsumer {
    fn accept(&mut self, record: &FileRecord);
}

impl<F> RecordConsumer for F
where
    F: FnMut(&FileRecord),
{
    fn accept(&mut self, record: &FileRecord) {
        self(record)
    }
}
