// SPDX-License-Identifier: Apache-2.0

//! Lifecycle events handed to the tail engine by the directory watcher.

use std::fmt;
use std::path::PathBuf;

use crate::tail::error::Error;

/// Classification of a change to a monitored path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// File appeared
    Created,
    /// File content changed
    Modified,
    /// File was removed
    Deleted,
    /// File was removed and a new file now exists at the same path (rotation)
    Recreated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Recreated => "recreated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" | "new" => Ok(EventKind::Created),
            "modified" => Ok(EventKind::Modified),
            "deleted" => Ok(EventKind::Deleted),
            "recreated" => Ok(EventKind::Recreated),
            _ => Err(Error::UnknownEvent(s.to_string())),
        }
    }
}

/// A lifecycle event for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Canonical path of the file
    pub path: PathBuf,
    /// What happened to it
    pub kind: EventKind,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Modified, path)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Deleted, path)
    }

    pub fn recreated(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Recreated, path)
    }
}

/// Parses the `<kind> <path>` line format used by the stdin event feed.
/// Everything after the first run of whitespace is the path.
impl std::str::FromStr for LifecycleEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (kind, path) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::UnknownEvent(line.to_string()))?;
        let path = path.trim_start();
        if path.is_empty() {
            return Err(Error::UnknownEvent(line.to_string()));
        }
        Ok(Self::new(kind.parse()?, path))
    }
}
