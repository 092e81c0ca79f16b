// SPDX-License-Identifier: Apache-2.0

//! Cache of open read handles for tailed files.
//!
//! Handles are bounded by count and by idle time. A handle checked out by a
//! read pass is *active*; the cache never closes an active handle. If an active
//! handle is evicted, it stays open until its matching `release`, which notices
//! the handle is no longer cached and closes it there.
//!
//! Bookkeeping lives in two structures behind one mutex: the bounded `moka`
//! cache of resident handles and the map of active ones. Every cache operation
//! runs under that mutex, so the eviction listener (which moka invokes from
//! inside those operations) sees a consistent active flag without locking.
//! File I/O on a handle happens after `acquire` returns, outside the mutex.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::tail::error::{Error, Result};

/// Default maximum number of cached handles
pub const DEFAULT_HANDLE_CAPACITY: u64 = 512;

/// Default idle time after which an unused handle is evicted
pub const DEFAULT_HANDLE_IDLE_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// An open read handle for one path.
///
/// Reads and seeks go through the handle so that closing (which drops the
/// underlying `File`) can happen exactly once, from whichever side of the
/// cache notices it first.
pub struct FileHandle {
    path: PathBuf,
    file: Mutex<Option<File>>,
    active: AtomicBool,
}

impl FileHandle {
    fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            active: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a read pass currently holds this handle
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }

    /// Current size of the open file. Still answers after the path was
    /// unlinked, as long as the handle is open.
    pub fn size(&self) -> io::Result<u64> {
        self.with_file(|file| file.metadata().map(|metadata| metadata.len()))
    }

    pub fn seek(&self, offset: u64) -> io::Result<u64> {
        self.with_file(|file| file.seek(SeekFrom::Start(offset)))
    }

    pub fn position(&self) -> io::Result<u64> {
        self.with_file(|file| file.stream_position())
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_file(|file| file.read(buf))
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self.file.lock();
        match file.as_mut() {
            Some(file) => op(file),
            None => Err(io::Error::other(format!(
                "handle for {} is closed",
                self.path.display()
            ))),
        }
    }

    /// Drop the underlying file. Returns false if it was already closed.
    fn close(&self) -> bool {
        self.file.lock().take().is_some()
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("active", &self.is_active())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// What to do with a handle that the cache is removing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionAction {
    /// Nobody holds the handle, close it immediately
    CloseNow,
    /// A read pass holds the handle; its release closes it
    LeaveOpen,
}

impl EvictionAction {
    pub fn for_handle(handle: &FileHandle) -> Self {
        if handle.is_active() {
            EvictionAction::LeaveOpen
        } else {
            EvictionAction::CloseNow
        }
    }
}

/// Open/close counters for the cache
#[derive(Debug, Default)]
pub struct HandleCacheStats {
    opened: AtomicU64,
    closed: AtomicU64,
}

impl HandleCacheStats {
    /// Handles opened since the cache was created
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Handles closed since the cache was created
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Handles currently open, cached or active
    pub fn open_handles(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    fn close(&self, handle: &FileHandle) {
        if handle.close() {
            self.closed.fetch_add(1, Ordering::Relaxed);
            trace!(path = ?handle.path(), "Closed handle");
        }
    }
}

struct CacheState {
    cached: Cache<PathBuf, Arc<FileHandle>>,
    active: HashMap<PathBuf, Arc<FileHandle>>,
}

/// Bounded, idle-expiring pool of open read handles
pub struct HandleCache {
    state: Mutex<CacheState>,
    stats: Arc<HandleCacheStats>,
}

impl HandleCache {
    pub fn new(capacity: u64, idle_expiry: Duration) -> Self {
        let stats = Arc::new(HandleCacheStats::default());
        let listener_stats = stats.clone();

        let cached = Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(idle_expiry)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(
                move |path: Arc<PathBuf>, handle: Arc<FileHandle>, cause: RemovalCause| {
                    trace!(path = ?path, cause = ?cause, "Handle removed from cache");
                    match EvictionAction::for_handle(&handle) {
                        EvictionAction::CloseNow => listener_stats.close(&handle),
                        EvictionAction::LeaveOpen => {
                            trace!(path = ?path, "Removed handle is active, release will close it")
                        }
                    }
                },
            )
            .build();

        Self {
            state: Mutex::new(CacheState {
                cached,
                active: HashMap::new(),
            }),
            stats,
        }
    }

    /// Check out the handle for `path`, opening it if it is not cached.
    ///
    /// Returns `Ok(None)` when the file does not exist or may not be read;
    /// there is simply nothing to read right now. Any other open failure is an
    /// error. Every successful acquire must be paired with one `release`.
    pub fn acquire(&self, path: &Path) -> Result<Option<Arc<FileHandle>>> {
        let mut state = self.state.lock();
        trace!(path = ?path, "Acquiring handle");

        if state.active.contains_key(path) {
            return Err(Error::Lifecycle(format!(
                "handle for {} is already active",
                path.display()
            )));
        }

        let handle = match state.cached.get(path) {
            Some(handle) => handle,
            None => {
                let handle = match FileHandle::open(path) {
                    Ok(handle) => Arc::new(handle),
                    Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                        warn!(path = ?path, "Reading of inaccessible file skipped");
                        return Ok(None);
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        warn!(path = ?path, "Reading of non-present file skipped");
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                };
                self.stats.opened.fetch_add(1, Ordering::Relaxed);
                trace!(path = ?path, "Opened new handle");

                // Active before it becomes visible to the eviction listener, so
                // an immediate capacity eviction leaves it open.
                handle.set_active(true);
                state.cached.insert(path.to_path_buf(), handle.clone());
                state.cached.run_pending_tasks();
                handle
            }
        };

        handle.set_active(true);
        state.active.insert(path.to_path_buf(), handle.clone());
        Ok(Some(handle))
    }

    /// Check out the handle for `path` and release it when the lease drops.
    pub fn lease(&self, path: &Path) -> Result<Option<HandleLease<'_>>> {
        Ok(self
            .acquire(path)?
            .map(|handle| HandleLease { cache: self, handle }))
    }

    /// Return the handle for `path` to the cache.
    ///
    /// Closes the handle if the cache dropped it while it was active.
    pub fn release(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        trace!(path = ?path, "Releasing handle");

        let handle = state.active.remove(path).ok_or_else(|| {
            Error::Lifecycle(format!(
                "attempt to release inactive path {}",
                path.display()
            ))
        })?;
        handle.set_active(false);

        match state.cached.get(path) {
            Some(cached) if Arc::ptr_eq(&cached, &handle) => {}
            _ => {
                trace!(path = ?path, "Released handle no longer cached, closing");
                self.stats.close(&handle);
            }
        }
        Ok(())
    }

    /// Remove and close the cached handle for `path`.
    ///
    /// The handle must not be active; release it first.
    pub fn invalidate(&self, path: &Path) -> Result<()> {
        let state = self.state.lock();

        if state.active.contains_key(path) {
            return Err(Error::Lifecycle(format!(
                "must not invalidate active path {}",
                path.display()
            )));
        }

        if let Some(handle) = state.cached.remove(path) {
            trace!(path = ?path, "Invalidated handle");
            self.stats.close(&handle);
        }
        Ok(())
    }

    /// Close every inactive cached handle and empty the cache.
    ///
    /// Handles that are active at this point stay open until their release.
    pub fn close(&self) {
        let state = self.state.lock();

        for (_, handle) in state.cached.iter() {
            if EvictionAction::for_handle(&handle) == EvictionAction::CloseNow {
                self.stats.close(&handle);
            }
        }
        state.cached.invalidate_all();
        state.cached.run_pending_tasks();

        debug!(
            active = state.active.len(),
            opened = self.stats.opened(),
            closed = self.stats.closed(),
            "Closed handle cache"
        );
    }

    /// Whether a handle for `path` is resident in the cache
    pub fn contains(&self, path: &Path) -> bool {
        self.state.lock().cached.contains_key(path)
    }

    /// Number of resident handles, after applying pending evictions
    pub fn cached_len(&self) -> u64 {
        let state = self.state.lock();
        state.cached.run_pending_tasks();
        state.cached.entry_count()
    }

    /// Number of handles currently checked out
    pub fn active_len(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn stats(&self) -> &HandleCacheStats {
        &self.stats
    }
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::new(DEFAULT_HANDLE_CAPACITY, DEFAULT_HANDLE_IDLE_EXPIRY)
    }
}

impl fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleCache")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Scoped acquisition of a handle; releases it on drop.
pub struct HandleLease<'a> {
    cache: &'a HandleCache,
    handle: Arc<FileHandle>,
}

impl HandleLease<'_> {
    pub fn handle(&self) -> &Arc<FileHandle> {
        &self.handle
    }
}

impl Deref for HandleLease<'_> {
    type Target = FileHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

/// A lease holds the only acquire of its path, so its release fails only when
/// someone else released that path behind its back.
impl Drop for HandleLease<'_> {
    fn drop(&mut self) {
        let released = self.cache.release(self.handle.path());
        if let Err(e) = &released {
            error!(path = ?self.handle.path(), error = %e, "Failed to release handle lease");
        }
        debug_assert!(
            released.is_ok(),
            "lease for {} was released elsewhere",
            self.handle.path().display()
        );
    }
}
