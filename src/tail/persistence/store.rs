// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use crate::tail::error::Result;

/// Durable mapping from a file path to the number of bytes already consumed.
///
/// A missing entry reads as offset 0. Implementations must never substitute a
/// default for a failed lookup: a false 0 would re-deliver the whole file.
pub trait OffsetStore: Send + Sync {
    /// Get the persisted offset for `path`, or 0 when none is stored.
    fn get_offset(&self, path: &Path) -> Result<u64>;

    /// Persist `offset` for `path`. Visible to every caller once this returns.
    fn set_offset(&self, path: &Path, offset: u64) -> Result<()>;

    /// Remove the entry for `path`; later lookups return 0.
    fn delete_offset(&self, path: &Path) -> Result<()>;

    /// Release underlying resources. Closing twice is a no-op.
    fn close(&self) -> Result<()>;
}
