// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::tail::config::TailConfig;
use crate::tail::engine::{ReadOptions, TailEngine};
use crate::tail::error::{Error, Result};
use crate::tail::handle_cache::HandleCache;
use crate::tail::persistence::{LmdbOffsetStore, OffsetStore};
use crate::tail::record::RecordConsumer;

/// Process-wide owner of the handle cache and offset store.
///
/// Hands out one [`TailEngine`] per worker, each with a fresh consumer from
/// the supplier. All engines share the same cache and store.
pub struct StatefulReader<S> {
    handles: Arc<HandleCache>,
    store: Arc<dyn OffsetStore>,
    consumers: S,
    options: ReadOptions,
}

impl<S, C> StatefulReader<S>
where
    S: Fn() -> C,
    C: RecordConsumer,
{
    /// Open the durable offset store under `state_path` and build the reader.
    pub fn open(state_path: impl AsRef<Path>, config: &TailConfig, consumers: S) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let store = LmdbOffsetStore::open(state_path, &config.lmdb_options())?;
        Self::with_store(Arc::new(store), config, consumers)
    }

    /// Build the reader on top of an existing store.
    pub fn with_store(
        store: Arc<dyn OffsetStore>,
        config: &TailConfig,
        consumers: S,
    ) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let handles = Arc::new(HandleCache::new(
            config.handle_cache_capacity,
            config.handle_idle_expiry,
        ));

        Ok(Self {
            handles,
            store,
            consumers,
            options: config.read_options(),
        })
    }

    /// A new engine with its own consumer
    pub fn engine(&self) -> TailEngine<C> {
        TailEngine::new(
            self.handles.clone(),
            self.store.clone(),
            (self.consumers)(),
            self.options.clone(),
        )
    }

    pub fn handles(&self) -> &Arc<HandleCache> {
        &self.handles
    }

    pub fn store(&self) -> &Arc<dyn OffsetStore> {
        &self.store
    }

    /// Close the handle cache, then the store.
    ///
    /// Engines still alive after this fail their next store access.
    pub fn close(&self) -> Result<()> {
        self.handles.close();
        self.store.close()?;
        info!("Closed stateful reader");
        Ok(())
    }
}
