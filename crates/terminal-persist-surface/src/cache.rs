//! Bounded cache of live terminal buffers on the rendering surface.
//!
//! Entries are evicted least-recently-accessed first when the cache is full.
//! Two background timers run once [`CacheManager::start_timers`] is called:
//! auto-save persists every auto-save-enabled entry to a local key-value
//! store, and cleanup evicts entries untouched for longer than the stale
//! threshold. Both stop on [`CacheManager::dispose`] or when the manager is
//! dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use terminal_persist_core::{
    Error, Result, SerializationPayload, SerializedTerminal, SurfaceSettings, TerminalId,
};
use terminal_persist_storage::{optimize_scrollback, split_lines, KeyValueStore, SessionCodec};

use crate::buffer::TerminalBuffer;

/// Shared handle to a live terminal buffer.
pub type BufferHandle = Arc<dyn TerminalBuffer>;

/// Key prefix for locally auto-saved buffers.
pub const CACHE_KEY_PREFIX: &str = "terminal-cache/";

/// Local storage key of an auto-saved buffer.
pub fn cache_key(id: &TerminalId) -> String {
    format!("{CACHE_KEY_PREFIX}{id}")
}

/// Outcome of one auto-save pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoSaveReport {
    /// Entries written to the store
    pub saved: usize,
    /// Entries whose write failed, in ID order
    pub failed: Vec<TerminalId>,
}

/// Options for [`CacheManager::serialize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Keep at most this many of the newest lines
    pub scrollback: Option<usize>,
    /// Include the HTML rendering when the buffer has one
    pub include_html: bool,
}

/// Options for [`CacheManager::restore_content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Clear the buffer before writing
    pub clear: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self { clear: true }
    }
}

#[derive(Debug)]
struct CacheEntry {
    handle: BufferHandle,
    last_accessed_at: Instant,
    // Orders accesses that share an instant
    access_seq: u64,
    auto_save_enabled: bool,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<TerminalId, CacheEntry>,
    seq: u64,
}

impl Entries {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn touch(&mut self, id: &TerminalId) -> Option<BufferHandle> {
        let seq = self.next_seq();
        let entry = self.map.get_mut(id)?;
        entry.last_accessed_at = Instant::now();
        entry.access_seq = seq;
        Some(Arc::clone(&entry.handle))
    }

    fn least_recently_accessed(&self) -> Option<TerminalId> {
        self.map
            .iter()
            .min_by_key(|(_, e)| (e.last_accessed_at, e.access_seq))
            .map(|(id, _)| id.clone())
    }
}

#[derive(Debug)]
struct CacheState {
    entries: Mutex<Entries>,
    settings: SurfaceSettings,
    codec: SessionCodec,
}

impl CacheState {
    async fn auto_save(&self, store: &dyn KeyValueStore) -> AutoSaveReport {
        let mut targets: Vec<(TerminalId, BufferHandle)> = {
            let entries = self.entries.lock().await;
            entries
                .map
                .iter()
                .filter(|(_, e)| e.auto_save_enabled)
                .map(|(id, e)| (id.clone(), Arc::clone(&e.handle)))
                .collect()
        };
        targets.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut report = AutoSaveReport::default();
        for (id, handle) in targets {
            match self.save_entry(store, &id, &handle).await {
                Ok(()) => report.saved += 1,
                Err(e) => {
                    warn!("Auto-save of terminal {} failed: {}", id, e);
                    report.failed.push(id);
                }
            }
        }
        report
    }

    async fn save_entry(
        &self,
        store: &dyn KeyValueStore,
        id: &TerminalId,
        handle: &BufferHandle,
    ) -> Result<()> {
        let serialized = self.codec.encode_terminal(&handle.content(), handle.html())?;
        let json = serde_json::to_string(&serialized)
            .map_err(|e| Error::SerializationFailed(format!("terminal {id}: {e}")))?;
        store.write(&cache_key(id), &json).await
    }

    async fn evict_stale(&self) -> Vec<TerminalId> {
        let stale_after = self.settings.stale_after();
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let stale: Vec<TerminalId> = entries
            .map
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_accessed_at) > stale_after)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            entries.map.remove(id);
        }
        stale
    }
}

/// Bounded LRU cache of live terminal buffers.
#[derive(Debug)]
pub struct CacheManager {
    state: Arc<CacheState>,
    cancel: CancellationToken,
    timers: StdMutex<Vec<JoinHandle<()>>>,
}

impl CacheManager {
    /// Create a cache with the given settings and codec.
    pub fn new(settings: SurfaceSettings, codec: SessionCodec) -> Self {
        Self {
            state: Arc::new(CacheState {
                entries: Mutex::new(Entries::default()),
                settings,
                codec,
            }),
            cancel: CancellationToken::new(),
            timers: StdMutex::new(Vec::new()),
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.state.settings.cache_capacity
    }

    /// Register a live buffer. Returns the evicted ID when the cache was full.
    ///
    /// Re-registering an existing ID replaces its handle and never evicts.
    pub async fn register(&self, id: TerminalId, handle: BufferHandle) -> Option<TerminalId> {
        let mut entries = self.state.entries.lock().await;

        let evicted = if !entries.map.contains_key(&id)
            && entries.map.len() >= self.state.settings.cache_capacity
        {
            let oldest = entries.least_recently_accessed();
            if let Some(old) = &oldest {
                entries.map.remove(old);
                info!("Evicted least recently used terminal {} for {}", old, id);
            }
            oldest
        } else {
            None
        };

        let access_seq = entries.next_seq();
        entries.map.insert(
            id.clone(),
            CacheEntry {
                handle,
                last_accessed_at: Instant::now(),
                access_seq,
                auto_save_enabled: true,
            },
        );
        debug!("Registered terminal {} ({} cached)", id, entries.map.len());
        evicted
    }

    /// Remove an entry. Returns whether it was present.
    pub async fn remove(&self, id: &TerminalId) -> bool {
        self.state.entries.lock().await.map.remove(id).is_some()
    }

    /// Whether `id` is cached.
    pub async fn contains(&self, id: &TerminalId) -> bool {
        self.state.entries.lock().await.map.contains_key(id)
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.state.entries.lock().await.map.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cached IDs, sorted.
    pub async fn ids(&self) -> Vec<TerminalId> {
        let mut ids: Vec<_> = self.state.entries.lock().await.map.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Last access instant of an entry.
    pub async fn last_accessed(&self, id: &TerminalId) -> Option<Instant> {
        self.state
            .entries
            .lock()
            .await
            .map
            .get(id)
            .map(|e| e.last_accessed_at)
    }

    /// Enable or disable auto-save for an entry. Returns whether it exists.
    pub async fn set_auto_save(&self, id: &TerminalId, enabled: bool) -> bool {
        match self.state.entries.lock().await.map.get_mut(id) {
            Some(entry) => {
                entry.auto_save_enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Serialize one buffer. Touches the entry.
    pub async fn serialize(
        &self,
        id: &TerminalId,
        options: SerializeOptions,
    ) -> Result<SerializedTerminal> {
        let handle = self
            .state
            .entries
            .lock()
            .await
            .touch(id)
            .ok_or_else(|| Error::TerminalNotFound(id.to_string()))?;

        let mut content = handle.content();
        if let Some(limit) = options.scrollback {
            content = optimize_scrollback(split_lines(&content), limit).join("\n");
        }
        let html = if options.include_html {
            handle.html()
        } else {
            None
        };
        self.state.codec.encode_terminal(&content, html)
    }

    /// Serialize several buffers. IDs that are not cached are skipped.
    pub async fn serialize_many(
        &self,
        ids: &[TerminalId],
        options: SerializeOptions,
    ) -> Result<SerializationPayload> {
        let mut payload = SerializationPayload::new();
        for id in ids {
            match self.serialize(id, options).await {
                Ok(terminal) => payload.insert(id.clone(), terminal),
                Err(Error::TerminalNotFound(_)) => {
                    warn!("Skipping serialization of uncached terminal {}", id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(payload)
    }

    /// Write lines back into a buffer, a bounded number per scheduler tick.
    ///
    /// Returns the number of lines written.
    pub async fn restore_content(
        &self,
        id: &TerminalId,
        lines: &[String],
        options: RestoreOptions,
    ) -> Result<usize> {
        let handle = self
            .state
            .entries
            .lock()
            .await
            .touch(id)
            .ok_or_else(|| Error::TerminalNotFound(id.to_string()))?;

        if options.clear {
            handle.clear();
        }

        let per_tick = self.state.settings.restore_lines_per_tick.max(1);
        let mut written = 0;
        for (tick, chunk) in lines.chunks(per_tick).enumerate() {
            if tick > 0 {
                tokio::task::yield_now().await;
            }
            handle.write_lines(chunk);
            written += chunk.len();
        }

        debug!("Restored {} lines into terminal {}", written, id);
        Ok(written)
    }

    /// Persist every auto-save-enabled entry to `store` now.
    pub async fn auto_save_now(&self, store: &dyn KeyValueStore) -> AutoSaveReport {
        self.state.auto_save(store).await
    }

    /// Evict entries untouched for longer than the stale threshold now.
    pub async fn cleanup_stale_now(&self) -> Vec<TerminalId> {
        self.state.evict_stale().await
    }

    /// Read back the auto-saved content of a terminal.
    pub async fn saved_content(
        &self,
        store: &dyn KeyValueStore,
        id: &TerminalId,
    ) -> Result<Option<String>> {
        let Some(json) = store.read(&cache_key(id)).await? else {
            return Ok(None);
        };
        let serialized: SerializedTerminal = serde_json::from_str(&json)
            .map_err(|e| Error::DeserializationFailed(format!("cached terminal {id}: {e}")))?;
        self.state.codec.decode_terminal(&serialized).map(Some)
    }

    /// Start the auto-save and cleanup timers.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// the timers run has no effect.
    pub fn start_timers(&self, store: Arc<dyn KeyValueStore>) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if !timers.is_empty() || self.cancel.is_cancelled() {
            warn!("Cache timers already started or manager disposed");
            return;
        }

        timers.push(tokio::spawn(auto_save_loop(
            Arc::clone(&self.state),
            store,
            self.cancel.child_token(),
        )));
        timers.push(tokio::spawn(cleanup_loop(
            Arc::clone(&self.state),
            self.cancel.child_token(),
        )));
        info!(
            "Cache timers started: auto-save every {:?}, cleanup every {:?}",
            self.state.settings.auto_save_interval(),
            self.state.settings.cleanup_interval()
        );
    }

    /// Stop the timers and drop every entry.
    pub async fn dispose(&self) {
        self.cancel.cancel();
        let timers: Vec<_> = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for timer in timers {
            let _ = timer.await;
        }
        self.state.entries.lock().await.map.clear();
        debug!("Cache manager disposed");
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn auto_save_loop(
    state: Arc<CacheState>,
    store: Arc<dyn KeyValueStore>,
    cancel: CancellationToken,
) {
    let period = state.settings.auto_save_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let report = state.auto_save(store.as_ref()).await;
                debug!(
                    "Auto-saved {} terminal buffer(s), {} failed",
                    report.saved,
                    report.failed.len()
                );
            }
        }
    }
    debug!("Auto-save timer stopped");
}

async fn cleanup_loop(state: Arc<CacheState>, cancel: CancellationToken) {
    let period = state.settings.cleanup_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = state.evict_stale().await;
                if !evicted.is_empty() {
                    info!("Evicted {} stale terminal buffer(s)", evicted.len());
                }
            }
        }
    }
    debug!("Cleanup timer stopped");
}
