// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Configuration
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durability and performance knobs. A `WalConfig` is built once through
// `WalConfigBuilder` and is immutable afterwards.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{WalError, WalResult};
use crate::observer::{NoopObserver, WalObserver};

/// Default directory name for the WAL below a store's data directory.
pub const DEFAULT_DIRECTORY_NAME: &str = "value-wal";

/// Default maximum segment size in bytes (1 GiB).
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 1024 * 1024 * 1024;

/// Default producer queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256 * 1024;

/// Default write buffer size (1 MiB).
pub const DEFAULT_BATCH_BUFFER_BYTES: usize = 1024 * 1024;

/// The write buffer must be strictly larger than this.
pub const MIN_BATCH_BUFFER_BYTES: usize = 4 * 1024;

/// Default force interval for [`SyncPolicy::Interval`].
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(2);

/// Default idle poll interval of the writer thread.
pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// File holding the store identifier when none is configured explicitly.
pub const STORE_ID_FILE: &str = "store.uuid";

// ---------------------------------------------------------------------------
// SyncPolicy
// ---------------------------------------------------------------------------

/// When the writer thread forces appended records to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Force after every record.
    Always,
    /// Force when the sync interval has elapsed and there is unforced data.
    Interval,
    /// Force only when a caller waits for durability of an appended LSN.
    Commit,
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPolicy::Always => "always",
            SyncPolicy::Interval => "interval",
            SyncPolicy::Commit => "commit",
        };
        f.write_str(name)
    }
}

impl FromStr for SyncPolicy {
    type Err = WalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(SyncPolicy::Always),
            "interval" => Ok(SyncPolicy::Interval),
            "commit" => Ok(SyncPolicy::Commit),
            other => Err(WalError::InvalidConfig(format!(
                "unknown sync policy '{other}' (expected always, interval or commit)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// WalConfig
// ---------------------------------------------------------------------------

/// Immutable configuration of one WAL instance.
#[derive(Debug, Clone)]
pub struct WalConfig {
    wal_dir: PathBuf,
    snapshot_dir: PathBuf,
    store_id: String,
    max_segment_bytes: u64,
    queue_capacity: usize,
    batch_buffer_bytes: usize,
    sync_policy: SyncPolicy,
    sync_interval: Duration,
    idle_poll_interval: Duration,
    sync_bootstrap_on_open: bool,
    recover_value_store_on_open: bool,
    compress_retired_segments: bool,
    observer: Arc<dyn WalObserver>,
}

impl WalConfig {
    /// Start building a configuration for the given WAL directory.
    pub fn builder(wal_dir: impl AsRef<Path>) -> WalConfigBuilder {
        WalConfigBuilder::new(wal_dir)
    }

    /// Directory holding the segments and the lock file.
    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    /// Directory reserved for the owning store's snapshots.
    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Identifier of the owning store, written into every segment header.
    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn max_segment_bytes(&self) -> u64 {
        self.max_segment_bytes
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn batch_buffer_bytes(&self) -> usize {
        self.batch_buffer_bytes
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        self.sync_policy
    }

    /// Only consulted under [`SyncPolicy::Interval`].
    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    pub fn idle_poll_interval(&self) -> Duration {
        self.idle_poll_interval
    }

    /// Whether bootstrap replay must finish before the store accepts work.
    pub fn sync_bootstrap_on_open(&self) -> bool {
        self.sync_bootstrap_on_open
    }

    /// Whether the store should rebuild missing persisted values from the WAL.
    pub fn recover_value_store_on_open(&self) -> bool {
        self.recover_value_store_on_open
    }

    /// Whether retired segments are gzip-compressed in the background.
    pub fn compress_retired_segments(&self) -> bool {
        self.compress_retired_segments
    }

    pub fn observer(&self) -> &Arc<dyn WalObserver> {
        &self.observer
    }
}

// ---------------------------------------------------------------------------
// WalConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for [`WalConfig`].
#[derive(Debug, Clone)]
pub struct WalConfigBuilder {
    wal_dir: PathBuf,
    snapshot_dir: Option<PathBuf>,
    store_id: Option<String>,
    max_segment_bytes: u64,
    queue_capacity: usize,
    batch_buffer_bytes: usize,
    sync_policy: SyncPolicy,
    sync_interval: Duration,
    idle_poll_interval: Duration,
    sync_bootstrap_on_open: bool,
    recover_value_store_on_open: bool,
    compress_retired_segments: bool,
    observer: Arc<dyn WalObserver>,
}

impl WalConfigBuilder {
    fn new(wal_dir: impl AsRef<Path>) -> Self {
        Self {
            wal_dir: wal_dir.as_ref().to_path_buf(),
            snapshot_dir: None,
            store_id: None,
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_buffer_bytes: DEFAULT_BATCH_BUFFER_BYTES,
            sync_policy: SyncPolicy::Commit,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            idle_poll_interval: DEFAULT_IDLE_POLL_INTERVAL,
            sync_bootstrap_on_open: false,
            recover_value_store_on_open: false,
            compress_retired_segments: true,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn snapshot_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.snapshot_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id.into());
        self
    }

    pub fn max_segment_bytes(mut self, bytes: u64) -> Self {
        self.max_segment_bytes = bytes;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn batch_buffer_bytes(mut self, bytes: usize) -> Self {
        self.batch_buffer_bytes = bytes;
        self
    }

    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    pub fn sync_bootstrap_on_open(mut self, enabled: bool) -> Self {
        self.sync_bootstrap_on_open = enabled;
        self
    }

    pub fn recover_value_store_on_open(mut self, enabled: bool) -> Self {
        self.recover_value_store_on_open = enabled;
        self
    }

    pub fn compress_retired_segments(mut self, enabled: bool) -> Self {
        self.compress_retired_segments = enabled;
        self
    }

    /// Attach an observer scoped to the instance built from this config.
    pub fn observer(mut self, observer: Arc<dyn WalObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate the knobs and produce the configuration.
    ///
    /// When no store id was given, the id is read from `store.uuid` in the WAL
    /// directory, or generated and persisted there on first use.
    pub fn build(self) -> WalResult<WalConfig> {
        if self.max_segment_bytes == 0 {
            return Err(WalError::InvalidConfig(
                "max_segment_bytes must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(WalError::InvalidConfig(
                "queue_capacity must be positive".to_string(),
            ));
        }
        if self.batch_buffer_bytes <= MIN_BATCH_BUFFER_BYTES {
            return Err(WalError::InvalidConfig(format!(
                "batch_buffer_bytes must exceed {MIN_BATCH_BUFFER_BYTES}, got {}",
                self.batch_buffer_bytes
            )));
        }
        if self.idle_poll_interval.is_zero() {
            return Err(WalError::InvalidConfig(
                "idle_poll_interval must be non-zero".to_string(),
            ));
        }

        let store_id = match self.store_id {
            Some(id) if !id.trim().is_empty() => id,
            Some(_) => {
                return Err(WalError::InvalidConfig(
                    "store_id must not be blank".to_string(),
                ))
            }
            None => load_or_create_store_id(&self.wal_dir)?,
        };
        let snapshot_dir = self
            .snapshot_dir
            .unwrap_or_else(|| self.wal_dir.join("snapshots"));

        Ok(WalConfig {
            wal_dir: self.wal_dir,
            snapshot_dir,
            store_id,
            max_segment_bytes: self.max_segment_bytes,
            queue_capacity: self.queue_capacity,
            batch_buffer_bytes: self.batch_buffer_bytes,
            sync_policy: self.sync_policy,
            sync_interval: self.sync_interval,
            idle_poll_interval: self.idle_poll_interval,
            sync_bootstrap_on_open: self.sync_bootstrap_on_open,
            recover_value_store_on_open: self.recover_value_store_on_open,
            compress_retired_segments: self.compress_retired_segments,
            observer: self.observer,
        })
    }
}

/// Read the store id persisted in `wal_dir`, creating it if absent.
pub fn load_or_create_store_id(wal_dir: &Path) -> WalResult<String> {
    fs::create_dir_all(wal_dir)?;
    let path = wal_dir.join(STORE_ID_FILE);
    if path.exists() {
        let id = fs::read_to_string(&path)?.trim().to_string();
        if !id.is_empty() {
            return Ok(id);
        }
    }
    let id = Uuid::new_v4().to_string();
    fs::write(&path, &id)?;
    info!(store_id = %id, path = %path.display(), "Generated WAL store id");
    Ok(id)
}
