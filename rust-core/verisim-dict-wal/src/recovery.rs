// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Recovery
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `replay` folds a scan into an id -> record dictionary (first writer wins)
// and carries the completeness verdict through unchanged. `bootstrap` applies
// the two boot-time switches of `WalConfig` around it.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::reader::WalReader;
use crate::record::{Lsn, MintRecord};

/// The dictionary rebuilt from a WAL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    /// Every minted id with the first record logged for it.
    pub dictionary: BTreeMap<i64, MintRecord>,
    /// Highest LSN the scan decoded.
    pub last_valid_lsn: Lsn,
    /// Completeness verdict of the underlying scan.
    pub complete: bool,
    /// Mint records dropped because their id was already present.
    pub duplicates: usize,
}

/// Rebuild the dictionary from a reader. Pure apart from logging.
pub fn replay(reader: WalReader) -> Recovery {
    let scan = reader.scan();
    let mut dictionary = BTreeMap::new();
    let mut duplicates = 0;

    for record in scan.records {
        match dictionary.entry(record.id) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(existing) => {
                duplicates += 1;
                warn!(
                    id = record.id,
                    kept_lsn = existing.get().lsn,
                    dropped_lsn = record.lsn,
                    "Duplicate mint record for id"
                );
            }
        }
    }

    if !scan.complete {
        warn!(
            entries = dictionary.len(),
            last_valid_lsn = scan.last_valid_lsn,
            "WAL replay is incomplete; the recovered dictionary may be missing entries"
        );
    }

    Recovery {
        dictionary,
        last_valid_lsn: scan.last_valid_lsn,
        complete: scan.complete,
        duplicates,
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Outcome of [`bootstrap`].
#[derive(Debug)]
pub enum Bootstrap {
    /// Recovery is disabled or the store already holds persisted values.
    Skipped,
    /// Replay finished before `bootstrap` returned.
    Ready(Recovery),
    /// Replay is running on a background thread.
    Pending(PendingRecovery),
}

/// Handle to a background replay.
#[derive(Debug)]
pub struct PendingRecovery {
    handle: JoinHandle<WalResult<Recovery>>,
}

impl PendingRecovery {
    /// Block until the replay finishes.
    pub fn wait(self) -> WalResult<Recovery> {
        self.handle.join().unwrap_or_else(|_| {
            Err(WalError::Io(io::Error::new(
                io::ErrorKind::Other,
                "WAL bootstrap thread panicked",
            )))
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Replay the WAL at open time when the store asks for it.
///
/// Runs only if `recover_value_store_on_open` is set and the store has no
/// persisted values. Replay happens inline when `sync_bootstrap_on_open` is
/// set, otherwise on a background thread.
pub fn bootstrap(config: &WalConfig, store_is_empty: bool) -> WalResult<Bootstrap> {
    if !config.recover_value_store_on_open() || !store_is_empty {
        return Ok(Bootstrap::Skipped);
    }

    let wal_dir = config.wal_dir().to_path_buf();
    if config.sync_bootstrap_on_open() {
        let recovery = replay(WalReader::open(&wal_dir)?);
        log_recovery(&recovery);
        return Ok(Bootstrap::Ready(recovery));
    }

    let handle = thread::Builder::new()
        .name(format!("dict-wal-bootstrap-{}", config.store_id()))
        .spawn(move || -> WalResult<Recovery> {
            let recovery = replay(WalReader::open(&wal_dir)?);
            log_recovery(&recovery);
            Ok(recovery)
        })?;
    Ok(Bootstrap::Pending(PendingRecovery { handle }))
}

fn log_recovery(recovery: &Recovery) {
    info!(
        entries = recovery.dictionary.len(),
        last_valid_lsn = recovery.last_valid_lsn,
        complete = recovery.complete,
        duplicates = recovery.duplicates,
        "Recovered value dictionary from WAL"
    );
}
