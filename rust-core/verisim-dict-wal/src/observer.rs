// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Instance-scoped observer hooks
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use std::fmt;
use std::path::Path;

use crate::record::Lsn;

/// Callbacks fired by one WAL instance (writer, compressor, search).
///
/// Every method has a no-op default. Hooks run on the thread that raised the
/// event (the writer thread, a compression thread, or the caller of a
/// search), so implementations must be cheap and must not block.
pub trait WalObserver: Send + Sync {
    /// A new segment file was created and its header written.
    fn segment_opened(&self, _path: &Path, _sequence: u64) {}

    /// A segment was flushed, forced and closed because it was full.
    fn segment_retired(&self, _path: &Path, _sequence: u64) {}

    /// Records up to `lsn` were forced to stable storage.
    fn forced(&self, _lsn: Lsn) {}

    /// A retired segment was replaced by its `.gz` twin.
    fn segment_compressed(&self, _raw: &Path, _compressed: &Path) {}

    /// Compressing a retired segment failed; the raw segment was kept.
    fn compression_failed(&self, _raw: &Path, _reason: &str) {}

    /// Point search opened a segment to look for an id.
    fn segment_scanned(&self, _path: &Path) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WalObserver for NoopObserver {}

impl fmt::Debug for dyn WalObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WalObserver")
    }
}
