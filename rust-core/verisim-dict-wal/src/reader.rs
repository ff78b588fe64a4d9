// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Reader for crash recovery
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The `WalReader` walks segments in header-sequence order and yields mint
// records lazily. Truncation, corruption or a failed summary check ends the
// scan at the last good record and clears the completeness flag; they are
// never returned as errors, since a WAL must stay readable after a crash.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::WalResult;
use crate::frame::{FramePayload, FrameRead, FrameReader};
use crate::record::{Lsn, MintRecord, NO_LSN};
use crate::segment::{has_sequence_gap, list_segments, SegmentInfo, SegmentSource};

// ---------------------------------------------------------------------------
// ScanResult
// ---------------------------------------------------------------------------

/// Everything a full scan found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Mint records in log order.
    pub records: Vec<MintRecord>,
    /// Highest LSN among successfully decoded frames.
    pub last_valid_lsn: Lsn,
    /// False if any segment was missing, truncated, corrupt, or failed its
    /// summary check. Scanning stops at the first damaged frame.
    pub complete: bool,
}

// ---------------------------------------------------------------------------
// WalReader
// ---------------------------------------------------------------------------

/// The segment currently being decoded.
struct Cursor {
    frames: FrameReader<SegmentSource>,
    compressed: bool,
    /// CRC32 of the raw bytes read so far, checked against the summary.
    hasher: crc32fast::Hasher,
    summary_seen: bool,
}

/// Lazy reader over every mint record in a WAL directory.
pub struct WalReader {
    segments: Vec<SegmentInfo>,
    next_segment: usize,
    cursor: Option<Cursor>,
    last_valid_lsn: Lsn,
    missing_segments: bool,
    bad_summary: bool,
    corrupt: bool,
}

impl WalReader {
    /// Discover the segments of a WAL directory.
    ///
    /// A directory that does not exist is an empty, complete log.
    pub fn open(wal_dir: impl AsRef<Path>) -> WalResult<Self> {
        let wal_dir = wal_dir.as_ref();
        let segments = if wal_dir.is_dir() {
            list_segments(wal_dir)?
        } else {
            Vec::new()
        };

        let missing_segments = has_sequence_gap(&segments);
        if missing_segments {
            warn!(
                dir = %wal_dir.display(),
                sequences = ?segments.iter().map(|s| s.sequence).collect::<Vec<_>>(),
                "WAL segment sequence has gaps"
            );
        }

        Ok(Self {
            segments,
            next_segment: 0,
            cursor: None,
            last_valid_lsn: NO_LSN,
            missing_segments,
            bad_summary: false,
            corrupt: false,
        })
    }

    /// The segments this reader will visit, in order.
    pub fn segments(&self) -> &[SegmentInfo] {
        &self.segments
    }

    /// Highest LSN decoded so far.
    pub fn last_valid_lsn(&self) -> Lsn {
        self.last_valid_lsn
    }

    /// Whether everything read so far was intact. Only final once the
    /// iterator is exhausted.
    pub fn is_complete(&self) -> bool {
        !self.missing_segments && !self.bad_summary && !self.corrupt
    }

    /// Drain the reader.
    pub fn scan(mut self) -> ScanResult {
        let records: Vec<MintRecord> = self.by_ref().collect();
        debug!(
            records = records.len(),
            last_valid_lsn = self.last_valid_lsn,
            complete = self.is_complete(),
            "Scanned WAL"
        );
        ScanResult {
            records,
            last_valid_lsn: self.last_valid_lsn,
            complete: self.is_complete(),
        }
    }

    /// Open the next segment. Returns false when none are left.
    fn advance(&mut self) -> bool {
        let Some(segment) = self.segments.get(self.next_segment) else {
            return false;
        };
        self.next_segment += 1;

        match segment.open_frames() {
            Ok(frames) => {
                debug!(segment = %segment.path.display(), "Reading WAL segment");
                self.cursor = Some(Cursor {
                    frames,
                    compressed: segment.is_compressed(),
                    hasher: crc32fast::Hasher::new(),
                    summary_seen: false,
                });
                true
            }
            Err(e) => {
                warn!(segment = %segment.path.display(), error = %e, "Cannot open WAL segment");
                self.stop();
                false
            }
        }
    }

    /// Abandon the scan. Nothing after damaged data is trusted, so later
    /// segments are skipped too.
    fn stop(&mut self) {
        self.corrupt = true;
        self.cursor = None;
        self.next_segment = self.segments.len();
    }

    /// Close the current segment after a clean end or a summary frame.
    fn finish_segment(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            if cursor.compressed && !cursor.summary_seen {
                warn!("Compressed WAL segment has no summary frame");
                self.bad_summary = true;
            }
        }
    }
}

impl Iterator for WalReader {
    type Item = MintRecord;

    fn next(&mut self) -> Option<MintRecord> {
        loop {
            if self.cursor.is_none() && !self.advance() {
                return None;
            }
            let cursor = self.cursor.as_mut()?;

            let frame = match cursor.frames.next_frame() {
                Ok(FrameRead::Frame(frame)) => frame,
                Ok(FrameRead::End) => {
                    self.finish_segment();
                    continue;
                }
                Ok(FrameRead::Truncated(kind)) => {
                    warn!(
                        offset = cursor.frames.offset(),
                        truncation = ?kind,
                        "WAL segment ends in a partial or corrupt frame"
                    );
                    self.stop();
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "I/O error while reading WAL segment");
                    self.stop();
                    return None;
                }
            };

            let payload = match frame.decode() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Undecodable WAL frame payload");
                    self.stop();
                    return None;
                }
            };

            if let Some(lsn) = payload.lsn() {
                self.last_valid_lsn = self.last_valid_lsn.max(lsn);
            }
            match payload {
                FramePayload::Summary(summary) => {
                    let actual = cursor.hasher.clone().finalize();
                    cursor.summary_seen = true;
                    if actual != summary.crc32 {
                        warn!(
                            expected = summary.crc32,
                            actual,
                            "WAL segment summary checksum mismatch"
                        );
                        self.bad_summary = true;
                        self.stop();
                        return None;
                    }
                    self.finish_segment();
                }
                FramePayload::Mint(mint) => {
                    if cursor.compressed {
                        frame.hash_raw(&mut cursor.hasher);
                    }
                    return Some(mint.into());
                }
                FramePayload::Header(_) | FramePayload::Unknown => {
                    if cursor.compressed {
                        frame.hash_raw(&mut cursor.hasher);
                    }
                }
            }
        }
    }
}
