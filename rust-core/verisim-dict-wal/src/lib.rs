// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary Write-Ahead Log crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Makes the graph value dictionary crash-durable by logging every newly
// minted id -> term entry before it becomes visible. On startup the log is
// scanned to rebuild (or audit) the dictionary, and single ids can be looked
// up without a full replay.
//
// # Architecture
//
// Producers call `DictionaryWal::log_mint`, which assigns an LSN and enqueues
// an encoded frame on a bounded channel. One writer thread owns the open
// segment, appends frames through a write buffer, rotates segments by size,
// and forces them according to the `SyncPolicy`. Retired segments are
// gzip-compressed in the background with a trailing summary frame.
//
// ## On-disk frame format (integers little-endian)
//
// ```text
// [4 bytes: payload_length (u32)]
// [N bytes: payload]              -- compact JSON object + '\n', tag in "t"
// [4 bytes: crc32c(payload)]
// ```
//
// Segments are named `wal-{sequence:08}-{first_id}.v1` (`.v1.gz` once
// compressed). The first frame of a segment is always its header.
//
// ## Usage
//
// ```no_run
// use verisim_dict_wal::{replay, DictionaryWal, ValueKind, WalConfig, WalReader, WalSearch};
//
// let config = WalConfig::builder("/tmp/value-wal").build().unwrap();
// let wal = DictionaryWal::open(config).unwrap();
//
// let lsn = wal
//     .log_mint(42, ValueKind::Iri, "http://example.org/alice", "", "", 0)
//     .unwrap();
// wal.await_durable(lsn).unwrap();
// wal.close().unwrap();
//
// let recovery = replay(WalReader::open("/tmp/value-wal").unwrap());
// assert!(recovery.complete);
//
// let term = WalSearch::new("/tmp/value-wal").find_value_by_id(42);
// println!("{term:?}");
// ```

pub mod compress;
pub mod config;
pub mod error;
pub mod frame;
pub mod observer;
pub mod reader;
pub mod record;
pub mod recovery;
pub mod search;
pub mod segment;
pub mod writer;

// Re-export the primary public API for ergonomic imports.
pub use config::{SyncPolicy, WalConfig, WalConfigBuilder, DEFAULT_DIRECTORY_NAME};
pub use error::{WalError, WalResult};
pub use observer::{NoopObserver, WalObserver};
pub use reader::{ScanResult, WalReader};
pub use record::{Lsn, MintRecord, Term, ValueKind, NO_LSN};
pub use recovery::{bootstrap, replay, Bootstrap, PendingRecovery, Recovery};
pub use search::WalSearch;
pub use segment::SegmentInfo;
pub use writer::DictionaryWal;
