// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Retired segment compression
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A retired segment is streamed through gzip, a summary frame carrying the
// CRC32 of the raw bytes is appended, and the result is verified before the
// raw file is deleted. Failures leave the raw segment in place.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};

use crate::error::{WalError, WalResult};
use crate::frame::{encode_frame, FramePayload, SegmentSummary};
use crate::observer::WalObserver;
use crate::segment::{compressed_path, RetiredSegment};

const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Compress a retired raw segment into its `.gz` twin and delete the raw
/// file. Returns the path of the compressed segment.
pub fn compress_segment(raw: &Path, last_id: i64) -> WalResult<PathBuf> {
    let gz_path = compressed_path(raw);
    let mut source = BufReader::new(File::open(raw)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&gz_path)?), Compression::default());

    let mut hasher = crc32fast::Hasher::new();
    let mut raw_len: u64 = 0;
    let mut chunk = vec![0u8; COPY_CHUNK_BYTES];
    loop {
        let n = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&chunk[..n]);
        encoder.write_all(&chunk[..n])?;
        raw_len += n as u64;
    }

    let summary = encode_frame(&FramePayload::Summary(SegmentSummary {
        last_id,
        crc32: hasher.finalize(),
    }))?;
    encoder.write_all(&summary)?;
    let file = encoder
        .finish()?
        .into_inner()
        .map_err(|e| WalError::Io(e.into_error()))?;
    file.sync_all()?;
    drop(file);

    let expected = raw_len + summary.len() as u64;
    let actual = io::copy(
        &mut GzDecoder::new(BufReader::new(File::open(&gz_path)?)),
        &mut io::sink(),
    )?;
    if actual != expected {
        return Err(WalError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("compressed segment decodes to {actual} bytes, expected {expected}"),
        )));
    }

    fs::remove_file(raw)?;
    Ok(gz_path)
}

/// Compress a segment, containing any failure.
///
/// On failure the partial `.gz` is removed and the raw segment is kept.
pub fn compress_retired(segment: &RetiredSegment, observer: &dyn WalObserver) {
    match compress_segment(&segment.path, segment.last_id) {
        Ok(gz_path) => {
            info!(
                segment = %segment.path.display(),
                compressed = %gz_path.display(),
                "Compressed retired WAL segment"
            );
            observer.segment_compressed(&segment.path, &gz_path);
        }
        Err(e) => {
            let gz_path = compressed_path(&segment.path);
            if segment.path.exists() && gz_path.exists() {
                let _ = fs::remove_file(&gz_path);
            }
            warn!(
                segment = %segment.path.display(),
                error = %e,
                "WAL segment compression failed; keeping raw segment"
            );
            observer.compression_failed(&segment.path, &e.to_string());
        }
    }
}

/// Run [`compress_retired`] on its own thread.
pub fn spawn_compression(
    segment: RetiredSegment,
    observer: Arc<dyn WalObserver>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("dict-wal-compress-{}", segment.sequence))
        .spawn(move || compress_retired(&segment, observer.as_ref()))
}
