// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Segment management
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Each segment is an append-only file named `wal-{sequence:08}-{first_id}.v1`,
// gaining a `.gz` suffix once compressed. The first frame of every segment is
// a header carrying the authoritative sequence number. Segments are rotated
// when the next frame would push them past the configured maximum size.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use flate2::read::GzDecoder;
use tracing::{debug, error, info, warn};

use crate::error::{WalError, WalResult};
use crate::frame::{
    encode_frame, FramePayload, FrameRead, FrameReader, SegmentHeader, ENGINE_TAG,
    FORMAT_VERSION,
};
use crate::observer::WalObserver;

/// The prefix used for segment file names.
pub const SEGMENT_PREFIX: &str = "wal-";

/// The extension of a raw segment (also the format version marker).
pub const SEGMENT_EXTENSION: &str = "v1";

/// Suffix appended to a segment once it has been compressed.
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Byte source for a segment, raw or gzip-decoded.
pub type SegmentSource = Box<dyn Read + Send>;

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// The fields encoded in a segment file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentName {
    /// Sequence number from the file name.
    pub sequence: u64,
    /// First minted id, absent for the legacy `wal-{sequence}.v1` form.
    pub first_id: Option<i64>,
    /// Whether the file is the gzip twin.
    pub compressed: bool,
}

/// Build the file name of a raw segment.
///
/// Format: `wal-00000001-42.v1`
pub fn segment_filename(sequence: u64, first_id: i64) -> String {
    format!("{SEGMENT_PREFIX}{sequence:08}-{first_id}.{SEGMENT_EXTENSION}")
}

/// Build the full path of a raw segment in the given WAL directory.
pub fn segment_path(wal_dir: &Path, sequence: u64, first_id: i64) -> PathBuf {
    wal_dir.join(segment_filename(sequence, first_id))
}

/// The `.gz` twin of a raw segment path.
pub fn compressed_path(raw: &Path) -> PathBuf {
    let mut name = raw.as_os_str().to_os_string();
    name.push(COMPRESSED_SUFFIX);
    PathBuf::from(name)
}

/// Parse a segment file name.
///
/// Returns `None` if the name does not match either the current or the
/// legacy pattern.
pub fn parse_segment_filename(name: &str) -> Option<SegmentName> {
    let stripped = name.strip_prefix(SEGMENT_PREFIX)?;
    let (stripped, compressed) = match stripped.strip_suffix(COMPRESSED_SUFFIX) {
        Some(rest) => (rest, true),
        None => (stripped, false),
    };
    let stem = stripped.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;

    let (sequence_str, first_id) = match stem.split_once('-') {
        Some((sequence, first_id)) => (sequence, Some(first_id.parse::<i64>().ok()?)),
        None => (stem, None),
    };
    if sequence_str.is_empty() || !sequence_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(SegmentName {
        sequence: sequence_str.parse::<u64>().ok()?,
        first_id,
        compressed,
    })
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Metadata about a single segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// The full path to the segment file on disk.
    pub path: PathBuf,

    /// Sequence declared in the header frame, or 0 if the header is
    /// unreadable.
    pub sequence: u64,

    /// Fields parsed from the file name.
    pub name: SegmentName,

    /// Current file size in bytes.
    pub file_size: u64,
}

impl SegmentInfo {
    /// Whether the segment is stored gzip-compressed.
    pub fn is_compressed(&self) -> bool {
        self.name.compressed
    }

    /// First minted id, when the file name carries it.
    pub fn first_id(&self) -> Option<i64> {
        self.name.first_id
    }

    /// Open the segment's frame stream, decompressing transparently.
    pub fn open_frames(&self) -> io::Result<FrameReader<SegmentSource>> {
        open_segment_frames(&self.path, self.is_compressed())
    }
}

impl PartialOrd for SegmentInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.sequence, self.name.sequence, &self.path).cmp(&(
            other.sequence,
            other.name.sequence,
            &other.path,
        ))
    }
}

/// Open a frame reader over a segment file.
pub fn open_segment_frames(path: &Path, compressed: bool) -> io::Result<FrameReader<SegmentSource>> {
    let file = BufReader::new(File::open(path)?);
    let source: SegmentSource = if compressed {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(FrameReader::new(source))
}

/// Read the header frame at the start of a segment.
///
/// Returns `Ok(None)` when the first frame is missing, corrupt, or not a
/// header.
pub fn read_segment_header(path: &Path, compressed: bool) -> io::Result<Option<SegmentHeader>> {
    let mut frames = open_segment_frames(path, compressed)?;
    match frames.next_frame()? {
        FrameRead::Frame(frame) => match frame.decode() {
            Ok(FramePayload::Header(header)) => Ok(Some(header)),
            _ => Ok(None),
        },
        FrameRead::End | FrameRead::Truncated(_) => Ok(None),
    }
}

/// A segment file identified by its name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub path: PathBuf,
    pub name: SegmentName,
}

impl SegmentFile {
    /// Open the segment's frame stream, decompressing transparently.
    pub fn open_frames(&self) -> io::Result<FrameReader<SegmentSource>> {
        open_segment_frames(&self.path, self.name.compressed)
    }
}

/// List segment files by name without opening them.
///
/// Non-segment files are ignored, as is a `.gz` whose raw twin still exists
/// (compression in flight). The result is in directory order.
pub fn list_segment_files(wal_dir: &Path) -> WalResult<Vec<SegmentFile>> {
    if !wal_dir.is_dir() {
        return Err(WalError::DirectoryNotFound(
            wal_dir.display().to_string(),
        ));
    }

    let mut candidates = Vec::new();
    let mut raw_names = HashSet::new();

    for dir_entry in fs::read_dir(wal_dir)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let name = file_name.to_string_lossy().into_owned();

        if let Some(parsed) = parse_segment_filename(&name) {
            if !parsed.compressed {
                raw_names.insert(name.clone());
            }
            candidates.push((dir_entry.path(), name, parsed));
        }
    }

    let files = candidates
        .into_iter()
        .filter(|(_, name, parsed)| {
            if !parsed.compressed {
                return true;
            }
            let raw_twin = &name[..name.len() - COMPRESSED_SUFFIX.len()];
            if raw_names.contains(raw_twin) {
                debug!(segment = %name, "Skipping compressed twin of raw segment");
                return false;
            }
            true
        })
        .map(|(path, _, name)| SegmentFile { path, name })
        .collect();
    Ok(files)
}

/// Scan a WAL directory and return metadata for all segment files, sorted
/// by declared sequence number (ascending).
///
/// Every segment's header frame is read to learn its sequence.
pub fn list_segments(wal_dir: &Path) -> WalResult<Vec<SegmentInfo>> {
    let files = list_segment_files(wal_dir)?;
    let mut segments = Vec::with_capacity(files.len());
    for SegmentFile { path, name } in files {
        let metadata = fs::metadata(&path)?;
        let sequence = match read_segment_header(&path, name.compressed) {
            Ok(Some(header)) => header.sequence,
            Ok(None) => {
                warn!(segment = %path.display(), "Segment header missing or corrupt");
                0
            }
            Err(e) => {
                warn!(segment = %path.display(), error = %e, "Segment header unreadable");
                0
            }
        };

        segments.push(SegmentInfo {
            path,
            sequence,
            name,
            file_size: metadata.len(),
        });
    }

    segments.sort();

    debug!(
        count = segments.len(),
        dir = %wal_dir.display(),
        "Discovered WAL segments"
    );

    Ok(segments)
}

/// The sequence number a newly opened WAL gives its first segment.
pub fn next_segment_sequence(wal_dir: &Path) -> WalResult<u64> {
    if !wal_dir.is_dir() {
        return Ok(1);
    }
    let highest = list_segments(wal_dir)?
        .iter()
        .map(|s| s.sequence.max(s.name.sequence))
        .max()
        .unwrap_or(0);
    Ok(highest + 1)
}

/// Whether the sorted segments form a contiguous run starting at 1.
pub fn has_sequence_gap(segments: &[SegmentInfo]) -> bool {
    segments
        .iter()
        .enumerate()
        .any(|(index, segment)| segment.sequence != index as u64 + 1)
}

// ---------------------------------------------------------------------------
// SegmentWriter
// ---------------------------------------------------------------------------

/// A segment that was flushed, forced and closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetiredSegment {
    /// Path of the raw segment file.
    pub path: PathBuf,
    /// Sequence number of the segment.
    pub sequence: u64,
    /// Highest id minted into the segment.
    pub last_id: i64,
}

struct OpenSegment {
    file: File,
    path: PathBuf,
    sequence: u64,
    /// Bytes written plus bytes still buffered.
    size: u64,
    last_id: i64,
    records: u64,
    /// Records written to the file since the last `sync_data`.
    unforced_records: u64,
    /// Bytes of any kind written since the last `sync_data`.
    dirty: bool,
}

/// Owns the open output segment. Used only by the writer thread.
pub struct SegmentWriter {
    wal_dir: PathBuf,
    store_id: String,
    max_segment_bytes: u64,
    next_sequence: u64,
    buffer: Vec<u8>,
    buffer_capacity: usize,
    /// Id of the first record in `buffer`, if it holds any.
    buffer_first_id: Option<i64>,
    buffered_records: u64,
    fail_on_deleted_segment: bool,
    current: Option<OpenSegment>,
    observer: Arc<dyn WalObserver>,
}

impl SegmentWriter {
    /// Create a writer whose first segment gets `next_sequence`. No file is
    /// created until the first append.
    pub fn new(
        wal_dir: impl AsRef<Path>,
        store_id: impl Into<String>,
        next_sequence: u64,
        max_segment_bytes: u64,
        buffer_capacity: usize,
        observer: Arc<dyn WalObserver>,
    ) -> Self {
        Self {
            wal_dir: wal_dir.as_ref().to_path_buf(),
            store_id: store_id.into(),
            max_segment_bytes,
            next_sequence,
            buffer: Vec::with_capacity(buffer_capacity),
            buffer_capacity,
            buffer_first_id: None,
            buffered_records: 0,
            fail_on_deleted_segment: false,
            current: None,
            observer,
        }
    }

    /// Treat removal of the open segment as fatal instead of moving the
    /// unflushed records to a new segment.
    pub fn fail_on_deleted_segment(mut self, fail: bool) -> Self {
        self.fail_on_deleted_segment = fail;
        self
    }

    /// Whether appending `frame_len` more bytes would overflow the open
    /// segment. A segment holding no records never rotates, so a frame
    /// larger than the limit still lands somewhere.
    pub fn needs_rotation(&self, frame_len: usize) -> bool {
        match &self.current {
            Some(segment) => {
                segment.records > 0
                    && segment.size + frame_len as u64 > self.max_segment_bytes
            }
            None => false,
        }
    }

    /// Append an encoded mint frame, opening a segment if none is open.
    pub fn append(&mut self, frame: &[u8], id: i64) -> io::Result<()> {
        let direct = frame.len() > self.buffer_capacity;
        if self.buffer.len() + frame.len() > self.buffer_capacity {
            self.flush()?;
        }
        if direct {
            self.ensure_segment_present()?;
        }
        if self.current.is_none() {
            self.open_segment(id)?;
        }

        let Some(segment) = self.current.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "no open segment"));
        };
        if direct {
            segment.file.write_all(frame)?;
            segment.unforced_records += 1;
            segment.dirty = true;
        } else {
            if self.buffer.is_empty() {
                self.buffer_first_id = Some(id);
            }
            self.buffer.extend_from_slice(frame);
            self.buffered_records += 1;
        }
        segment.size += frame.len() as u64;
        segment.last_id = id;
        segment.records += 1;
        Ok(())
    }

    /// Write buffered bytes to the segment file.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.ensure_segment_present()?;
        if let Some(segment) = self.current.as_mut() {
            segment.file.write_all(&self.buffer)?;
            segment.unforced_records += self.buffered_records;
            segment.dirty = true;
        }
        self.buffer.clear();
        self.buffer_first_id = None;
        self.buffered_records = 0;
        Ok(())
    }

    /// Flush and force the open segment to stable storage. Returns whether
    /// a sync ran: it is skipped when nothing was written since the last one.
    pub fn force(&mut self) -> io::Result<bool> {
        self.ensure_segment_present()?;
        self.flush()?;
        match self.current.as_mut() {
            Some(segment) if segment.dirty => {
                segment.file.sync_data()?;
                segment.dirty = false;
                segment.unforced_records = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Flush, force and close the open segment.
    pub fn retire(&mut self) -> io::Result<Option<RetiredSegment>> {
        self.force()?;
        let Some(segment) = self.current.take() else {
            return Ok(None);
        };
        info!(
            segment = %segment.path.display(),
            sequence = segment.sequence,
            bytes = segment.size,
            records = segment.records,
            "Retired WAL segment"
        );
        self.observer.segment_retired(&segment.path, segment.sequence);
        Ok(Some(RetiredSegment {
            path: segment.path,
            sequence: segment.sequence,
            last_id: segment.last_id,
        }))
    }

    /// Path of the open segment, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|s| s.path.as_path())
    }

    /// Check that the open segment file still exists.
    ///
    /// A segment removed from outside is replaced by a new one that receives
    /// the still-buffered records. Records already written to the removed
    /// file but never forced cannot be recovered, so that case fails, as
    /// does any removal when `fail_on_deleted_segment` is set.
    fn ensure_segment_present(&mut self) -> io::Result<()> {
        let Some(segment) = self.current.as_ref() else {
            return Ok(());
        };
        if segment.path.try_exists()? {
            return Ok(());
        }
        if self.fail_on_deleted_segment || segment.unforced_records > 0 {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("active WAL segment {} was removed", segment.path.display()),
            ));
        }

        error!(
            segment = %segment.path.display(),
            buffered_records = self.buffered_records,
            "Active WAL segment was removed; continuing in a new segment"
        );
        let last_id = segment.last_id;
        self.current = None;

        let Some(first_id) = self.buffer_first_id else {
            return Ok(());
        };
        self.open_segment(first_id)?;
        if let Some(segment) = self.current.as_mut() {
            segment.size += self.buffer.len() as u64;
            segment.records = self.buffered_records;
            segment.last_id = last_id;
        }
        Ok(())
    }

    fn open_segment(&mut self, first_id: i64) -> io::Result<()> {
        let sequence = self.next_sequence;
        let path = segment_path(&self.wal_dir, sequence, first_id);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        let header = FramePayload::Header(SegmentHeader {
            version: FORMAT_VERSION,
            store_id: self.store_id.clone(),
            engine: ENGINE_TAG.to_string(),
            created: Utc::now().timestamp(),
            sequence,
            first_id: Some(first_id),
        });
        let header = encode_frame(&header)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        file.write_all(&header)?;

        info!(segment = %path.display(), sequence, first_id, "Opened WAL segment");
        self.observer.segment_opened(&path, sequence);

        self.next_sequence += 1;
        self.current = Some(OpenSegment {
            file,
            path,
            sequence,
            size: header.len() as u64,
            last_id: first_id,
            records: 0,
            unforced_records: 0,
            dirty: true,
        });
        Ok(())
    }
}
