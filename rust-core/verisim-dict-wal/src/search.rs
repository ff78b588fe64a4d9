// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Point search
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Looks up a single id without replaying the whole log: segments are indexed
// by their first minted id, the candidate segment is found by binary search,
// and only that segment is scanned. Any malformed data yields "not found".

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::WalConfig;
use crate::frame::{FramePayload, FrameRead};
use crate::observer::{NoopObserver, WalObserver};
use crate::record::{MintRecord, Term};
use crate::segment::{list_segment_files, SegmentFile};

/// Point lookups of minted ids.
#[derive(Debug, Clone)]
pub struct WalSearch {
    wal_dir: PathBuf,
    observer: Arc<dyn WalObserver>,
}

impl WalSearch {
    pub fn new(wal_dir: impl AsRef<Path>) -> Self {
        Self::with_observer(wal_dir, Arc::new(NoopObserver))
    }

    pub fn with_observer(wal_dir: impl AsRef<Path>, observer: Arc<dyn WalObserver>) -> Self {
        Self {
            wal_dir: wal_dir.as_ref().to_path_buf(),
            observer,
        }
    }

    /// Search the WAL described by `config`, reporting to its observer.
    pub fn from_config(config: &WalConfig) -> Self {
        Self::with_observer(config.wal_dir(), Arc::clone(config.observer()))
    }

    /// The term minted for `id`, if the log contains it.
    pub fn find_value_by_id(&self, id: i64) -> Option<Term> {
        self.find_record_by_id(id).map(|record| record.to_term())
    }

    /// The mint record for `id`, if the log contains it.
    pub fn find_record_by_id(&self, id: i64) -> Option<MintRecord> {
        let index = self.index()?;
        let position = index.partition_point(|(first_id, _)| *first_id <= id);
        if position == 0 {
            debug!(id, "Id precedes every WAL segment");
            return None;
        }
        let (_, segment) = &index[position - 1];
        self.scan_segment(segment, id)
    }

    /// Segments sorted by first minted id, taken from file names. Only
    /// segments with a name that lacks the id are opened. Segments with no
    /// mint frame are left out.
    fn index(&self) -> Option<Vec<(i64, SegmentFile)>> {
        let segments = list_segment_files(&self.wal_dir).ok()?;
        let mut index: Vec<(i64, SegmentFile)> = segments
            .into_iter()
            .filter_map(|segment| {
                let first_id = segment.name.first_id.or_else(|| first_minted_id(&segment))?;
                Some((first_id, segment))
            })
            .collect();
        index.sort_by_key(|(first_id, _)| *first_id);
        Some(index)
    }

    fn scan_segment(&self, segment: &SegmentFile, id: i64) -> Option<MintRecord> {
        self.observer.segment_scanned(&segment.path);
        debug!(segment = %segment.path.display(), id, "Searching WAL segment");

        let mut frames = segment.open_frames().ok()?;
        loop {
            let FrameRead::Frame(frame) = frames.next_frame().ok()? else {
                return None;
            };
            if let FramePayload::Mint(mint) = frame.decode().ok()? {
                if mint.id == id {
                    return Some(mint.into());
                }
            }
        }
    }
}

/// Decode frames until the first mint record. Used for segments whose file
/// name does not carry the first id.
fn first_minted_id(segment: &SegmentFile) -> Option<i64> {
    let mut frames = segment.open_frames().ok()?;
    loop {
        let FrameRead::Frame(frame) = frames.next_frame().ok()? else {
            return None;
        };
        if let FramePayload::Mint(mint) = frame.decode().ok()? {
            return Some(mint.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use crate::record::ValueKind;
    use crate::segment::SegmentWriter;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Touches {
        scanned: Mutex<Vec<PathBuf>>,
    }

    impl WalObserver for Touches {
        fn segment_scanned(&self, path: &Path) {
            self.scanned.lock().unwrap().push(path.to_path_buf());
        }
    }

    fn literal(lsn: u64, id: i64) -> MintRecord {
        MintRecord {
            lsn,
            id,
            kind: ValueKind::Literal,
            lexical: format!("label {id}"),
            datatype: String::new(),
            language: "de".to_string(),
            hash: 0,
        }
    }

    /// Three segments holding ids 100..110, 110..120, 120..130.
    fn populate(dir: &Path) {
        let mut writer = SegmentWriter::new(dir, "s", 1, u64::MAX, 8 * 1024, Arc::new(NoopObserver));
        for id in 100..130 {
            if id > 100 && id % 10 == 0 {
                writer.retire().unwrap();
            }
            let frame = encode_frame(&FramePayload::Mint(literal(id as u64, id).into())).unwrap();
            writer.append(&frame, id).unwrap();
        }
        writer.retire().unwrap();
    }

    #[test]
    fn test_finds_every_id_touching_one_segment() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let touches = Arc::new(Touches::default());
        let search = WalSearch::with_observer(dir.path(), touches.clone());

        for id in 100..130 {
            touches.scanned.lock().unwrap().clear();
            let term = search.find_value_by_id(id).unwrap();
            assert_eq!(
                term,
                Term::Literal {
                    label: format!("label {id}"),
                    datatype: None,
                    language: Some("de".to_string()),
                }
            );
            assert_eq!(touches.scanned.lock().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_id_below_smallest_is_not_found() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let touches = Arc::new(Touches::default());
        let search = WalSearch::with_observer(dir.path(), touches.clone());
        assert_eq!(search.find_value_by_id(99), None);
        assert!(touches.scanned.lock().unwrap().is_empty());
    }

    #[test]
    fn test_absent_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let search = WalSearch::new(dir.path());
        assert_eq!(search.find_record_by_id(5_000), None);
    }

    #[test]
    fn test_legacy_names_use_slow_path() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        for entry in fs::read_dir(dir.path()).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            // wal-00000002-110.v1 -> wal-00000002.v1
            let legacy = format!("{}.v1", &name[..12]);
            fs::rename(&path, dir.path().join(legacy)).unwrap();
        }

        let search = WalSearch::new(dir.path());
        let record = search.find_record_by_id(115).unwrap();
        assert_eq!(record.lsn, 115);
        assert_eq!(record.lexical, "label 115");
    }

    #[test]
    fn test_index_reads_names_not_contents() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        // Segments other than the target are never opened.
        fs::write(dir.path().join("wal-00000001-100.v1"), b"garbage").unwrap();
        fs::write(dir.path().join("wal-00000004-130.v1.gz"), b"not gzip").unwrap();
        let touches = Arc::new(Touches::default());
        let search = WalSearch::with_observer(dir.path(), touches.clone());

        let record = search.find_record_by_id(112).unwrap();
        assert_eq!(record.lexical, "label 112");
        assert_eq!(
            *touches.scanned.lock().unwrap(),
            vec![dir.path().join("wal-00000002-110.v1")]
        );
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let search = WalSearch::new(dir.path().join("absent"));
        assert_eq!(search.find_value_by_id(1), None);
    }

    #[test]
    fn test_corrupt_segment_is_not_found() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let target = dir.path().join("wal-00000003-120.v1");
        let mut bytes = fs::read(&target).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&target, bytes).unwrap();

        let search = WalSearch::new(dir.path());
        assert_eq!(search.find_value_by_id(129), None);
        assert!(search.find_value_by_id(125).is_some());
    }
}
