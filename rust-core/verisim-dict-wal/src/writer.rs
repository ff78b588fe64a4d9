// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Producer API and writer thread
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `DictionaryWal` is the producer-facing handle. Producers assign LSNs and
// enqueue encoded frames on a bounded channel; a single writer thread owns
// the segment file, forces it according to the configured `SyncPolicy`, and
// publishes the durability watermark through atomics and a condvar.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fs2::FileExt;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::compress::spawn_compression;
use crate::config::{SyncPolicy, WalConfig};
use crate::error::{WalError, WalResult};
use crate::frame::{encode_frame, FramePayload};
use crate::observer::WalObserver;
use crate::record::{Lsn, MintRecord, ValueKind, NO_LSN};
use crate::segment::{next_segment_sequence, SegmentWriter};

/// Name of the whole-directory lock file.
pub const LOCK_FILE: &str = "lock";

/// Non-blocking enqueue attempts before falling back to a blocking send.
const ENQUEUE_SPINS: usize = 100;

/// Upper bound on a single condvar wait in `await_durable`.
const DURABLE_WAIT_SLICE: Duration = Duration::from_millis(10);

/// An encoded mint frame travelling from a producer to the writer thread.
struct QueuedFrame {
    lsn: Lsn,
    id: i64,
    bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Watermarks and signals shared between producers and the writer thread.
struct Shared {
    last_appended: AtomicU64,
    last_forced: AtomicU64,
    /// Highest LSN any caller of `await_durable` is waiting for.
    force_requested: AtomicU64,
    closed: AtomicBool,
    /// Set once the writer thread has exited.
    stopped: AtomicBool,
    failure: OnceLock<Arc<io::Error>>,
    ack_lock: Mutex<()>,
    ack: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            last_appended: AtomicU64::new(NO_LSN),
            last_forced: AtomicU64::new(NO_LSN),
            force_requested: AtomicU64::new(NO_LSN),
            closed: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            failure: OnceLock::new(),
            ack_lock: Mutex::new(()),
            ack: Condvar::new(),
        }
    }

    fn last_forced(&self) -> Lsn {
        self.last_forced.load(Ordering::Acquire)
    }

    fn failure(&self) -> Option<WalError> {
        self.failure
            .get()
            .map(|cause| WalError::WriterFailed(Arc::clone(cause)))
    }

    /// Record the first fatal writer error. Later errors are dropped.
    fn fail(&self, cause: io::Error) {
        let _ = self.failure.set(Arc::new(cause));
        self.notify_all();
    }

    fn notify_all(&self) {
        let _guard = self.ack_lock.lock();
        self.ack.notify_all();
    }
}

/// Producer side of the queue. LSN assignment and enqueue happen under one
/// lock so queue order is LSN order.
struct Producer {
    sender: Option<SyncSender<QueuedFrame>>,
    last_assigned: Lsn,
}

// ---------------------------------------------------------------------------
// DictionaryWal
// ---------------------------------------------------------------------------

/// Write-ahead log for newly minted dictionary entries.
///
/// One instance per WAL directory; the directory lock is held until
/// [`close`](Self::close) or drop.
pub struct DictionaryWal {
    config: WalConfig,
    shared: Arc<Shared>,
    producer: Mutex<Producer>,
    writer: Mutex<Option<JoinHandle<()>>>,
    lock_file: Mutex<Option<File>>,
    has_initial_segments: bool,
}

impl DictionaryWal {
    /// Lock the WAL directory and start the writer thread.
    ///
    /// Fails with [`WalError::DirectoryLocked`] if another live instance
    /// holds the directory. Existing segments are never appended to; the
    /// first record after open starts a new segment.
    pub fn open(config: WalConfig) -> WalResult<Self> {
        fs::create_dir_all(config.wal_dir())?;
        fs::create_dir_all(config.snapshot_dir())?;
        let lock_file = acquire_lock(config.wal_dir())?;

        let next_sequence = next_segment_sequence(config.wal_dir())?;
        let has_initial_segments = next_sequence > 1;

        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity());
        let shared = Arc::new(Shared::new());
        let log_writer = LogWriter {
            segment: SegmentWriter::new(
                config.wal_dir(),
                config.store_id(),
                next_sequence,
                config.max_segment_bytes(),
                config.batch_buffer_bytes(),
                Arc::clone(config.observer()),
            )
            .fail_on_deleted_segment(config.sync_policy() == SyncPolicy::Always),
            shared: Arc::clone(&shared),
            policy: config.sync_policy(),
            sync_interval: config.sync_interval(),
            idle_poll: config.idle_poll_interval(),
            compress: config.compress_retired_segments(),
            observer: Arc::clone(config.observer()),
            compressions: Vec::new(),
            last_sync: Instant::now(),
        };
        let handle = thread::Builder::new()
            .name(format!("dict-wal-writer-{}", config.store_id()))
            .spawn(move || log_writer.run(receiver))?;

        info!(
            dir = %config.wal_dir().display(),
            store_id = %config.store_id(),
            next_sequence,
            sync_policy = %config.sync_policy(),
            "Opened value dictionary WAL"
        );

        Ok(Self {
            config,
            shared,
            producer: Mutex::new(Producer {
                sender: Some(sender),
                last_assigned: NO_LSN,
            }),
            writer: Mutex::new(Some(handle)),
            lock_file: Mutex::new(Some(lock_file)),
            has_initial_segments,
        })
    }

    /// Log a newly minted dictionary entry and return its LSN.
    ///
    /// Never waits for I/O; blocks only while the queue is full.
    pub fn log_mint(
        &self,
        id: i64,
        kind: ValueKind,
        lexical: &str,
        datatype: &str,
        language: &str,
        hash: i32,
    ) -> WalResult<Lsn> {
        self.ensure_open()?;

        let mut guard = self.producer.lock();
        let producer = &mut *guard;
        let Some(sender) = producer.sender.as_ref() else {
            return Err(self.closed_error());
        };

        let lsn = producer.last_assigned + 1;
        let record = MintRecord {
            lsn,
            id,
            kind,
            lexical: lexical.to_string(),
            datatype: datatype.to_string(),
            language: language.to_string(),
            hash,
        };
        let mut pending = Some(QueuedFrame {
            lsn,
            id,
            bytes: encode_frame(&FramePayload::Mint(record.into()))?,
        });

        for _ in 0..ENQUEUE_SPINS {
            let Some(frame) = pending.take() else {
                break;
            };
            match sender.try_send(frame) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    pending = Some(returned);
                    std::hint::spin_loop();
                }
                Err(TrySendError::Disconnected(_)) => return Err(self.closed_error()),
            }
        }
        if let Some(frame) = pending {
            sender.send(frame).map_err(|_| self.closed_error())?;
        }

        producer.last_assigned = lsn;
        Ok(lsn)
    }

    /// Block until every record up to `lsn` has been forced to disk.
    ///
    /// Returns at once for [`NO_LSN`] or an already durable LSN. There is no
    /// timeout; the call ends on durability, writer failure, or shutdown.
    pub fn await_durable(&self, lsn: Lsn) -> WalResult<()> {
        if lsn == NO_LSN || self.shared.last_forced() >= lsn {
            return Ok(());
        }
        if let Some(failure) = self.shared.failure() {
            return Err(failure);
        }

        self.shared.force_requested.fetch_max(lsn, Ordering::AcqRel);

        let mut guard = self.shared.ack_lock.lock();
        loop {
            if self.shared.last_forced() >= lsn {
                return Ok(());
            }
            if let Some(failure) = self.shared.failure() {
                return Err(failure);
            }
            if self.shared.stopped.load(Ordering::Acquire) {
                return Err(WalError::Closed);
            }
            self.shared.ack.wait_for(&mut guard, DURABLE_WAIT_SLICE);
        }
    }

    /// Drain the queue, force the last segment, stop the writer thread and
    /// release the directory lock.
    ///
    /// Idempotent. Returns the writer failure if one was recorded.
    pub fn close(&self) -> WalResult<()> {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            // Dropping the sender lets the writer drain and exit.
            self.producer.lock().sender.take();

            if let Some(handle) = self.writer.lock().take() {
                if handle.join().is_err() {
                    self.shared
                        .fail(io::Error::new(io::ErrorKind::Other, "WAL writer thread panicked"));
                }
            }

            self.lock_file.lock().take();

            info!(
                dir = %self.config.wal_dir().display(),
                last_forced_lsn = self.shared.last_forced(),
                "Closed value dictionary WAL"
            );
        }

        match self.shared.failure() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Whether segments existed in the directory before this instance
    /// opened it.
    pub fn has_initial_segments(&self) -> bool {
        self.has_initial_segments
    }

    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Highest LSN known to be on stable storage.
    pub fn last_forced_lsn(&self) -> Lsn {
        self.shared.last_forced()
    }

    /// Highest LSN written to the segment (possibly still buffered).
    pub fn last_appended_lsn(&self) -> Lsn {
        self.shared.last_appended.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> WalResult<()> {
        if let Some(failure) = self.shared.failure() {
            return Err(failure);
        }
        if self.is_closed() {
            return Err(WalError::Closed);
        }
        Ok(())
    }

    fn closed_error(&self) -> WalError {
        self.shared.failure().unwrap_or(WalError::Closed)
    }
}

impl Drop for DictionaryWal {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!(
                dir = %self.config.wal_dir().display(),
                error = %e,
                "WAL close on drop failed"
            );
        }
    }
}

impl std::fmt::Debug for DictionaryWal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictionaryWal")
            .field("wal_dir", &self.config.wal_dir())
            .field("last_appended_lsn", &self.last_appended_lsn())
            .field("last_forced_lsn", &self.last_forced_lsn())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Take the exclusive advisory lock on `<wal_dir>/lock`.
fn acquire_lock(wal_dir: &Path) -> WalResult<File> {
    let lock_path = wal_dir.join(LOCK_FILE);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    if lock_file.try_lock_exclusive().is_err() {
        return Err(WalError::DirectoryLocked(wal_dir.display().to_string()));
    }
    Ok(lock_file)
}

// ---------------------------------------------------------------------------
// Writer thread
// ---------------------------------------------------------------------------

/// State owned exclusively by the writer thread.
struct LogWriter {
    segment: SegmentWriter,
    shared: Arc<Shared>,
    policy: SyncPolicy,
    sync_interval: Duration,
    idle_poll: Duration,
    compress: bool,
    observer: Arc<dyn WalObserver>,
    compressions: Vec<JoinHandle<()>>,
    last_sync: Instant,
}

impl LogWriter {
    fn run(mut self, receiver: Receiver<QueuedFrame>) {
        let result = self.write_loop(&receiver).and_then(|()| self.force());
        // Producers blocked on a full queue fail fast once the receiver is gone.
        drop(receiver);

        if let Err(e) = result {
            error!(error = %e, "WAL writer failed");
            self.shared.fail(e);
        }

        for handle in self.compressions.drain(..) {
            if handle.join().is_err() {
                warn!("WAL compression job panicked");
            }
        }

        self.shared.stopped.store(true, Ordering::Release);
        self.shared.notify_all();
        debug!("WAL writer thread exited");
    }

    fn write_loop(&mut self, receiver: &Receiver<QueuedFrame>) -> io::Result<()> {
        loop {
            match receiver.recv_timeout(self.idle_poll) {
                Ok(frame) => {
                    self.append(frame)?;
                    if self.should_force_after_append() {
                        self.force()?;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.should_force_when_idle() {
                        self.force()?;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    fn append(&mut self, frame: QueuedFrame) -> io::Result<()> {
        if self.segment.needs_rotation(frame.bytes.len()) {
            self.rotate()?;
        }
        self.segment.append(&frame.bytes, frame.id)?;
        self.shared
            .last_appended
            .store(frame.lsn, Ordering::Release);
        Ok(())
    }

    /// Force (publishing the watermark), then close the segment. The
    /// segment's own force inside `retire` finds nothing left to sync.
    fn rotate(&mut self) -> io::Result<()> {
        self.force()?;
        let Some(retired) = self.segment.retire()? else {
            return Ok(());
        };

        self.compressions.retain(|handle| !handle.is_finished());
        if self.compress {
            match spawn_compression(retired, Arc::clone(&self.observer)) {
                Ok(handle) => self.compressions.push(handle),
                Err(e) => warn!(error = %e, "Could not start WAL compression job"),
            }
        }
        Ok(())
    }

    /// Flush and force, then advance the durability watermark and wake
    /// waiters. No-op when nothing was appended since the last force.
    fn force(&mut self) -> io::Result<()> {
        let appended = self.shared.last_appended.load(Ordering::Acquire);
        if appended <= self.shared.last_forced() {
            self.last_sync = Instant::now();
            return Ok(());
        }

        self.segment.force()?;
        self.last_sync = Instant::now();
        self.shared.last_forced.store(appended, Ordering::Release);
        self.observer.forced(appended);
        self.shared.notify_all();
        debug!(lsn = appended, "Forced WAL segment");
        Ok(())
    }

    /// A caller is waiting for an LSN that is now appended.
    fn requested_force_reached(&self) -> bool {
        let requested = self.shared.force_requested.load(Ordering::Acquire);
        requested > self.shared.last_forced()
            && requested <= self.shared.last_appended.load(Ordering::Acquire)
    }

    fn interval_elapsed(&self) -> bool {
        self.last_sync.elapsed() >= self.sync_interval
    }

    fn should_force_after_append(&self) -> bool {
        match self.policy {
            SyncPolicy::Always => true,
            SyncPolicy::Interval => self.interval_elapsed() || self.requested_force_reached(),
            SyncPolicy::Commit => self.requested_force_reached(),
        }
    }

    fn should_force_when_idle(&self) -> bool {
        let pending =
            self.shared.force_requested.load(Ordering::Acquire) > self.shared.last_forced();
        match self.policy {
            SyncPolicy::Always => pending,
            SyncPolicy::Interval => pending || self.interval_elapsed(),
            SyncPolicy::Commit => pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::WalReader;
    use crate::segment::{list_segments, segment_path};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn config(dir: &Path, policy: SyncPolicy) -> WalConfig {
        WalConfig::builder(dir)
            .store_id("store-w")
            .sync_policy(policy)
            .build()
            .unwrap()
    }

    fn mint_iri(wal: &DictionaryWal, id: i64) -> Lsn {
        wal.log_mint(id, ValueKind::Iri, &format!("urn:v:{id}"), "", "", id as i32)
            .unwrap()
    }

    #[derive(Default)]
    struct ForceCounter {
        forces: AtomicUsize,
    }

    impl WalObserver for ForceCounter {
        fn forced(&self, _lsn: Lsn) {
            self.forces.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_lsns_start_at_one_and_increase() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        assert!(!wal.has_initial_segments());
        assert_eq!(mint_iri(&wal, 10), 1);
        assert_eq!(mint_iri(&wal, 11), 2);
        assert_eq!(mint_iri(&wal, 12), 3);
        wal.close().unwrap();
    }

    #[test]
    fn test_await_durable_advances_watermark() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        let lsn = mint_iri(&wal, 1);
        wal.await_durable(lsn).unwrap();
        assert!(wal.last_forced_lsn() >= lsn);
        assert!(wal.last_appended_lsn() >= wal.last_forced_lsn());
        wal.close().unwrap();
    }

    #[test]
    fn test_await_no_lsn_returns_immediately() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        wal.await_durable(NO_LSN).unwrap();
        assert_eq!(wal.last_forced_lsn(), NO_LSN);
        wal.close().unwrap();
    }

    #[test]
    fn test_always_policy_forces_every_record() {
        let dir = TempDir::new().unwrap();
        let counter = Arc::new(ForceCounter::default());
        let config = WalConfig::builder(dir.path())
            .store_id("store-w")
            .sync_policy(SyncPolicy::Always)
            .observer(counter.clone())
            .build()
            .unwrap();
        let wal = DictionaryWal::open(config).unwrap();
        for id in 0..5 {
            mint_iri(&wal, id);
        }
        wal.close().unwrap();
        assert_eq!(counter.forces.load(Ordering::SeqCst), 5);
        assert_eq!(wal.last_forced_lsn(), 5);
    }

    #[test]
    fn test_interval_policy_eventually_forces() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Interval)).unwrap();
        let lsn = mint_iri(&wal, 1);
        let deadline = Instant::now() + Duration::from_secs(5);
        while wal.last_forced_lsn() < lsn && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(wal.last_forced_lsn(), lsn);
        wal.close().unwrap();
    }

    fn counted_config(dir: &Path, policy: SyncPolicy, counter: &Arc<ForceCounter>) -> WalConfig {
        WalConfig::builder(dir)
            .store_id("store-w")
            .sync_policy(policy)
            .observer(counter.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_commit_policy_never_forces_without_waiter() {
        let dir = TempDir::new().unwrap();
        let counter = Arc::new(ForceCounter::default());
        let wal =
            DictionaryWal::open(counted_config(dir.path(), SyncPolicy::Commit, &counter)).unwrap();
        let mut last = NO_LSN;
        for id in 0..10 {
            last = mint_iri(&wal, id);
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while wal.last_appended_lsn() < last && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(wal.last_appended_lsn(), last);
        assert_eq!(counter.forces.load(Ordering::SeqCst), 0);
        assert_eq!(wal.last_forced_lsn(), NO_LSN);

        wal.await_durable(last).unwrap();
        assert_eq!(counter.forces.load(Ordering::SeqCst), 1);
        wal.close().unwrap();
        assert_eq!(counter.forces.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interval_policy_forces_without_waiter() {
        let dir = TempDir::new().unwrap();
        let counter = Arc::new(ForceCounter::default());
        let wal = DictionaryWal::open(counted_config(dir.path(), SyncPolicy::Interval, &counter))
            .unwrap();
        let lsn = mint_iri(&wal, 1);
        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.forces.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(counter.forces.load(Ordering::SeqCst), 1);
        assert_eq!(wal.last_forced_lsn(), lsn);
        wal.close().unwrap();
    }

    #[test]
    fn test_full_queue_blocks_then_delivers_in_order() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::builder(dir.path())
            .store_id("store-w")
            .queue_capacity(1)
            .build()
            .unwrap();
        let wal = Arc::new(DictionaryWal::open(config).unwrap());

        let producers: Vec<_> = (0..3i64)
            .map(|worker| {
                let wal = Arc::clone(&wal);
                thread::spawn(move || {
                    for n in 0..200 {
                        mint_iri(&wal, worker * 1_000 + n);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        wal.close().unwrap();

        let scan = WalReader::open(dir.path()).unwrap().scan();
        let lsns: Vec<Lsn> = scan.records.iter().map(|r| r.lsn).collect();
        assert_eq!(lsns, (1..=600).collect::<Vec<Lsn>>());
        assert!(scan.complete);
    }

    #[test]
    fn test_deleted_segment_continues_under_commit() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        let first = mint_iri(&wal, 1);
        wal.await_durable(first).unwrap();
        fs::remove_file(segment_path(dir.path(), 1, 1)).unwrap();

        let second = mint_iri(&wal, 2);
        wal.await_durable(second).unwrap();
        wal.close().unwrap();

        let segments = list_segments(dir.path()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].sequence, 2);
        assert_eq!(segments[0].first_id(), Some(2));

        let scan = WalReader::open(dir.path()).unwrap().scan();
        let lsns: Vec<Lsn> = scan.records.iter().map(|r| r.lsn).collect();
        assert_eq!(lsns, vec![second]);
        assert!(!scan.complete);
    }

    #[test]
    fn test_deleted_segment_fails_writer_under_always() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Always)).unwrap();
        let first = mint_iri(&wal, 1);
        wal.await_durable(first).unwrap();
        fs::remove_file(segment_path(dir.path(), 1, 1)).unwrap();

        let second = mint_iri(&wal, 2);
        assert!(matches!(
            wal.await_durable(second),
            Err(WalError::WriterFailed(_))
        ));
        assert!(wal.last_forced_lsn() < second);
        assert!(matches!(wal.close(), Err(WalError::WriterFailed(_))));
    }

    #[test]
    fn test_close_forces_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        for id in 0..20 {
            mint_iri(&wal, id);
        }
        wal.close().unwrap();
        wal.close().unwrap();
        assert!(wal.is_closed());
        assert_eq!(wal.last_forced_lsn(), 20);
        assert_eq!(wal.await_durable(20).ok(), Some(()));

        let result = wal.log_mint(99, ValueKind::Iri, "urn:late", "", "", 0);
        assert!(matches!(result, Err(WalError::Closed)));

        let scan = WalReader::open(dir.path()).unwrap().scan();
        assert_eq!(scan.records.len(), 20);
        assert!(scan.complete);
    }

    #[test]
    fn test_directory_lock_conflict() {
        let dir = TempDir::new().unwrap();
        let first = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        let second = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit));
        assert!(matches!(second, Err(WalError::DirectoryLocked(_))));

        first.close().unwrap();
        let third = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        third.close().unwrap();
    }

    #[test]
    fn test_reopen_starts_new_segment() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        mint_iri(&wal, 1);
        wal.close().unwrap();

        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        assert!(wal.has_initial_segments());
        mint_iri(&wal, 2);
        wal.close().unwrap();

        let segments = list_segments(dir.path()).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].sequence, 1);
        assert_eq!(segments[1].sequence, 2);
        assert_eq!(segments[1].first_id(), Some(2));
    }

    #[test]
    fn test_open_without_records_creates_no_segment() {
        let dir = TempDir::new().unwrap();
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        wal.close().unwrap();
        assert!(list_segments(dir.path()).unwrap().is_empty());
        assert!(dir.path().join("snapshots").is_dir());
        assert!(dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_writer_failure_reaches_every_caller() {
        let dir = TempDir::new().unwrap();
        let wal_dir = dir.path().join("wal");
        let wal = DictionaryWal::open(config(&wal_dir, SyncPolicy::Commit)).unwrap();

        // The first record has nowhere to create its segment.
        fs::remove_dir_all(&wal_dir).unwrap();
        let lsn = mint_iri(&wal, 1);

        assert!(matches!(
            wal.await_durable(lsn),
            Err(WalError::WriterFailed(_))
        ));
        assert!(matches!(
            wal.log_mint(2, ValueKind::Iri, "urn:v:2", "", "", 0),
            Err(WalError::WriterFailed(_))
        ));
        assert!(matches!(wal.close(), Err(WalError::WriterFailed(_))));
    }

    #[test]
    fn test_drop_closes_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        {
            let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
            mint_iri(&wal, 1);
        }
        let wal = DictionaryWal::open(config(dir.path(), SyncPolicy::Commit)).unwrap();
        wal.close().unwrap();
        let scan = WalReader::open(dir.path()).unwrap().scan();
        assert_eq!(scan.records.len(), 1);
    }
}
