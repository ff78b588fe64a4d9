// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the value dictionary WAL

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use verisim_dict_wal::frame::{encode_frame, FramePayload, FrameRead, FrameReader};
use verisim_dict_wal::{
    DictionaryWal, MintRecord, SyncPolicy, ValueKind, WalConfig, WalReader, WalSearch,
};

fn literal(id: i64) -> MintRecord {
    MintRecord {
        lsn: id as u64 + 1,
        id,
        kind: ValueKind::Literal,
        lexical: format!("Benchmark literal number {id}"),
        datatype: String::new(),
        language: "en".to_string(),
        hash: id as i32,
    }
}

fn populated_wal(records: i64, max_segment_bytes: u64) -> TempDir {
    let dir = TempDir::new().unwrap();
    let config = WalConfig::builder(dir.path())
        .store_id("bench")
        .max_segment_bytes(max_segment_bytes)
        .build()
        .unwrap();
    let wal = DictionaryWal::open(config).unwrap();
    for id in 0..records {
        wal.log_mint(id, ValueKind::Iri, &format!("urn:bench:{id}"), "", "", 0)
            .unwrap();
    }
    wal.close().unwrap();
    dir
}

// ============================================================================
// Frame Codec Benchmarks
// ============================================================================

fn bench_frame_codec(c: &mut Criterion) {
    let payload = FramePayload::Mint(literal(1_000_000).into());
    let bytes = encode_frame(&payload).unwrap();

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("encode_mint", |b| {
        b.iter(|| black_box(encode_frame(black_box(&payload)).unwrap()))
    });

    group.bench_function("decode_mint", |b| {
        b.iter(|| {
            let mut frames = FrameReader::new(black_box(bytes.as_slice()));
            match frames.next_frame().unwrap() {
                FrameRead::Frame(frame) => black_box(frame.decode().unwrap()),
                other => panic!("unexpected {other:?}"),
            }
        })
    });

    group.finish();
}

// ============================================================================
// Writer Benchmarks
// ============================================================================

fn bench_log_mint(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer");
    group.throughput(Throughput::Elements(1));

    for policy in [SyncPolicy::Commit, SyncPolicy::Interval, SyncPolicy::Always] {
        group.bench_with_input(
            BenchmarkId::new("log_mint", policy),
            &policy,
            |b, &policy| {
                let dir = TempDir::new().unwrap();
                let config = WalConfig::builder(dir.path())
                    .store_id("bench")
                    .sync_policy(policy)
                    .build()
                    .unwrap();
                let wal = DictionaryWal::open(config).unwrap();
                let mut id = 0i64;
                b.iter(|| {
                    id += 1;
                    black_box(
                        wal.log_mint(id, ValueKind::Iri, "urn:bench:value", "", "", 0)
                            .unwrap(),
                    )
                });
                wal.close().unwrap();
            },
        );
    }

    group.bench_function("log_mint_await_durable", |b| {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::builder(dir.path())
            .store_id("bench")
            .sync_policy(SyncPolicy::Commit)
            .build()
            .unwrap();
        let wal = DictionaryWal::open(config).unwrap();
        let mut id = 0i64;
        b.iter(|| {
            id += 1;
            let lsn = wal
                .log_mint(id, ValueKind::Iri, "urn:bench:value", "", "", 0)
                .unwrap();
            wal.await_durable(lsn).unwrap();
        });
        wal.close().unwrap();
    });

    group.finish();
}

// ============================================================================
// Read Path Benchmarks
// ============================================================================

fn bench_read_path(c: &mut Criterion) {
    let dir = populated_wal(20_000, 256 * 1024);

    let mut group = c.benchmark_group("read");

    group.throughput(Throughput::Elements(20_000));
    group.bench_function("scan_20k", |b| {
        b.iter(|| black_box(WalReader::open(dir.path()).unwrap().scan()))
    });

    group.throughput(Throughput::Elements(1));
    let search = WalSearch::new(dir.path());
    group.bench_function("find_value_by_id", |b| {
        let mut id = 0i64;
        b.iter(|| {
            id = (id + 7_919) % 20_000;
            black_box(search.find_value_by_id(id))
        })
    });

    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(codec_benches, bench_frame_codec);

criterion_group!(writer_benches, bench_log_mint);

criterion_group!(read_benches, bench_read_path);

criterion_main!(codec_benches, writer_benches, read_benches);
