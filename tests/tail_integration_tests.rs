// SPDX-License-Identifier: Apache-2.0

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use stateful_tail::tail::persistence::LmdbOptions;
use stateful_tail::tail::{
    FileRecord, HandleCache, InMemoryOffsetStore, LifecycleEvent, LmdbOffsetStore, OffsetStore,
    ReadOptions, RecordConsumer, StatefulReader, TailConfig, TailEngine, WorkerPool,
};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Seen {
    start: u64,
    end: u64,
    payload: Vec<u8>,
}

#[derive(Default)]
struct Collect(Vec<Seen>);

impl RecordConsumer for Collect {
    fn accept(&mut self, record: &FileRecord) {
        self.0.push(Seen {
            start: record.start_offset(),
            end: record.end_offset(),
            payload: record.payload().to_vec(),
        });
    }
}

fn small_store_config() -> TailConfig {
    TailConfig {
        store_map_size: 10 * 1024 * 1024,
        ..Default::default()
    }
}

fn lmdb_options() -> LmdbOptions {
    LmdbOptions {
        map_size: 10 * 1024 * 1024,
        ..Default::default()
    }
}

fn append(path: &Path, content: &[u8]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(content).unwrap();
}

fn digits() -> Vec<u8> {
    (0..10).flat_map(|i| format!("{}\n", i).into_bytes()).collect()
}

#[test]
fn test_end_to_end_created_then_modified() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    append(&log, &digits());

    let reader =
        StatefulReader::open(dir.path().join("state"), &small_store_config(), Collect::default)
            .unwrap();
    let mut engine = reader.engine();

    engine.on_event(&LifecycleEvent::created(&log)).unwrap();
    let first = &engine.consumer().0;
    assert_eq!(first.len(), 10);
    for (i, seen) in first.iter().enumerate() {
        assert_eq!(seen.payload, format!("{}\n", i).into_bytes());
        assert_eq!((seen.start, seen.end), (2 * i as u64, 2 * i as u64 + 2));
    }
    assert_eq!(reader.store().get_offset(&log).unwrap(), 20);

    append(&log, &digits());
    engine.on_event(&LifecycleEvent::modified(&log)).unwrap();
    let all = &engine.consumer().0;
    assert_eq!(all.len(), 20);
    assert_eq!((all[10].start, all[10].end), (20, 22));
    assert_eq!(all[19].end, 40);
    assert_eq!(reader.store().get_offset(&log).unwrap(), 40);

    drop(engine);
    reader.close().unwrap();
}

#[test]
fn test_idempotent_partial_line() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    append(&log, b"a\nb\nc\nhalf");

    let reader = StatefulReader::with_store(
        Arc::new(InMemoryOffsetStore::new()),
        &TailConfig::default(),
        Collect::default,
    )
    .unwrap();
    let mut engine = reader.engine();

    engine.on_event(&LifecycleEvent::modified(&log)).unwrap();
    assert_eq!(engine.consumer().0.len(), 3);

    append(&log, b"-done\n");
    engine.on_event(&LifecycleEvent::modified(&log)).unwrap();

    let seen = &engine.consumer().0;
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[3].payload, b"half-done\n");
    assert_eq!((seen[3].start, seen[3].end), (6, 16));
    assert_eq!(
        seen.iter().filter(|s| s.payload.starts_with(b"half")).count(),
        1
    );
}

#[test]
fn test_truncation_resets_offset() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    append(&log, b"a long first line\n");

    let store = Arc::new(LmdbOffsetStore::open(dir.path().join("state"), &lmdb_options()).unwrap());
    let mut engine = TailEngine::new(
        Arc::new(HandleCache::default()),
        store.clone(),
        Collect::default(),
        ReadOptions::default(),
    );
    engine.on_event(&LifecycleEvent::created(&log)).unwrap();
    assert_eq!(store.get_offset(&log).unwrap(), 18);

    // Replaced in place by something shorter
    File::create(&log).unwrap().write_all(b"short\n").unwrap();
    engine.on_event(&LifecycleEvent::modified(&log)).unwrap();

    let last = engine.consumer().0.last().unwrap();
    assert_eq!(last.payload, b"short\n");
    assert_eq!((last.start, last.end), (0, 6));
    assert_eq!(store.get_offset(&log).unwrap(), 6);
}

#[test]
fn test_forced_cut_on_oversized_record() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    let line: Vec<u8> = std::iter::repeat_n(b'x', 1000)
        .chain(std::iter::once(b'\n'))
        .collect();
    append(&log, &line);

    let max = 64;
    let mut engine = TailEngine::new(
        Arc::new(HandleCache::default()),
        Arc::new(InMemoryOffsetStore::new()),
        Collect::default(),
        ReadOptions {
            max_record_size: max,
            read_chunk_size: 100,
            ..Default::default()
        },
    );
    engine.on_event(&LifecycleEvent::created(&log)).unwrap();

    let seen = &engine.consumer().0;
    let len = line.len();
    assert_eq!(seen.len(), len.div_ceil(max));
    assert_eq!(seen.iter().map(|s| s.payload.len()).sum::<usize>(), len);
    assert!(seen.iter().all(|s| s.payload.len() <= max));

    let mut expected_start = 0;
    for s in seen {
        assert_eq!(s.start, expected_start);
        assert!(s.end > s.start);
        expected_start = s.end;
    }
    assert_eq!(expected_start, len as u64);
}

#[test]
fn test_delete_drains_then_clears() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    append(&log, b"first\n");

    let store = Arc::new(LmdbOffsetStore::open(dir.path().join("state"), &lmdb_options()).unwrap());
    let handles = Arc::new(HandleCache::default());
    let mut engine = TailEngine::new(
        handles.clone(),
        store.clone(),
        Collect::default(),
        ReadOptions::default(),
    );
    engine.on_event(&LifecycleEvent::created(&log)).unwrap();

    // No Modified event for this append
    append(&log, b"second\nthird\n");
    std::fs::remove_file(&log).unwrap();
    engine.on_event(&LifecycleEvent::deleted(&log)).unwrap();

    let payloads: Vec<&[u8]> = engine
        .consumer()
        .0
        .iter()
        .map(|s| s.payload.as_slice())
        .collect();
    assert_eq!(payloads, vec![b"first\n".as_ref(), b"second\n", b"third\n"]);
    assert_eq!(store.get_offset(&log).unwrap(), 0);
    assert!(!handles.contains(&log));
    assert_eq!(handles.stats().open_handles(), 0);
}

#[test]
fn test_recreated_file_is_read_from_start() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    append(&log, b"before rotation\n");

    let reader = StatefulReader::with_store(
        Arc::new(InMemoryOffsetStore::new()),
        &TailConfig::default(),
        Collect::default,
    )
    .unwrap();
    let mut engine = reader.engine();
    engine.on_event(&LifecycleEvent::created(&log)).unwrap();

    // Rotated: tail written to the old incarnation, then a new file appears
    append(&log, b"late\n");
    std::fs::rename(&log, dir.path().join("app.log.1")).unwrap();
    append(&log, b"after\n");
    engine.on_event(&LifecycleEvent::recreated(&log)).unwrap();

    let seen = &engine.consumer().0;
    let payloads: Vec<&[u8]> = seen.iter().map(|s| s.payload.as_slice()).collect();
    assert_eq!(
        payloads,
        vec![b"before rotation\n".as_ref(), b"late\n", b"after\n"]
    );
    assert_eq!((seen[2].start, seen[2].end), (0, 6));
    assert_eq!(reader.store().get_offset(&log).unwrap(), 6);
}

#[test]
fn test_offsets_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state");
    let path = Path::new("/var/log/app.log");

    let store = LmdbOffsetStore::open(&state, &lmdb_options()).unwrap();
    store.set_offset(path, 4096).unwrap();
    store.close().unwrap();

    let store = LmdbOffsetStore::open(&state, &lmdb_options()).unwrap();
    assert_eq!(store.get_offset(path).unwrap(), 4096);
    store.delete_offset(path).unwrap();
    store.close().unwrap();

    let store = LmdbOffsetStore::open(&state, &lmdb_options()).unwrap();
    assert_eq!(store.get_offset(path).unwrap(), 0);
}

#[test]
fn test_restart_resumes_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state");
    let log = dir.path().join("app.log");
    append(&log, b"one\ntwo\n");

    let reader = StatefulReader::open(&state, &small_store_config(), Collect::default).unwrap();
    let mut engine = reader.engine();
    engine.on_event(&LifecycleEvent::created(&log)).unwrap();
    assert_eq!(engine.consumer().0.len(), 2);
    drop(engine);
    reader.close().unwrap();
    drop(reader);

    append(&log, b"three\n");

    let reader = StatefulReader::open(&state, &small_store_config(), Collect::default).unwrap();
    let mut engine = reader.engine();
    engine.on_event(&LifecycleEvent::modified(&log)).unwrap();

    let seen = &engine.consumer().0;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].payload, b"three\n");
    assert_eq!((seen[0].start, seen[0].end), (8, 14));
}

#[test]
fn test_active_handle_closed_once_under_eviction_pressure() {
    let dir = TempDir::new().unwrap();
    let handles = HandleCache::new(3, std::time::Duration::from_secs(60));

    let held: PathBuf = dir.path().join("held.log");
    append(&held, b"held\n");
    let lease = handles.lease(&held).unwrap().unwrap();
    let handle = lease.handle().clone();

    for i in 0..10 {
        let path = dir.path().join(format!("other-{}.log", i));
        append(&path, b"x\n");
        drop(handles.lease(&path).unwrap().unwrap());
    }
    assert!(!handle.is_closed());

    let closed_before = handles.stats().closed();
    drop(lease);
    assert!(handle.is_closed());
    assert_eq!(handles.stats().closed(), closed_before + 1);

    handles.close();
    assert_eq!(handles.stats().opened(), handles.stats().closed());
}

#[test]
fn test_workers_share_cache_and_store() {
    let dir = TempDir::new().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let reader = StatefulReader::open(dir.path().join("state"), &small_store_config(), move || {
        let sink = sink.clone();
        move |record: &FileRecord| {
            sink.lock()
                .unwrap()
                .push((record.path().to_path_buf(), record.start_offset()))
        }
    })
    .unwrap();

    let logs: Vec<PathBuf> = (0..8)
        .map(|i| dir.path().join(format!("svc-{}.log", i)))
        .collect();
    for log in &logs {
        append(log, &digits());
    }

    let pool = WorkerPool::spawn(&reader, 4, 16).unwrap();
    for log in &logs {
        pool.dispatch(LifecycleEvent::created(log)).unwrap();
    }
    for log in &logs {
        pool.dispatch(LifecycleEvent::modified(log)).unwrap();
    }
    pool.join().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 80);
    for log in &logs {
        let starts: Vec<u64> = seen
            .iter()
            .filter(|(path, _)| path == log)
            .map(|(_, start)| *start)
            .collect();
        // Per path: each range exactly once, in order
        assert_eq!(starts, (0..10).map(|i| i * 2).collect::<Vec<u64>>());
        assert_eq!(reader.store().get_offset(log).unwrap(), 20);
    }
    reader.close().unwrap();
}
