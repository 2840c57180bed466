use crate::memory::{MemoryStorage, MemoryStorageConfig};
use crate::sqlite::{SqliteStorage, SqliteStorageConfig};
use crate::{MetricStorage, StorageError};
use ometrics_common::types::{MetricKind, MetricSample};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::Span;

fn file_config(dir: &TempDir, store_interval: Duration, restore: bool) -> MemoryStorageConfig {
    MemoryStorageConfig {
        file_path: Some(dir.path().join("metrics.json")),
        store_interval,
        restore,
    }
}

fn sqlite_setup(busy_timeout: Duration) -> (TempDir, SqliteStorage, SqliteStorageConfig) {
    let dir = TempDir::new().unwrap();
    let config = SqliteStorageConfig {
        path: dir.path().join("metrics.db"),
        busy_timeout,
        source: "test".to_string(),
    };
    let storage = SqliteStorage::open(&config).unwrap();
    (dir, storage, config)
}

fn engines() -> Vec<(TempDir, Box<dyn MetricStorage>)> {
    let (dir, sqlite, _) = sqlite_setup(Duration::from_secs(1));
    vec![
        (TempDir::new().unwrap(), Box::new(MemoryStorage::in_memory())),
        (dir, Box::new(sqlite)),
    ]
}

#[test]
fn counter_accumulates_deltas() {
    for (_dir, storage) in engines() {
        for delta in [5, -2, 10] {
            storage.update_counter("PollCount", delta).unwrap();
        }
        assert_eq!(storage.get_counter_value("PollCount").unwrap(), 13);
    }
}

#[test]
fn gauge_keeps_last_write() {
    for (_dir, storage) in engines() {
        storage.update_gauge("Alloc", 1.5).unwrap();
        storage.update_gauge("Alloc", 2.5).unwrap();
        assert_eq!(storage.get_gauge_value("Alloc").unwrap(), 2.5);
    }
}

#[test]
fn gauge_and_counter_with_same_name_are_independent() {
    for (_dir, storage) in engines() {
        storage.update_gauge("Shared", 0.5).unwrap();
        storage.update_counter("Shared", 7).unwrap();
        assert_eq!(storage.get_gauge_value("Shared").unwrap(), 0.5);
        assert_eq!(storage.get_counter_value("Shared").unwrap(), 7);

        let all = storage.get_all_values().unwrap();
        assert_eq!(all.gauges.get("Shared"), Some(&0.5));
        assert_eq!(all.counters.get("Shared"), Some(&7));
    }
}

#[test]
fn unknown_metric_is_not_found() {
    for (_dir, storage) in engines() {
        let err = storage.get_gauge_value("Missing").unwrap_err();
        assert!(matches!(
            err,
            StorageError::NotFound {
                kind: MetricKind::Gauge,
                ..
            }
        ));
        assert!(storage.get_counter_value("Missing").unwrap_err().is_not_found());
    }
}

#[test]
fn get_all_values_is_idempotent() {
    for (_dir, storage) in engines() {
        storage.update_gauge("A", 1.0).unwrap();
        storage.update_gauge("A", 4.0).unwrap();
        storage.update_gauge("B", 2.0).unwrap();
        storage.update_counter("C", 3).unwrap();
        storage.update_counter("C", 3).unwrap();

        let first = storage.get_all_values().unwrap();
        let second = storage.get_all_values().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first.gauges.get("A"), Some(&4.0));
        assert_eq!(first.counters.get("C"), Some(&6));
    }
}

#[test]
fn batch_update_applies_mixed_kinds() {
    for (_dir, storage) in engines() {
        let batch = vec![
            MetricSample::gauge("Alloc", 10.0),
            MetricSample::counter("PollCount", 1),
            MetricSample::counter("PollCount", 2),
            MetricSample::gauge("Alloc", 11.0),
        ];
        storage.update_metrics(&batch).unwrap();
        assert_eq!(storage.get_gauge_value("Alloc").unwrap(), 11.0);
        assert_eq!(storage.get_counter_value("PollCount").unwrap(), 3);
    }
}

#[test]
fn ping_reports_healthy() {
    for (_dir, storage) in engines() {
        storage.ping().unwrap();
    }
}

#[test]
fn non_finite_gauge_is_rejected() {
    for (_dir, storage) in engines() {
        storage.update_gauge("Alloc", 1.0).unwrap();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = storage.update_gauge("Alloc", value).unwrap_err();
            assert!(err.is_invalid(), "expected invalid, got {err}");
        }
        assert_eq!(storage.get_gauge_value("Alloc").unwrap(), 1.0);
    }
}

#[test]
fn concurrent_writers_accumulate_counters() {
    const THREADS: usize = 8;
    const UPDATES: usize = 200;

    for (_dir, storage) in engines() {
        let storage = &*storage;
        std::thread::scope(|scope| {
            for t in 0..THREADS {
                scope.spawn(move || {
                    for i in 0..UPDATES {
                        storage.update_counter("c", 1).unwrap();
                        storage.update_gauge(&format!("g{t}"), i as f64).unwrap();
                    }
                });
            }
            for _ in 0..2 {
                scope.spawn(move || {
                    for _ in 0..50 {
                        match storage.get_all_values() {
                            Ok(all) => {
                                if let Some(c) = all.counters.get("c") {
                                    assert!(*c <= (THREADS * UPDATES) as i64);
                                }
                            }
                            Err(e) => assert!(e.is_not_found(), "unexpected error {e}"),
                        }
                    }
                });
            }
        });

        assert_eq!(storage.get_counter_value("c").unwrap(), (THREADS * UPDATES) as i64);
        let all = storage.get_all_values().unwrap();
        for t in 0..THREADS {
            assert_eq!(all.gauges.get(&format!("g{t}")), Some(&((UPDATES - 1) as f64)));
        }
    }
}

#[test]
fn batch_with_bad_entry_keeps_the_rest() {
    for (_dir, storage) in engines() {
        let err = storage
            .update_metrics(&[
                MetricSample::counter("PollCount", 2),
                MetricSample::gauge("Bad", f64::NAN),
                MetricSample::gauge("Alloc", 4.0),
            ])
            .unwrap_err();
        assert!(matches!(&err, StorageError::Batch(errors) if errors.len() == 1));
        assert!(err.is_invalid());
        assert_eq!(storage.get_counter_value("PollCount").unwrap(), 2);
        assert_eq!(storage.get_gauge_value("Alloc").unwrap(), 4.0);
        assert!(storage.get_gauge_value("Bad").unwrap_err().is_not_found());
    }
}

#[test]
fn batch_error_classification_looks_inside() {
    let batch = StorageError::Batch(vec![
        StorageError::NotFound {
            kind: MetricKind::Counter,
            name: "x".into(),
        },
        StorageError::ResourceBusy("database is locked".into()),
    ]);
    assert!(batch.is_busy());
    assert!(batch.is_not_found());
    assert!(batch.to_string().contains("2 batch update(s) failed"));
    assert!(!StorageError::ResourceBusy("x".into()).is_not_found());
}

#[test]
fn flush_and_restore_round_trip() {
    let dir = TempDir::new().unwrap();
    let storage = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), false));
    storage.update_gauge("Alloc", 3.25).unwrap();
    storage.update_gauge("RandomValue", 0.125).unwrap();
    storage.update_counter("PollCount", 42).unwrap();
    storage.flush().unwrap();

    let restored = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), true));
    assert_eq!(restored.get_all_values().unwrap(), storage.get_all_values().unwrap());

    // Restored counters are set, not added to.
    restored.update_counter("PollCount", 1).unwrap();
    assert_eq!(restored.get_counter_value("PollCount").unwrap(), 43);
}

#[test]
fn snapshot_file_uses_kind_name_value_entries() {
    let dir = TempDir::new().unwrap();
    let storage = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), false));
    storage.update_counter("PollCount", 2).unwrap();
    storage.flush().unwrap();

    let body = std::fs::read_to_string(dir.path().join("metrics.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{"kind": "counter", "name": "PollCount", "value": 2}])
    );
    assert!(!dir.path().join("metrics.json.tmp").exists());
}

#[test]
fn restore_ignores_missing_file() {
    let dir = TempDir::new().unwrap();
    let storage = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), true));
    assert!(storage.get_all_values().unwrap().is_empty());
    storage.restore().unwrap();
}

#[test]
fn restore_rejects_corrupt_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("metrics.json"), b"{not json").unwrap();
    let storage = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), false));
    assert!(matches!(storage.restore(), Err(StorageError::Snapshot(_))));

    // Construction with restore logs the failure and starts empty.
    let storage = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), true));
    assert!(storage.get_all_values().unwrap().is_empty());
}

#[test]
fn restore_skips_bad_entries() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("metrics.json"),
        br#"[{"kind":"gauge","name":"bad","value":null},
             {"kind":"summary","name":"odd","value":1},
             {"kind":"gauge","name":"Alloc","value":2.5},
             {"kind":"counter","name":"PollCount","value":42}]"#,
    )
    .unwrap();

    let storage = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), true));
    assert_eq!(storage.get_counter_value("PollCount").unwrap(), 42);
    assert_eq!(storage.get_gauge_value("Alloc").unwrap(), 2.5);
    assert!(storage.get_gauge_value("bad").unwrap_err().is_not_found());
    assert_eq!(storage.get_all_values().unwrap().len(), 2);
}

#[test]
fn rejected_gauge_never_reaches_the_snapshot() {
    let dir = TempDir::new().unwrap();
    let storage = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), false));
    storage.update_counter("PollCount", 42).unwrap();
    assert!(storage.update_gauge("bad", f64::NAN).is_err());
    storage.flush().unwrap();

    let restored = MemoryStorage::new(file_config(&dir, Duration::from_secs(300), true));
    assert_eq!(restored.get_all_values().unwrap(), storage.get_all_values().unwrap());
    assert_eq!(restored.get_counter_value("PollCount").unwrap(), 42);
}

#[test]
fn zero_interval_flushes_after_each_update() {
    let dir = TempDir::new().unwrap();
    let storage = MemoryStorage::new(file_config(&dir, Duration::ZERO, false));
    storage.update_gauge("Alloc", 9.0).unwrap();

    let restored = MemoryStorage::new(file_config(&dir, Duration::ZERO, true));
    assert_eq!(restored.get_gauge_value("Alloc").unwrap(), 9.0);
}

#[tokio::test]
async fn zero_interval_spawns_no_flush_loop() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::new(file_config(&dir, Duration::ZERO, false)));
    assert!(storage
        .spawn_flush_loop(CancellationToken::new(), Span::none())
        .is_none());
}

#[tokio::test]
async fn flush_loop_writes_on_cancel() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::new(file_config(&dir, Duration::from_secs(3600), false)));
    let cancel = CancellationToken::new();
    let handle = storage
        .spawn_flush_loop(cancel.clone(), Span::none())
        .unwrap();

    storage.update_counter("PollCount", 5).unwrap();
    assert!(!dir.path().join("metrics.json").exists());

    cancel.cancel();
    handle.await.unwrap();

    let restored = MemoryStorage::new(file_config(&dir, Duration::from_secs(3600), true));
    assert_eq!(restored.get_counter_value("PollCount").unwrap(), 5);
}

#[tokio::test]
async fn flush_loop_writes_periodically() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::new(file_config(&dir, Duration::from_millis(10), false)));
    let cancel = CancellationToken::new();
    let handle = storage
        .spawn_flush_loop(cancel.clone(), Span::none())
        .unwrap();

    storage.update_gauge("Alloc", 1.0).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(dir.path().join("metrics.json").exists());

    cancel.cancel();
    handle.await.unwrap();
}

#[test]
fn sqlite_keeps_one_row_per_update() {
    let (_dir, storage, config) = sqlite_setup(Duration::from_secs(1));
    storage.update_gauge("Alloc", 1.0).unwrap();
    storage.update_gauge("Alloc", 2.0).unwrap();
    storage.update_counter("PollCount", 4).unwrap();

    let conn = Connection::open(&config.path).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM metric_values", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 3);
    let source: String = conn
        .query_row("SELECT DISTINCT source FROM metric_values", [], |row| row.get(0))
        .unwrap();
    assert_eq!(source, "test");
}

#[test]
fn sqlite_batch_commits_together() {
    let (_dir, storage, config) = sqlite_setup(Duration::from_secs(1));
    storage
        .update_metrics(&[
            MetricSample::gauge("Alloc", 1.0),
            MetricSample::counter("PollCount", 1),
            MetricSample::gauge("Alloc", 3.0),
        ])
        .unwrap();
    assert_eq!(storage.get_gauge_value("Alloc").unwrap(), 3.0);

    let conn = Connection::open(&config.path).unwrap();
    let (rows, stamps): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COUNT(DISTINCT created_at) FROM metric_values",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((rows, stamps), (3, 1));
}

#[test]
fn sqlite_rejects_rows_with_both_values() {
    let (_dir, _storage, config) = sqlite_setup(Duration::from_secs(1));
    let conn = Connection::open(&config.path).unwrap();
    let inserted = conn.execute(
        "INSERT INTO metric_values (metric_name, gauge_value, counter_value, source, created_at)
         VALUES ('x', 1.0, 1, 'test', 0)",
        [],
    );
    assert!(inserted.is_err());
}

#[test]
fn sqlite_empty_store_get_all_is_not_found() {
    let (_dir, storage, _) = sqlite_setup(Duration::from_secs(1));
    assert!(storage.get_all_values().unwrap_err().is_not_found());
}

#[test]
fn sqlite_reopen_keeps_history() {
    let (_dir, storage, config) = sqlite_setup(Duration::from_secs(1));
    storage.update_counter("PollCount", 2).unwrap();
    drop(storage);

    let reopened = SqliteStorage::open(&config).unwrap();
    reopened.update_counter("PollCount", 3).unwrap();
    assert_eq!(reopened.get_counter_value("PollCount").unwrap(), 5);
}

#[test]
fn sqlite_locked_database_is_busy() {
    let (_dir, storage, config) = sqlite_setup(Duration::ZERO);
    let holder = Connection::open(&config.path).unwrap();
    holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let err = storage.update_gauge("Alloc", 1.0).unwrap_err();
    assert!(err.is_busy(), "expected busy, got {err}");

    let err = storage
        .update_metrics(&[MetricSample::gauge("Alloc", 1.0), MetricSample::counter("PollCount", 1)])
        .unwrap_err();
    assert!(err.is_busy());

    holder.execute_batch("COMMIT;").unwrap();
    storage.update_gauge("Alloc", 1.0).unwrap();
}
