//! Pool lifecycle against a file-backed SQLite index.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use dicom_index_backend::{IndexBackend, SqliteBackend, TransactionMode};
use dicom_index_pool::{
    ConnectionsPool, ElasticStrategy, PoolConfig, PoolError, PoolKind, PoolStrategy,
};
use dicom_index_sql::ResourceLevel;
use serde_json::json;
use tempfile::TempDir;

/// A fresh database file; the directory must outlive the pool.
fn backend() -> (TempDir, Arc<dyn IndexBackend>) {
    let dir = tempfile::tempdir().unwrap();
    let backend = SqliteBackend::open(dir.path().join("index.db"));
    (dir, Arc::new(backend))
}

fn config(kind: PoolKind, size: usize) -> PoolConfig {
    PoolConfig::builder()
        .with_kind(kind)
        .with_connections_count(size)
        .with_max_connections_count(size)
        .with_housekeeping_tick(Duration::from_millis(10))
        .with_acquire_retry(Duration::from_millis(10))
        .build()
}

#[test]
fn test_open_twice_fails() {
    let (_dir, backend) = backend();
    let pool = ConnectionsPool::new(backend, config(PoolKind::Fixed, 2)).unwrap();

    pool.open().unwrap();
    assert!(matches!(pool.open(), Err(PoolError::BadSequenceOfCalls(_))));

    pool.close().unwrap();
    assert!(matches!(pool.close(), Err(PoolError::BadSequenceOfCalls(_))));
}

#[test]
fn test_reopen_after_close() {
    let (_dir, backend) = backend();
    let pool = ConnectionsPool::new(backend, config(PoolKind::Fixed, 2)).unwrap();

    pool.open().unwrap();
    pool.close().unwrap();
    pool.open().unwrap();
    assert!(pool.is_open());
    assert_eq!(pool.stats().total, 2);
    pool.close().unwrap();
}

#[test]
fn test_fixed_pool_opens_every_connection() {
    let (_dir, backend) = backend();
    let pool = ConnectionsPool::new(backend, config(PoolKind::Fixed, 3)).unwrap();
    pool.open().unwrap();

    let stats = pool.stats();
    assert_eq!(stats.kind, PoolKind::Fixed);
    assert!(stats.open);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.idle, 3);
    assert_eq!(stats.in_use, 0);

    pool.close().unwrap();
}

#[test]
fn test_fixed_close_with_connection_in_use() {
    let (_dir, backend) = backend();
    let pool = ConnectionsPool::new(backend, config(PoolKind::Fixed, 2)).unwrap();
    pool.open().unwrap();

    let held = pool.acquire().unwrap();
    let err = pool.close().unwrap_err();
    assert!(err.is_consistency_violation());

    // The pool stays open and the other connection still works
    assert!(pool.is_open());
    {
        let mut accessor = pool.accessor().unwrap();
        let count = accessor
            .transaction(TransactionMode::ReadOnly, |tx| {
                tx.get_resources_count(ResourceLevel::Patient)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    pool.release(held).unwrap();
    pool.close().unwrap();
    assert!(!pool.is_open());
    assert_eq!(pool.stats().total, 0);
}

#[test]
fn test_elastic_pool_grows_on_demand() {
    let (_dir, backend) = backend();
    let pool = ConnectionsPool::new(backend, config(PoolKind::Elastic, 3)).unwrap();
    pool.open().unwrap();
    assert_eq!(pool.stats().total, 1);

    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    let c = pool.acquire().unwrap();
    assert_eq!(pool.stats().total, 3);
    assert_eq!(pool.stats().in_use, 3);
    assert!(pool.try_acquire(Duration::from_millis(20)).unwrap().is_none());

    for connection in [a, b, c] {
        pool.release(connection).unwrap();
    }
    assert_eq!(pool.stats().idle, 3);
    pool.close().unwrap();
}

#[test]
fn test_elastic_waiter_receives_released_connection() {
    let (_dir, backend) = backend();
    let pool = Arc::new(ConnectionsPool::new(backend, config(PoolKind::Elastic, 1)).unwrap());
    pool.open().unwrap();

    let held = pool.acquire().unwrap();
    let held_id = held.id();
    let (started_tx, started_rx) = mpsc::channel();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            started_tx.send(()).unwrap();
            let connection = pool.acquire().unwrap();
            let id = connection.id();
            pool.release(connection).unwrap();
            id
        })
    };

    started_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(pool.stats().total, 1);

    pool.release(held).unwrap();
    assert_eq!(waiter.join().unwrap(), held_id);

    pool.close().unwrap();
}

#[test]
fn test_elastic_eviction_returns_capacity() {
    let (_dir, backend) = backend();
    let pool_config = PoolConfig::builder()
        .with_kind(PoolKind::Elastic)
        .with_max_connections_count(2)
        .with_max_connection_idle(Duration::from_millis(20))
        .with_housekeeping_delay(Duration::from_secs(3600))
        .build();
    let pool = ConnectionsPool::new(backend, pool_config).unwrap();
    pool.open().unwrap();

    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    pool.release(a).unwrap();
    pool.release(b).unwrap();
    assert_eq!(pool.stats().total, 2);

    thread::sleep(Duration::from_millis(50));
    pool.run_housekeeping();

    let stats = pool.stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.evicted, 2);

    // Capacity is available again
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    assert_eq!(pool.stats().total, 2);
    pool.release(a).unwrap();
    pool.release(b).unwrap();
    pool.close().unwrap();
}

#[test]
fn test_release_into_wrong_pool() {
    let (_dir, backend) = backend();
    let first = ConnectionsPool::new(Arc::clone(&backend), config(PoolKind::Fixed, 1)).unwrap();
    let second = ConnectionsPool::new(backend, config(PoolKind::Fixed, 1)).unwrap();
    first.open().unwrap();
    second.open().unwrap();

    let connection = first.acquire().unwrap();
    assert_eq!(connection.pool_id(), first.id());

    let err = second.release(connection).unwrap_err();
    assert!(err.is_consistency_violation());
    assert_eq!(second.stats().idle, 1);

    second.close().unwrap();
    // `first` lost its connection and can only be dropped
    assert!(first.close().is_err());
}

#[test]
fn test_pool_from_host_configuration() {
    let (_dir, backend) = backend();
    let section = json!({
        "EnableIndex": true,
        "DynamicIndexConnectionsPool": true,
        "MaximumIndexConnectionsCount": 4,
        "HousekeepingInterval": 30,
    });

    let pool_config = PoolConfig::from_json(&section).unwrap();
    assert_eq!(pool_config.kind, PoolKind::Elastic);

    let pool = ConnectionsPool::new(backend, pool_config).unwrap();
    pool.open().unwrap();
    assert_eq!(pool.stats().kind, PoolKind::Elastic);
    pool.close().unwrap();
}

#[test]
fn test_accessor_writes_are_visible_to_other_connections() {
    let (_dir, backend) = backend();
    let pool = ConnectionsPool::new(backend, config(PoolKind::Fixed, 2)).unwrap();
    pool.open().unwrap();

    let mut writer = pool.accessor().unwrap();
    writer
        .transaction(TransactionMode::ReadWrite, |tx| {
            let patient = tx.create_resource("patient", ResourceLevel::Patient)?;
            let study = tx.create_resource("study", ResourceLevel::Study)?;
            tx.set_parent(study, patient)
        })
        .unwrap();

    let mut reader = pool.accessor().unwrap();
    assert_ne!(reader.connection_id(), writer.connection_id());
    let studies = reader
        .transaction(TransactionMode::ReadOnly, |tx| {
            tx.get_all_public_ids(ResourceLevel::Study)
        })
        .unwrap();
    assert_eq!(studies, vec!["study".to_string()]);

    drop(writer);
    drop(reader);
    pool.close().unwrap();
}

#[test]
fn test_concurrent_accessors() {
    let (_dir, backend) = backend();
    let pool = Arc::new(ConnectionsPool::new(backend, config(PoolKind::Elastic, 3)).unwrap());
    pool.open().unwrap();

    let workers: Vec<_> = (0..6)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut accessor = pool.accessor().unwrap();
                accessor
                    .transaction(TransactionMode::ReadWrite, |tx| {
                        tx.create_resource(&format!("patient-{}", worker), ResourceLevel::Patient)
                    })
                    .unwrap();
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let mut accessor = pool.accessor().unwrap();
    let count = accessor
        .transaction(TransactionMode::ReadOnly, |tx| {
            tx.get_resources_count(ResourceLevel::Patient)
        })
        .unwrap();
    assert_eq!(count, 6);
    assert!(pool.stats().total <= 3);

    drop(accessor);
    pool.close().unwrap();
}

#[test]
fn test_custom_strategy() {
    let (_dir, backend) = backend();
    let strategy: Box<dyn PoolStrategy> = Box::new(ElasticStrategy::new(2).unwrap());
    let pool = ConnectionsPool::with_strategy(backend, strategy, PoolConfig::default()).unwrap();

    pool.open().unwrap();
    assert_eq!(pool.stats().kind, PoolKind::Elastic);
    pool.close().unwrap();
}
