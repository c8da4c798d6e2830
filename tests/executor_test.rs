/*!
 * Thread Pool Tests
 * Sizing, saturation, shutdown and termination of both executors
 */

use pc_sync::{PoolConfig, SimpleThreadPool, SyncError, TaskStatus, ThreadPool};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

/// Tracks how many tasks run at once and the highest value seen
#[derive(Default)]
struct Concurrency {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
#[serial]
fn test_simple_pool_busy_scenario() {
    let pool = SimpleThreadPool::new(PoolConfig::new(2, Duration::from_secs(5))).unwrap();
    let task = || thread::sleep(Duration::from_millis(500));

    assert!(pool.execute(task, Some(Duration::ZERO)).unwrap());
    assert!(pool.execute(task, Some(Duration::ZERO)).unwrap());
    // At capacity: busy, not rejected
    assert!(!pool.execute(task, Some(Duration::ZERO)).unwrap());
    assert_eq!(pool.pool_size(), 2);

    pool.shutdown();
    assert!(pool.await_termination(WAIT));
}

#[test]
#[serial]
fn test_simple_pool_never_exceeds_max() {
    let pool = SimpleThreadPool::new(PoolConfig::new(3, Duration::from_secs(5))).unwrap();
    let stats = Arc::new(Concurrency::default());
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..40 {
        let stats = stats.clone();
        let done = done.clone();
        let accepted = pool
            .execute(
                move || {
                    stats.enter();
                    thread::sleep(Duration::from_millis(2));
                    stats.exit();
                    done.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .unwrap();
        assert!(accepted);
        assert!(pool.pool_size() <= 3);
    }

    pool.shutdown();
    assert!(pool.await_termination(WAIT));
    assert_eq!(done.load(Ordering::SeqCst), 40);
    assert!(stats.peak.load(Ordering::SeqCst) <= 3);
}

#[test]
#[serial]
fn test_shutdown_wakes_blocked_submitter() {
    let pool = Arc::new(SimpleThreadPool::new(PoolConfig::new(1, Duration::from_secs(5))).unwrap());
    let (release_tx, release_rx) = mpsc::channel::<()>();
    pool.execute(move || drop(release_rx.recv()), None).unwrap();

    let submitter = {
        let pool = pool.clone();
        thread::spawn(move || pool.execute(|| {}, None))
    };

    thread::sleep(Duration::from_millis(50));
    pool.shutdown();

    assert!(matches!(submitter.join().unwrap(), Err(SyncError::Rejected)));
    assert!(!pool.await_termination(Some(Duration::from_millis(20))));

    release_tx.send(()).unwrap();
    assert!(pool.await_termination(WAIT));
}

#[test]
#[serial]
fn test_simple_pool_keep_alive() {
    let pool = SimpleThreadPool::new(PoolConfig::new(2, Duration::from_millis(50))).unwrap();
    pool.execute(|| {}, None).unwrap();

    let start = Instant::now();
    assert!(pool.await_termination(WAIT));
    assert!(start.elapsed() >= Duration::from_millis(40));
    assert_eq!(pool.pool_size(), 0);

    // Retired workers are replaced on demand
    assert!(pool.execute(|| {}, Some(Duration::ZERO)).unwrap());
}

#[test]
#[serial]
fn test_dropping_simple_pool_shuts_it_down() {
    let ran = Arc::new(AtomicUsize::new(0));
    {
        let pool = SimpleThreadPool::new(PoolConfig::new(2, Duration::from_secs(30))).unwrap();
        let counter = ran.clone();
        pool.execute(
            move || {
                thread::sleep(Duration::from_millis(20));
                counter.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .unwrap();
    }

    // The running task still completes after the pool handle is gone
    let deadline = Instant::now() + Duration::from_secs(5);
    while ran.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_thread_pool_results_and_sizing() {
    let pool = ThreadPool::new(PoolConfig::new(4, Duration::from_secs(5))).unwrap();
    let stats = Arc::new(Concurrency::default());

    let handles: Vec<_> = (0..64u64)
        .map(|n| {
            let stats = stats.clone();
            pool.execute(move || {
                stats.enter();
                thread::sleep(Duration::from_millis(1));
                stats.exit();
                Ok(n + 1)
            })
            .unwrap()
        })
        .collect();

    let sum: u64 = handles
        .iter()
        .map(|h| h.get(WAIT).unwrap().unwrap())
        .sum();
    assert_eq!(sum, (1..=64).sum::<u64>());
    assert!(pool.pool_size() <= 4);
    assert!(stats.peak.load(Ordering::SeqCst) <= 4);
}

#[test]
#[serial]
fn test_thread_pool_rejects_after_shutdown() {
    let pool = ThreadPool::new(PoolConfig::new(2, Duration::from_secs(5))).unwrap();
    let before = pool.execute(|| Ok("queued before shutdown")).unwrap();

    pool.shutdown();
    assert!(pool.is_shutdown());
    assert!(matches!(pool.execute(|| Ok("late")), Err(SyncError::Rejected)));

    assert_eq!(before.get(WAIT).unwrap(), Some("queued before shutdown"));
    assert!(pool.await_termination(WAIT));
    assert_eq!(pool.pool_size(), 0);
}

#[test]
#[serial]
fn test_thread_pool_await_termination_times_out_while_busy() {
    let pool = ThreadPool::new(PoolConfig::new(1, Duration::from_secs(5))).unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let busy = pool
        .execute(move || {
            release_rx.recv()?;
            Ok(())
        })
        .unwrap();
    pool.shutdown();

    assert!(!pool.await_termination(Some(Duration::from_millis(50))));
    release_tx.send(()).unwrap();
    assert!(pool.await_termination(WAIT));
    assert_eq!(busy.status(), TaskStatus::Completed);
}

#[test]
#[serial]
fn test_thread_pool_drop_drains_queue() {
    let handles = {
        let pool = ThreadPool::new(PoolConfig::new(1, Duration::from_secs(5))).unwrap();
        (0..5)
            .map(|i| {
                pool.execute(move || {
                    thread::sleep(Duration::from_millis(5));
                    Ok(i)
                })
                .unwrap()
            })
            .collect::<Vec<_>>()
    };

    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(handle.get(WAIT).unwrap(), Some(i as i32));
    }
}

#[test]
#[serial]
fn test_pool_from_json_config() {
    let config = PoolConfig::from_json(
        r#"{"max_pool_size": 2, "keep_alive_ms": 40, "thread_name_prefix": "json-worker"}"#,
    )
    .unwrap();
    let pool = ThreadPool::new(config).unwrap();

    let name = pool
        .execute(|| Ok(thread::current().name().map(str::to_owned)))
        .unwrap()
        .get(WAIT)
        .unwrap()
        .flatten();
    assert!(name.is_some_and(|n| n.starts_with("json-worker-")));

    // Idle workers retire after the configured keep-alive
    assert!(pool.await_termination(WAIT));
}
