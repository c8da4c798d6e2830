/*!
 * pc-sync Demo - Main Entry Point
 *
 * Walks through the synchronizers with a few small scenarios:
 * - Bounded lazy reuse and recomputation
 * - Rendezvous transfer and value exchange
 * - Generational broadcast
 * - Both thread pools, including a saturated fire-and-forget pool
 */

use pc_sync::{
    init_tracing, BoundedLazy, BroadcastBox, Exchanger, PoolConfig, SimpleThreadPool,
    ThreadPool, TransferQueue,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn main() -> miette::Result<()> {
    init_tracing();

    info!("pc-sync demo starting...");
    info!("================================================");

    bounded_lazy_demo()?;
    transfer_demo();
    exchanger_demo();
    broadcast_demo();
    simple_pool_demo()?;
    thread_pool_demo()?;

    info!("================================================");
    info!("pc-sync demo finished");
    Ok(())
}

fn bounded_lazy_demo() -> miette::Result<()> {
    let next = AtomicU64::new(7);
    let lazy = BoundedLazy::new(|| Ok(next.fetch_add(1, Ordering::SeqCst)), 2)?;

    let values = [lazy.get(WAIT)?, lazy.get(WAIT)?, lazy.get(WAIT)?];
    info!(?values, max_uses = lazy.max_uses(), "Bounded lazy: two reuses, then a fresh value");
    Ok(())
}

fn transfer_demo() {
    let queue = Arc::new(TransferQueue::new());

    let taker = {
        let queue = queue.clone();
        thread::spawn(move || queue.take(WAIT))
    };

    let delivered = queue.transfer("handoff", WAIT);
    let received = taker.join().ok().flatten();
    info!(delivered, ?received, "Transfer queue rendezvous");

    queue.put("left for later");
    info!(queued = queue.len(), "Transfer queue put returns immediately");
}

fn exchanger_demo() {
    let exchanger = Arc::new(Exchanger::new());

    let partner = {
        let exchanger = exchanger.clone();
        thread::spawn(move || exchanger.exchange("ping", WAIT))
    };

    let mine = exchanger.exchange("pong", WAIT);
    let theirs = partner.join().ok().flatten();
    info!(?mine, ?theirs, "Exchanger swapped values");
}

fn broadcast_demo() {
    let bbox = Arc::new(BroadcastBox::new());

    let receivers: Vec<_> = (0..3)
        .map(|_| {
            let bbox = bbox.clone();
            thread::spawn(move || bbox.receive(WAIT))
        })
        .collect();

    while bbox.waiting() < receivers.len() {
        thread::yield_now();
    }

    let delivered_to = bbox.deliver_to_all("generation 0");
    let received = receivers
        .into_iter()
        .filter_map(|r| r.join().ok().flatten())
        .count();
    info!(delivered_to, received, "Broadcast box delivered one generation");
}

fn simple_pool_demo() -> miette::Result<()> {
    let pool = SimpleThreadPool::new(PoolConfig::new(2, Duration::from_secs(1)))?;
    let slow = || thread::sleep(Duration::from_millis(500));

    let first = pool.execute(slow, Some(Duration::ZERO))?;
    let second = pool.execute(slow, Some(Duration::ZERO))?;
    let third = pool.execute(slow, Some(Duration::ZERO))?;
    info!(
        first,
        second,
        third,
        pool_size = pool.pool_size(),
        "Saturated pool reports busy instead of rejecting"
    );

    pool.shutdown();
    if !pool.await_termination(WAIT) {
        warn!("Simple thread pool did not terminate in time");
    }
    Ok(())
}

fn thread_pool_demo() -> miette::Result<()> {
    let pool = ThreadPool::new(PoolConfig::new(4, Duration::from_secs(1)))?;

    let handles = (1..=8u64)
        .map(|n| pool.execute(move || Ok(n * n)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut squares = Vec::with_capacity(handles.len());
    for handle in &handles {
        squares.push(handle.get(WAIT)?);
    }
    info!(?squares, pool_size = pool.pool_size(), "Thread pool completed tasks");

    pool.shutdown();
    if !pool.await_termination(WAIT) {
        warn!("Thread pool did not terminate in time");
    }
    Ok(())
}
