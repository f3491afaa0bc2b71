//! The block processor: a periodic worker that drains the write queue and
//! commits each drained batch as one numbered block.
//!
//! Ticks are strictly sequential; a commit that outlasts the interval delays
//! the next tick rather than overlapping it.

use crate::error::Result;
use crate::queue::WriteQueue;
use crate::store::EntityStore;
use crate::types::BlockNumber;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct BlockProcessor {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    queue: Arc<WriteQueue>,
    store: Arc<EntityStore>,
    interval: Duration,
    slow_threshold: Duration,
}

impl BlockProcessor {
    pub fn new(
        queue: Arc<WriteQueue>,
        store: Arc<EntityStore>,
        interval: Duration,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            queue,
            store,
            interval,
            slow_threshold,
        }
    }

    /// Start the processor thread.
    ///
    /// Resynchronizes the queue's current block with the persisted counter
    /// first. Starting an already-running processor is a warning, not an
    /// error.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            warn!("block processor already running");
            return Ok(());
        }

        let persisted = self.store.current_block()?;
        self.queue.set_current_block(persisted + 1);
        info!(
            current_block = persisted + 1,
            interval_ms = self.interval.as_millis() as u64,
            "starting block processor"
        );

        self.shutdown.store(false, Ordering::Relaxed);
        let shutdown = Arc::clone(&self.shutdown);
        let queue = Arc::clone(&self.queue);
        let store = Arc::clone(&self.store);
        let interval = self.interval;
        let slow_threshold = self.slow_threshold;

        let handle = thread::spawn(move || {
            debug!("block processor loop started");
            while !shutdown.load(Ordering::Relaxed) {
                match process_block(&queue, &store, slow_threshold) {
                    Ok(_) => {}
                    // Rolled back and discarded; the drained entities are
                    // not requeued. Accepted data loss in this simulator.
                    Err(e) => warn!(error = %e, "block commit failed, batch discarded"),
                }
                sleep_interruptible(interval, &shutdown);
            }
            info!("block processor loop exited");
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Signal the processor thread to stop and wait for it to finish.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            debug!("waiting for block processor thread to exit");
            if let Err(e) = handle.join() {
                warn!("error joining block processor thread: {:?}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.shutdown.load(Ordering::Relaxed)
    }
}

impl Drop for BlockProcessor {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

/// One tick: drain the queue and, when anything was staged, close the block.
///
/// Expiry runs first in its own transaction (rows whose validity ends at the
/// closing block are deleted), then the whole batch plus receipts plus the
/// counter advance commit atomically. An empty drain is a no-op and does not
/// advance any counter. Returns the closed block number, if any.
pub fn process_block(
    queue: &WriteQueue,
    store: &EntityStore,
    slow_threshold: Duration,
) -> Result<Option<BlockNumber>> {
    let total_start = Instant::now();

    let Some(batch) = queue.dequeue_all() else {
        return Ok(None);
    };
    let block_number = batch.block_number;
    debug!(
        block = block_number,
        entities = batch.writes.len(),
        "processing block"
    );

    let expire_start = Instant::now();
    let expired = store.remove_expired(block_number)?;
    let expire_duration = expire_start.elapsed();

    let insert_start = Instant::now();
    store.insert_batch(&batch.writes, block_number)?;
    let insert_duration = insert_start.elapsed();

    let total_duration = total_start.elapsed();
    let (string_count, numeric_count) = count_annotations(&batch);
    info!(
        block = block_number,
        entities = batch.writes.len(),
        expired,
        expire_ms = expire_duration.as_millis() as u64,
        insert_ms = insert_duration.as_millis() as u64,
        total_ms = total_duration.as_millis() as u64,
        string_attributes = string_count,
        numeric_attributes = numeric_count,
        "block committed"
    );

    if total_duration > slow_threshold {
        warn!(
            block = block_number,
            entities = batch.writes.len(),
            total_ms = total_duration.as_millis() as u64,
            "slow block commit"
        );
    }

    Ok(Some(block_number))
}

fn count_annotations(batch: &crate::queue::DrainedBatch) -> (usize, usize) {
    batch.writes.iter().fold((0, 0), |(s, n), w| {
        (
            s + w.entity.string_annotations.len(),
            n + w.entity.numeric_annotations.len(),
        )
    })
}

fn sleep_interruptible(total: Duration, shutdown: &AtomicBool) {
    let slice = Duration::from_millis(25);
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        thread::sleep(slice.min(deadline.saturating_duration_since(Instant::now())));
    }
}
