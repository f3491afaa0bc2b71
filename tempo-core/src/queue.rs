//! In-memory staging buffer for writes between block commits.
//!
//! All state lives behind one mutex: the buffer, the intra-block ordinal
//! counters, and the queue's notion of the current block. `dequeue_all`
//! swaps the whole buffer out under that lock, so no write enqueued after a
//! drain begins can land in that drain's batch and no buffered write is
//! lost.

use crate::types::{BlockNumber, Entity, NumericValue, PendingWrite, WriteRequest};
use parking_lot::Mutex;
use uuid::Uuid;

/// A drained batch: every write staged for the block being closed.
#[derive(Debug)]
pub struct DrainedBatch {
    /// The block number these writes were tagged with (the pre-advance
    /// current block).
    pub block_number: BlockNumber,
    pub writes: Vec<PendingWrite>,
}

struct QueueState {
    buffer: Vec<PendingWrite>,
    current_block: BlockNumber,
    transaction_index: u32,
    operation_index: u32,
}

pub struct WriteQueue {
    state: Mutex<QueueState>,
    ops_per_transaction: u32,
}

impl WriteQueue {
    pub fn new(ops_per_transaction: u32) -> Self {
        Self {
            state: Mutex::new(QueueState {
                buffer: Vec::new(),
                current_block: 1,
                transaction_index: 0,
                operation_index: 0,
            }),
            ops_per_transaction,
        }
    }

    /// Stage a write and return its unique id.
    ///
    /// Tags the entity with the current block, converts the relative
    /// `expires_in` into an absolute `expires_at`, and assigns the
    /// within-block `(transaction, operation)` ordinals. The operation
    /// ordinal rolls over to the next transaction every
    /// `ops_per_transaction` writes.
    pub fn enqueue(&self, request: WriteRequest) -> String {
        let mut state = self.state.lock();

        let id = Uuid::new_v4().to_string();
        let current = state.current_block;

        let entity = Entity {
            key: request.key,
            payload: request.payload,
            content_type: request.content_type,
            owner_address: request.owner_address,
            string_annotations: request.string_annotations,
            numeric_annotations: request
                .numeric_annotations
                .into_iter()
                .filter_map(|(k, v)| match v {
                    NumericValue::Number(n) => Some((k, n)),
                    // Operator expressions belong to queries; on the write
                    // path they are parsed best-effort as plain numbers and
                    // otherwise dropped.
                    NumericValue::Expr(s) => s.trim().parse::<f64>().ok().map(|n| (k, n)),
                })
                .collect(),
            expires_at: current + request.expires_in,
            created_at_block: current,
            last_modified_at_block: current,
            deleted: request.deleted,
            transaction_index_in_block: state.transaction_index,
            operation_index_in_transaction: state.operation_index,
        };

        state.buffer.push(PendingWrite {
            id: id.clone(),
            entity,
        });

        state.operation_index += 1;
        if state.operation_index >= self.ops_per_transaction {
            state.operation_index = 0;
            state.transaction_index += 1;
        }

        id
    }

    /// Atomically drain the buffer.
    ///
    /// Resets the ordinal counters and, only when the buffer was non-empty,
    /// advances the in-memory current block by one. Returns `None` for an
    /// empty buffer so an idle tick never burns a block number.
    pub fn dequeue_all(&self) -> Option<DrainedBatch> {
        let mut state = self.state.lock();

        state.transaction_index = 0;
        state.operation_index = 0;

        if state.buffer.is_empty() {
            return None;
        }

        let writes = std::mem::take(&mut state.buffer);
        let block_number = state.current_block;
        state.current_block += 1;

        Some(DrainedBatch {
            block_number,
            writes,
        })
    }

    /// Resynchronize with the persisted counter at startup.
    pub fn set_current_block(&self, block: BlockNumber) {
        self.state.lock().current_block = block;
    }

    pub fn current_block(&self) -> BlockNumber {
        self.state.lock().current_block
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
