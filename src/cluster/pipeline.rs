//! Pipeline state and lazy reply handles.
//!
//! Each cluster connection owns a pipeline cell holding one of three
//! states. Requests accumulate in `Pending` (or `TransactionPending` once a
//! MULTI opened a transaction) and are flushed as one batch; the cell then
//! transitions to `Executed` and is kept alive only by the reply handles
//! issued from it, while the connection installs a fresh cell for whatever
//! arrives next. That cell swap is what lets an executed batch stay
//! observable to old handles while new requests start a new batch.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::command::Cmd;
use crate::proto::frame::Frame;
use crate::proto::{Error, Result};

use super::connection::{ConnectionInner, RefreshShardMap};
use super::evaluate;

/// Queue length at which a submission forces a flush instead of enqueuing
/// further. Keeps a producer that never observes replies from accumulating
/// unbounded queue memory.
pub(crate) const PIPELINE_FLUSH_LIMIT: usize = 1000;

/// The outcome of one flushed batch, shared by all of its reply handles.
pub(crate) type SharedReplies = Arc<Result<Vec<Frame>>>;

/// State of one pipeline cell.
///
/// Queues hold requests in arrival order; a request's position is its
/// submission index into the batch's reply vector.
pub(crate) enum PipelineState {
    /// Requests enqueued, none sent.
    Pending(Vec<Cmd>),
    /// Inside MULTI; EXEC not yet seen.
    TransactionPending(Vec<Cmd>),
    /// Flushed; the replies are this cell's final value.
    Executed(SharedReplies),
}

/// A pipeline cell: shared, lock-protected mutable state.
pub(crate) type PipelineCell = Arc<Mutex<PipelineState>>;

/// Creates a fresh cell in the given state.
pub(crate) fn new_cell(state: PipelineState) -> PipelineCell {
    Arc::new(Mutex::new(state))
}

/// A lazy handle to one reply of a pipelined batch.
///
/// Submission returns immediately; nothing is sent until a handle is
/// observed. The first [`wait`](ReplyHandle::wait) on any handle of a batch
/// drives the whole batch's evaluation under the cell's lock and seals the
/// cell as `Executed`; every later wait (on this handle or its siblings)
/// reads the memoized outcome without touching the network.
pub struct ReplyHandle {
    cell: PipelineCell,
    index: usize,
    inner: Arc<ConnectionInner>,
    refresher: Arc<dyn RefreshShardMap>,
}

impl ReplyHandle {
    pub(crate) fn new(
        cell: PipelineCell,
        index: usize,
        inner: Arc<ConnectionInner>,
        refresher: Arc<dyn RefreshShardMap>,
    ) -> Self {
        Self {
            cell,
            index,
            inner,
            refresher,
        }
    }

    /// The reply's submission index within its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Resolves the reply, executing the owning batch if it has not run yet.
    ///
    /// A batch-level failure (IO fault, cross-slot transaction, missing
    /// node) is observed by every handle of the batch.
    pub async fn wait(&self) -> Result<Frame> {
        let mut state = self.cell.lock().await;
        let shared = match &mut *state {
            PipelineState::Executed(replies) => Arc::clone(replies),
            PipelineState::Pending(queue) => {
                let queue = std::mem::take(queue);
                let result =
                    evaluate::run_pipeline(&self.inner, self.refresher.as_ref(), queue).await;
                let shared = Arc::new(result);
                *state = PipelineState::Executed(Arc::clone(&shared));
                shared
            }
            PipelineState::TransactionPending(queue) => {
                let queue = std::mem::take(queue);
                let result =
                    evaluate::run_transaction(&self.inner, self.refresher.as_ref(), queue).await;
                let shared = Arc::new(result);
                *state = PipelineState::Executed(Arc::clone(&shared));
                shared
            }
        };
        drop(state);
        reply_at(&shared, self.index)
    }
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("index", &self.index)
            .finish()
    }
}

/// Extracts one reply from a batch outcome, duplicating a batch-level error.
pub(crate) fn reply_at(result: &Result<Vec<Frame>>, index: usize) -> Result<Frame> {
    match result {
        Ok(replies) => replies.get(index).cloned().ok_or_else(|| Error::Protocol {
            message: format!("no reply at index {}", index),
        }),
        Err(e) => Err(e.clone()),
    }
}
