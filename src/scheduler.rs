//! Single-flight cooperative task scheduler.
//!
//! All lifecycle-mutating operations flow through one FIFO queue with a
//! single active slot. Guard predicates run when an operation leaves the
//! queue; a failing guard completes the operation immediately without
//! touching the network, disk, or any lifecycle state. `pump` is the sole
//! point where work advances, one suspension point per call.

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::id::ModId;
use crate::ops::{Operation, StepOutcome};
use std::collections::VecDeque;

/// Fired exactly once per enqueued operation, with its final outcome.
pub type CompletionCallback = Box<dyn FnOnce(Result<()>)>;

struct PendingOp {
    op: Operation,
    on_complete: Option<CompletionCallback>,
}

pub struct TaskScheduler {
    queue: VecDeque<PendingOp>,
    active: Option<PendingOp>,
    closing: bool,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        TaskScheduler {
            queue: VecDeque::new(),
            active: None,
            closing: false,
        }
    }

    /// Append an operation. After shutdown every enqueue completes
    /// immediately as canceled.
    pub fn enqueue(&mut self, op: Operation, on_complete: Option<CompletionCallback>) {
        if self.closing {
            if let Some(cb) = on_complete {
                cb(Err(Error::OperationCanceled));
            }
            return;
        }
        self.queue.push_back(PendingOp { op, on_complete });
    }

    /// True iff an operation currently owns the active slot.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Ids of queued (not yet started) operations, front first.
    pub fn queued_ids(&self) -> Vec<ModId> {
        self.queue.iter().map(|p| p.op.mod_id()).collect()
    }

    /// Promote a queued operation for `id` to run right after the current
    /// active one. Promoting a missing or already-active operation is a
    /// no-op.
    pub fn prioritize(&mut self, id: ModId) -> bool {
        match self.queue.iter().position(|p| p.op.mod_id() == id) {
            Some(pos) => {
                if let Some(pending) = self.queue.remove(pos) {
                    self.queue.push_front(pending);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Cancel everything queued-but-not-started, synchronously. The active
    /// operation is left to finish or fail naturally on later pumps.
    pub fn shutdown(&mut self) {
        self.closing = true;
        while let Some(mut pending) = self.queue.pop_front() {
            if let Some(cb) = pending.on_complete.take() {
                cb(Err(Error::OperationCanceled));
            }
        }
    }

    /// Drive ready work: start the next queued operation if the slot is
    /// free, then advance the active one by a single suspension point.
    pub fn pump(&mut self, core: &mut EngineCore) {
        if self.active.is_none() {
            self.start_next(core);
        }

        if let Some(mut active) = self.active.take() {
            match active.op.advance(core) {
                StepOutcome::InProgress => {
                    self.active = Some(active);
                }
                StepOutcome::Done { result, followups } => {
                    core.clear_progress();
                    for op in followups {
                        self.enqueue(op, None);
                    }
                    if let Some(cb) = active.on_complete.take() {
                        cb(result);
                    }
                }
            }
        }
    }

    fn start_next(&mut self, core: &mut EngineCore) {
        while let Some(mut pending) = self.queue.pop_front() {
            match check_guards(core, &pending.op) {
                Ok(()) => {
                    core.log_debug(
                        "scheduler",
                        &format!("{} mod {} started", pending.op.describe(), pending.op.mod_id()),
                    );
                    self.active = Some(pending);
                    return;
                }
                Err(e) => {
                    core.log_warning(
                        "scheduler",
                        &format!(
                            "{} mod {} rejected: {}",
                            pending.op.describe(),
                            pending.op.mod_id(),
                            e
                        ),
                    );
                    if let Some(cb) = pending.on_complete.take() {
                        cb(Err(e));
                    }
                }
            }
        }
    }
}

/// Preconditions checked before an operation may start. Failures here never
/// consume a network request or advance lifecycle state.
fn check_guards(core: &mut EngineCore, op: &Operation) -> Result<()> {
    if !core.session.is_initialized() {
        return Err(Error::NotInitialized);
    }
    if !op.mod_id().is_valid() {
        return Err(Error::InvalidModId);
    }
    if let Some(retry_after) = core.session.rate_limit_remaining() {
        return Err(Error::RateLimited { retry_after });
    }
    if op.requires_auth() && !core.session.is_authenticated() {
        return Err(Error::NotAuthenticated);
    }
    Ok(())
}
