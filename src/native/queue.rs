//! Hardware queues.
//!
//! Submitted work is executed asynchronously and strictly in submission order
//! per queue. There is no ordering between queues other than explicit
//! [`NativeQueue::wait`] operations.
//!
//! # Execution Modes
//!
//! | Mode | Who executes | Use |
//! |------|--------------|-----|
//! | [`ExecutionMode::Threaded`] | one worker thread per queue | normal operation |
//! | [`ExecutionMode::Manual`] | the caller, via [`NativeQueue::process`] | deterministic tests |
//!
//! In manual mode nothing retires on its own: a CPU wait on a value that has
//! not been processed blocks until another thread calls `process`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::command::{Command, NativeCommandList, RecordedBatch, ResourceBarrier};
use super::device::DeviceStatus;
use super::resource::{NativeResource, byte_range};
use super::sync::NativeFence;
use super::{NativeError, NativeResult};
use crate::resource::ResourceState;
use crate::types::QueueType;

/// How a queue retires submitted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    #[default]
    Threaded,
    Manual,
}

enum QueueOp {
    Execute(Vec<Arc<RecordedBatch>>),
    Signal(Arc<NativeFence>, u64),
    Wait(Arc<NativeFence>, u64),
    Shutdown,
}

// ─── Statistics ──────────────────────────────────────────────────────────────

/// Live counters of executed work.
#[derive(Debug, Default)]
pub struct QueueStats {
    submissions: AtomicU64,
    command_lists: AtomicU64,
    barriers: AtomicU64,
    draws: AtomicU64,
    dispatches: AtomicU64,
    copies: AtomicU64,
    clears: AtomicU64,
    signals: AtomicU64,
    validation_errors: AtomicU64,
}

/// Point-in-time copy of [`QueueStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub submissions: u64,
    pub command_lists: u64,
    pub barriers: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub copies: u64,
    pub clears: u64,
    pub signals: u64,
    pub validation_errors: u64,
}

impl QueueStats {
    #[must_use]
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        QueueStatsSnapshot {
            submissions: load(&self.submissions),
            command_lists: load(&self.command_lists),
            barriers: load(&self.barriers),
            draws: load(&self.draws),
            dispatches: load(&self.dispatches),
            copies: load(&self.copies),
            clears: load(&self.clears),
            signals: load(&self.signals),
            validation_errors: load(&self.validation_errors),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::ops::Add for QueueStatsSnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            submissions: self.submissions + rhs.submissions,
            command_lists: self.command_lists + rhs.command_lists,
            barriers: self.barriers + rhs.barriers,
            draws: self.draws + rhs.draws,
            dispatches: self.dispatches + rhs.dispatches,
            copies: self.copies + rhs.copies,
            clears: self.clears + rhs.clears,
            signals: self.signals + rhs.signals,
            validation_errors: self.validation_errors + rhs.validation_errors,
        }
    }
}

// ─── Executor ────────────────────────────────────────────────────────────────

struct Executor {
    kind: QueueType,
    validation: bool,
    status: Arc<DeviceStatus>,
    stats: Arc<QueueStats>,
}

impl Executor {
    fn apply(&self, op: QueueOp) {
        match op {
            QueueOp::Execute(batches) => {
                QueueStats::bump(&self.stats.submissions);
                for batch in batches {
                    if !self.status.is_removed() {
                        self.execute_batch(&batch);
                    }
                    batch.mark_retired();
                }
            }
            QueueOp::Signal(fence, value) => {
                if !self.status.is_removed() {
                    QueueStats::bump(&self.stats.signals);
                    fence.signal(value);
                }
            }
            QueueOp::Wait(..) | QueueOp::Shutdown => {}
        }
    }

    fn execute_batch(&self, batch: &RecordedBatch) {
        QueueStats::bump(&self.stats.command_lists);
        log::trace!(
            "{} queue executing list {} ({} commands)",
            self.kind,
            batch.list_id(),
            batch.commands().len()
        );
        for command in batch.commands() {
            self.execute_command(command);
        }
    }

    fn execute_command(&self, command: &Command) {
        match command {
            Command::ResourceBarrier(barriers) => {
                for barrier in barriers {
                    self.transition(barrier);
                }
            }
            Command::ClearRenderTarget { target, color } => {
                self.expect_state(target, ResourceState::RENDER_TARGET, "clear render target");
                let texel = target.desc().format.encode_color(*color);
                fill(target, &texel);
                QueueStats::bump(&self.stats.clears);
            }
            Command::ClearDepthStencil {
                target,
                depth,
                stencil,
            } => {
                self.expect_state(target, ResourceState::DEPTH_WRITE, "clear depth-stencil");
                let texel = target.desc().format.encode_depth(*depth, *stencil);
                fill(target, &texel);
                QueueStats::bump(&self.stats.clears);
            }
            Command::Draw { .. } | Command::DrawIndexed { .. } => {
                QueueStats::bump(&self.stats.draws);
            }
            Command::Dispatch { .. } => QueueStats::bump(&self.stats.dispatches),
            Command::CopyResource { dst, src } => {
                self.expect_state(src, ResourceState::COPY_SOURCE, "copy source");
                self.expect_state(dst, ResourceState::COPY_DEST, "copy destination");
                if Arc::ptr_eq(dst, src) || dst.size() != src.size() {
                    self.validation_error(format!(
                        "copy between '{}' and '{}' requires distinct resources of equal size",
                        src.name(),
                        dst.name()
                    ));
                }
                let data = src.memory().clone();
                let mut memory = dst.memory();
                let len = memory.len().min(data.len());
                memory[..len].copy_from_slice(&data[..len]);
                QueueStats::bump(&self.stats.copies);
            }
            Command::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                self.expect_state(src, ResourceState::COPY_SOURCE, "copy source");
                self.expect_state(dst, ResourceState::COPY_DEST, "copy destination");
                let data = {
                    let memory = src.memory();
                    match byte_range(*src_offset, *size, memory.len()) {
                        Ok(range) => memory[range].to_vec(),
                        Err(e) => {
                            self.validation_error(format!("copy source '{}': {e}", src.name()));
                            return;
                        }
                    }
                };
                let mut memory = dst.memory();
                match byte_range(*dst_offset, *size, memory.len()) {
                    Ok(range) => memory[range].copy_from_slice(&data),
                    Err(e) => {
                        self.validation_error(format!("copy destination '{}': {e}", dst.name()));
                        return;
                    }
                }
                QueueStats::bump(&self.stats.copies);
            }
            Command::SetViewport(_)
            | Command::SetScissor(_)
            | Command::SetPipeline(_)
            | Command::SetRenderTargets { .. }
            | Command::SetVertexBuffer { .. }
            | Command::SetIndexBuffer { .. }
            | Command::SetConstantBuffer { .. }
            | Command::SetDescriptorTable { .. } => {}
        }
    }

    fn transition(&self, barrier: &ResourceBarrier) {
        let mut state = barrier.resource.gpu_state_mut();
        if self.validation {
            if *state != barrier.before {
                self.validation_error(format!(
                    "barrier on '{}' declares before-state {:?} but the resource is in {:?}",
                    barrier.resource.name(),
                    barrier.before,
                    *state
                ));
            } else if barrier.before == barrier.after {
                self.validation_error(format!(
                    "degenerate barrier on '{}' ({:?} -> {:?})",
                    barrier.resource.name(),
                    barrier.before,
                    barrier.after
                ));
            }
        }
        *state = barrier.after;
        QueueStats::bump(&self.stats.barriers);
    }

    fn expect_state(&self, resource: &NativeResource, required: ResourceState, usage: &str) {
        if !self.validation {
            return;
        }
        let state = resource.gpu_state();
        let satisfied = state.contains(required) || (required.is_empty() && state.is_empty());
        if !satisfied {
            self.validation_error(format!(
                "'{}' used as {usage} while in {state:?} (requires {required:?})",
                resource.name()
            ));
        }
    }

    fn validation_error(&self, message: String) {
        QueueStats::bump(&self.stats.validation_errors);
        log::warn!("[validation] {} queue: {message}", self.kind);
    }
}

fn fill(resource: &NativeResource, texel: &[u8]) {
    if texel.is_empty() {
        return;
    }
    let mut memory = resource.memory();
    for chunk in memory.chunks_exact_mut(texel.len()) {
        chunk.copy_from_slice(texel);
    }
}

// ─── Queue ───────────────────────────────────────────────────────────────────

/// A hardware command queue.
pub struct NativeQueue {
    id: u64,
    kind: QueueType,
    mode: ExecutionMode,
    status: Arc<DeviceStatus>,
    sender: flume::Sender<QueueOp>,
    receiver: flume::Receiver<QueueOp>,
    stalled: Mutex<Option<QueueOp>>,
    executor: Arc<Executor>,
    worker: Option<JoinHandle<()>>,
}

impl NativeQueue {
    pub(super) fn new(
        id: u64,
        kind: QueueType,
        mode: ExecutionMode,
        validation: bool,
        status: Arc<DeviceStatus>,
    ) -> NativeResult<Self> {
        let (sender, receiver) = flume::unbounded();
        let executor = Arc::new(Executor {
            kind,
            validation,
            status: Arc::clone(&status),
            stats: Arc::new(QueueStats::default()),
        });

        let worker = match mode {
            ExecutionMode::Threaded => {
                let receiver = receiver.clone();
                let executor = Arc::clone(&executor);
                let handle = std::thread::Builder::new()
                    .name(format!("myth-gpu-{kind}-queue"))
                    .spawn(move || run_worker(&receiver, &executor))
                    .map_err(|e| NativeError::WorkerStart(e.to_string()))?;
                Some(handle)
            }
            ExecutionMode::Manual => None,
        };

        Ok(Self {
            id,
            kind,
            mode,
            status,
            sender,
            receiver,
            stalled: Mutex::new(None),
            executor,
            worker,
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> QueueType {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    #[must_use]
    pub fn stats(&self) -> QueueStatsSnapshot {
        self.executor.stats.snapshot()
    }

    /// Submits closed command lists for execution, in order.
    pub fn execute_command_lists(&self, lists: &[&NativeCommandList]) -> NativeResult<()> {
        self.status.check()?;
        let mut batches = Vec::with_capacity(lists.len());
        for list in lists {
            if list.is_recording() {
                return Err(NativeError::InvalidCall(
                    "executing a command list that is still recording",
                ));
            }
            if list.kind() != self.kind {
                return Err(NativeError::InvalidCall(
                    "command list type does not match queue type",
                ));
            }
            let batch = list.batch().ok_or(NativeError::InvalidCall(
                "executing a command list that was never closed",
            ))?;
            batches.push(Arc::clone(batch));
        }
        for batch in &batches {
            batch.mark_submitted();
        }
        self.push(QueueOp::Execute(batches))
    }

    /// Enqueues a GPU-side signal of `fence` to `value`.
    pub fn signal(&self, fence: &Arc<NativeFence>, value: u64) -> NativeResult<()> {
        self.status.check()?;
        self.push(QueueOp::Signal(Arc::clone(fence), value))
    }

    /// Enqueues a GPU-side wait: later work on this queue does not start
    /// until `fence` reaches `value`.
    pub fn wait(&self, fence: &Arc<NativeFence>, value: u64) -> NativeResult<()> {
        self.status.check()?;
        self.push(QueueOp::Wait(Arc::clone(fence), value))
    }

    /// Manual mode: retires up to `max_ops` queued operations, stopping early at
    /// an unsatisfied GPU wait. Returns the number of operations retired.
    ///
    /// Threaded queues retire work on their own; this returns 0 for them.
    pub fn process(&self, max_ops: usize) -> usize {
        if self.mode != ExecutionMode::Manual {
            return 0;
        }
        let mut stalled = self.stalled.lock();
        let mut processed = 0;
        while processed < max_ops {
            let op = match stalled.take() {
                Some(op) => op,
                None => match self.receiver.try_recv() {
                    Ok(op) => op,
                    Err(_) => break,
                },
            };
            if let QueueOp::Wait(fence, value) = &op
                && fence.completed_value() < *value
                && !self.status.is_removed()
            {
                *stalled = Some(op);
                break;
            }
            self.executor.apply(op);
            processed += 1;
        }
        processed
    }

    /// Manual mode: retires everything that can currently retire.
    pub fn process_all(&self) -> usize {
        self.process(usize::MAX)
    }

    /// Operations submitted but not yet retired (manual mode).
    #[must_use]
    pub fn pending_ops(&self) -> usize {
        self.receiver.len() + usize::from(self.stalled.lock().is_some())
    }

    fn push(&self, op: QueueOp) -> NativeResult<()> {
        self.sender
            .send(op)
            .map_err(|_| NativeError::DeviceRemoved(format!("{} queue worker terminated", self.kind)))
    }
}

fn run_worker(receiver: &flume::Receiver<QueueOp>, executor: &Executor) {
    log::debug!("{} queue worker started", executor.kind);
    while let Ok(op) = receiver.recv() {
        match op {
            QueueOp::Shutdown => break,
            QueueOp::Wait(fence, value) => fence.block_until(value),
            op => executor.apply(op),
        }
    }
    log::debug!("{} queue worker stopped", executor.kind);
}

impl Drop for NativeQueue {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.sender.send(QueueOp::Shutdown);
            if worker.join().is_err() {
                log::error!("{} queue worker panicked", self.kind);
            }
        }
    }
}

impl std::fmt::Debug for NativeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeQueue")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
