use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::config::Options;
use crate::error::AllocationFailed;
use crate::signal::{Deadline, LivenessProbe, should_continue};
use crate::telemetry::WorkerGuard;
use crate::usage;

/// Memory that must stay available after a block is taken.
pub const DEFAULT_HEADROOM_MARGIN: u64 = 256 * 1024 * 1024;

/// Source of the blocks a memory worker consumes.
pub trait BlockAllocator {
    type Block;

    fn allocate(&mut self, bytes: usize) -> Result<Self::Block, AllocationFailed>;
}

/// Allocates zero-filled heap blocks, reporting failure instead of aborting.
///
/// A block is refused when taking it would leave less than `margin` bytes of
/// available memory; with overcommit the reservation alone rarely fails.
#[derive(Debug, Clone, Copy)]
pub struct HeapAllocator {
    margin: u64,
    available: fn() -> Option<u64>,
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::with_headroom(DEFAULT_HEADROOM_MARGIN, usage::available_memory_bytes)
    }
}

impl HeapAllocator {
    /// `available` reports free memory in bytes; `None` skips the check.
    pub fn with_headroom(margin: u64, available: fn() -> Option<u64>) -> Self {
        Self { margin, available }
    }

    fn has_room_for(&self, bytes: usize) -> bool {
        match (self.available)() {
            Some(available) => (bytes as u64).saturating_add(self.margin) <= available,
            None => true,
        }
    }
}

impl BlockAllocator for HeapAllocator {
    type Block = Vec<u8>;

    fn allocate(&mut self, bytes: usize) -> Result<Vec<u8>, AllocationFailed> {
        if !self.has_room_for(bytes) {
            return Err(AllocationFailed { bytes });
        }

        let mut block = Vec::new();
        block
            .try_reserve_exact(bytes)
            .map_err(|_| AllocationFailed { bytes })?;
        // Writing every byte makes the pages resident.
        block.resize(bytes, 0);
        Ok(std::hint::black_box(block))
    }
}

/// What a memory worker is asked to do, derived from [`Options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPlan {
    pub block_bytes: usize,
    pub interval: Duration,
    pub keep: bool,
}

impl From<&Options> for MemoryPlan {
    fn from(options: &Options) -> Self {
        Self {
            block_bytes: options.block_bytes(),
            interval: options.sleep_interval(),
            keep: options.keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Allocating,
    Idle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryRunSummary {
    pub attempts: u64,
    pub allocated: u64,
    pub retained_blocks: usize,
    pub degraded: bool,
}

pub struct MemoryWorker<A: BlockAllocator> {
    plan: MemoryPlan,
    deadline: Deadline,
    liveness: LivenessProbe,
    allocator: A,
    guard: WorkerGuard,
}

impl<A: BlockAllocator> MemoryWorker<A> {
    pub fn new(
        plan: MemoryPlan,
        deadline: Deadline,
        liveness: LivenessProbe,
        allocator: A,
        guard: WorkerGuard,
    ) -> Self {
        Self { plan, deadline, liveness, allocator, guard }
    }

    pub fn run(mut self) -> MemoryRunSummary {
        let bytes = self.plan.block_bytes;
        debug!(
            block_bytes = bytes,
            interval_ms = self.plan.interval.as_millis() as u64,
            keep = self.plan.keep,
            "memory fault worker started"
        );

        let mut retained: Vec<A::Block> = Vec::new();
        let mut mode = Mode::Allocating;
        let mut summary = MemoryRunSummary::default();

        while should_continue(&self.liveness, &self.deadline) {
            if mode == Mode::Allocating {
                summary.attempts += 1;
                self.guard.telemetry().record_allocation_attempt(bytes);

                match self.allocate_one(&mut retained) {
                    Ok(()) => summary.allocated += 1,
                    Err(err) => {
                        warn!(error = %err, "memory exhausted, fault continues without allocating");
                        self.guard.telemetry().record_allocation_failure();
                        mode = Mode::Idle;
                        summary.degraded = true;
                    }
                }
            }

            self.pause();
        }

        summary.retained_blocks = retained.len();
        self.guard
            .telemetry()
            .release_retained(retained.len(), retained.len().saturating_mul(bytes));
        drop(retained);

        info!(
            attempts = summary.attempts,
            allocated = summary.allocated,
            degraded = summary.degraded,
            "memory fault worker exited"
        );
        summary
    }

    fn allocate_one(&mut self, retained: &mut Vec<A::Block>) -> Result<(), AllocationFailed> {
        let bytes = self.plan.block_bytes;
        if self.plan.keep {
            // Growing the list can fail too; treat it like the block itself.
            retained.try_reserve(1).map_err(|_| AllocationFailed { bytes })?;
        }

        let block = self.allocator.allocate(bytes)?;
        self.guard.telemetry().record_allocation();

        if self.plan.keep {
            retained.push(block);
            self.guard.telemetry().record_retained(bytes);
        }
        Ok(())
    }

    // Never sleeps past the deadline.
    fn pause(&self) {
        let nap = self.plan.interval.min(self.deadline.remaining());
        if !nap.is_zero() {
            thread::sleep(nap);
        }
    }
}
