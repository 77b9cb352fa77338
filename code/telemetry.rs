use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Cpu,
    Memory,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Cpu => "cpu",
            WorkerKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Default)]
pub struct FaultTelemetry {
    cpu_active: AtomicU64,
    cpu_launched: AtomicU64,
    cpu_iterations: AtomicU64,
    cpu_progressed: AtomicU64,
    mem_active: AtomicU64,
    mem_launched: AtomicU64,
    alloc_attempts: AtomicU64,
    alloc_successes: AtomicU64,
    alloc_failures: AtomicU64,
    last_block_bytes: AtomicU64,
    retained_blocks: AtomicU64,
    retained_bytes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub cpu_active: u64,
    pub cpu_launched: u64,
    pub cpu_iterations: u64,
    /// CPU workers that have completed at least one batch of busy work.
    pub cpu_progressed: u64,
    pub mem_active: u64,
    pub mem_launched: u64,
    pub alloc_attempts: u64,
    pub alloc_successes: u64,
    pub alloc_failures: u64,
    pub last_block_bytes: u64,
    pub retained_blocks: u64,
    pub retained_bytes: u64,
}

impl TelemetrySnapshot {
    pub fn active_workers(&self) -> u64 {
        self.cpu_active + self.mem_active
    }
}

impl FaultTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Counts a worker as active until the returned guard is dropped.
    pub fn enter_worker(self: &Arc<Self>, kind: WorkerKind) -> WorkerGuard {
        self.active(kind).fetch_add(1, Ordering::Relaxed);
        match kind {
            WorkerKind::Cpu => &self.cpu_launched,
            WorkerKind::Memory => &self.mem_launched,
        }
        .fetch_add(1, Ordering::Relaxed);

        WorkerGuard { telemetry: self.clone(), kind }
    }

    fn active(&self, kind: WorkerKind) -> &AtomicU64 {
        match kind {
            WorkerKind::Cpu => &self.cpu_active,
            WorkerKind::Memory => &self.mem_active,
        }
    }

    pub fn record_cpu_iterations(&self, iterations: u64) {
        if iterations > 0 {
            self.cpu_iterations.fetch_add(iterations, Ordering::Relaxed);
        }
    }

    pub fn record_cpu_worker_progress(&self) {
        self.cpu_progressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allocation_attempt(&self, bytes: usize) {
        self.alloc_attempts.fetch_add(1, Ordering::Relaxed);
        self.last_block_bytes.store(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_allocation(&self) {
        self.alloc_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allocation_failure(&self) {
        self.alloc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retained(&self, bytes: usize) {
        self.retained_blocks.fetch_add(1, Ordering::Relaxed);
        self.retained_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn release_retained(&self, blocks: usize, bytes: usize) {
        self.retained_blocks.fetch_sub(blocks as u64, Ordering::Relaxed);
        self.retained_bytes.fetch_sub(bytes as u64, Ordering::Relaxed);
    }

    pub fn active_cpu_workers(&self) -> u64 {
        self.cpu_active.load(Ordering::Relaxed)
    }

    pub fn active_memory_workers(&self) -> u64 {
        self.mem_active.load(Ordering::Relaxed)
    }

    pub fn active_workers(&self) -> u64 {
        self.active_cpu_workers() + self.active_memory_workers()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cpu_active: self.cpu_active.load(Ordering::Relaxed),
            cpu_launched: self.cpu_launched.load(Ordering::Relaxed),
            cpu_iterations: self.cpu_iterations.load(Ordering::Relaxed),
            cpu_progressed: self.cpu_progressed.load(Ordering::Relaxed),
            mem_active: self.mem_active.load(Ordering::Relaxed),
            mem_launched: self.mem_launched.load(Ordering::Relaxed),
            alloc_attempts: self.alloc_attempts.load(Ordering::Relaxed),
            alloc_successes: self.alloc_successes.load(Ordering::Relaxed),
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
            last_block_bytes: self.last_block_bytes.load(Ordering::Relaxed),
            retained_blocks: self.retained_blocks.load(Ordering::Relaxed),
            retained_bytes: self.retained_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Keeps one worker counted as active; decrements on drop, including when
/// the worker thread unwinds or never gets spawned.
#[derive(Debug)]
pub struct WorkerGuard {
    telemetry: Arc<FaultTelemetry>,
    kind: WorkerKind,
}

impl WorkerGuard {
    pub fn telemetry(&self) -> &FaultTelemetry {
        &self.telemetry
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.telemetry.active(self.kind).fetch_sub(1, Ordering::Relaxed);
    }
}
