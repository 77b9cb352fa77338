use std::hint::black_box;
use tracing::debug;
use crate::signal::{Deadline, LivenessProbe, should_continue};
use crate::telemetry::WorkerGuard;

// Iterations counted locally before being published to telemetry.
const FLUSH_EVERY: u64 = 1 << 16;

/// The busy-work unit: walks the Fibonacci sequence, wrapping on overflow.
/// Only the cost of stepping matters, never the value.
#[derive(Debug, Clone)]
pub struct FibonacciLoad {
    prev: u64,
    curr: u64,
}

impl Default for FibonacciLoad {
    fn default() -> Self {
        Self { prev: 0, curr: 1 }
    }
}

impl FibonacciLoad {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn step(&mut self) {
        let next = self.prev.wrapping_add(self.curr);
        self.prev = self.curr;
        self.curr = black_box(next);
    }

    pub fn current(&self) -> u64 {
        self.curr
    }
}

pub struct CpuWorker {
    index: usize,
    deadline: Deadline,
    liveness: LivenessProbe,
    guard: WorkerGuard,
}

impl CpuWorker {
    pub fn new(index: usize, deadline: Deadline, liveness: LivenessProbe, guard: WorkerGuard) -> Self {
        Self { index, deadline, liveness, guard }
    }

    /// Spins until the signal drops or the deadline passes. Never fails.
    pub fn run(self) {
        debug!(worker = self.index, "cpu fault worker started");

        let telemetry = self.guard.telemetry();
        let mut load = FibonacciLoad::new();
        let mut pending = 0u64;
        let mut progressed = false;

        while should_continue(&self.liveness, &self.deadline) {
            load.step();
            pending += 1;
            if pending == FLUSH_EVERY {
                telemetry.record_cpu_iterations(pending);
                pending = 0;
                if !progressed {
                    telemetry.record_cpu_worker_progress();
                    progressed = true;
                }
            }
        }
        telemetry.record_cpu_iterations(pending);

        debug!(
            worker = self.index,
            stopped = !self.liveness.is_alive(),
            "cpu fault worker exited"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};
    use crate::signal::LivenessSignal;
    use crate::telemetry::{FaultTelemetry, WorkerKind};

    #[test]
    fn fibonacci_sequence_advances() {
        let mut load = FibonacciLoad::new();
        let mut seen = Vec::new();
        for _ in 0..8 {
            load.step();
            seen.push(load.current());
        }
        assert_eq!(seen, vec![1, 2, 3, 5, 8, 13, 21, 34]);
    }

    #[test]
    fn fibonacci_wraps_instead_of_panicking() {
        let mut load = FibonacciLoad::new();
        for _ in 0..10_000 {
            load.step();
        }
    }

    #[test]
    fn worker_returns_when_deadline_already_passed() {
        let signal = LivenessSignal::new();
        signal.arm();
        let telemetry = FaultTelemetry::new();
        let worker = CpuWorker::new(
            0,
            Deadline::after(Duration::ZERO),
            signal.probe(),
            telemetry.enter_worker(WorkerKind::Cpu),
        );

        worker.run();
        assert_eq!(telemetry.active_cpu_workers(), 0);
        assert_eq!(telemetry.snapshot().cpu_iterations, 0);
    }

    #[test]
    fn worker_returns_immediately_when_disarmed() {
        let signal = LivenessSignal::new();
        let telemetry = FaultTelemetry::new();
        let worker = CpuWorker::new(
            0,
            Deadline::after(Duration::from_secs(60)),
            signal.probe(),
            telemetry.enter_worker(WorkerKind::Cpu),
        );

        worker.run();
        assert_eq!(telemetry.active_cpu_workers(), 0);
    }

    #[test]
    fn worker_stops_when_signal_drops() {
        let signal = LivenessSignal::new();
        signal.arm();
        let telemetry = FaultTelemetry::new();
        let worker = CpuWorker::new(
            3,
            Deadline::after(Duration::from_secs(60)),
            signal.probe(),
            telemetry.enter_worker(WorkerKind::Cpu),
        );

        let handle = thread::spawn(move || worker.run());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(telemetry.active_cpu_workers(), 1);

        let stopped_at = Instant::now();
        signal.disarm();
        handle.join().unwrap();

        assert!(stopped_at.elapsed() < Duration::from_millis(100));
        assert_eq!(telemetry.active_cpu_workers(), 0);
        let snap = telemetry.snapshot();
        assert!(snap.cpu_iterations > 0);
        assert_eq!(snap.cpu_progressed, 1);
    }

    #[test]
    fn worker_stops_at_deadline() {
        let signal = LivenessSignal::new();
        signal.arm();
        let telemetry = FaultTelemetry::new();
        let worker = CpuWorker::new(
            0,
            Deadline::after(Duration::from_millis(100)),
            signal.probe(),
            telemetry.enter_worker(WorkerKind::Cpu),
        );

        let started = Instant::now();
        worker.run();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(signal.is_alive());
    }
}
