use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use crate::config::{FaultRequest, Options};
use crate::cpu::CpuWorker;
use crate::error::FaultError;
use crate::memory::{BlockAllocator, HeapAllocator, MemoryPlan, MemoryWorker};
use crate::signal::{Deadline, LivenessProbe, LivenessSignal};
use crate::telemetry::{FaultTelemetry, WorkerKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    CpuStarted {
        threads: usize,
        duration: Duration,
        deadline: Deadline,
    },
    MemStarted {
        block_bytes: usize,
        interval: Duration,
        keep: bool,
        duration: Duration,
        deadline: Deadline,
    },
    Stopped,
    Ignored {
        command: String,
    },
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::CpuStarted { threads, duration, .. } => {
                write!(f, "cpu fault started: {} worker(s) for {}s", threads, duration.as_secs())
            }
            DispatchOutcome::MemStarted { block_bytes, interval, keep, duration, .. } => write!(
                f,
                "memory fault started: {} MB every {} ms for {}s{}",
                block_bytes / (1024 * 1024),
                interval.as_millis(),
                duration.as_secs(),
                if *keep { " (keeping blocks)" } else { "" }
            ),
            DispatchOutcome::Stopped => write!(f, "all faults stopped"),
            DispatchOutcome::Ignored { command } => write!(f, "ignored unknown command {:?}", command),
        }
    }
}

/// Cloning yields a handle onto the same signal and telemetry.
#[derive(Debug, Clone)]
pub struct FaultDispatcher<A = HeapAllocator> {
    liveness: LivenessSignal,
    telemetry: Arc<FaultTelemetry>,
    allocator: A,
}

impl FaultDispatcher<HeapAllocator> {
    pub fn new() -> Self {
        Self::with_allocator(HeapAllocator::default())
    }
}

impl Default for FaultDispatcher<HeapAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> FaultDispatcher<A>
where
    A: BlockAllocator + Clone + Send + 'static,
{
    pub fn with_allocator(allocator: A) -> Self {
        Self {
            liveness: LivenessSignal::new(),
            telemetry: FaultTelemetry::new(),
            allocator,
        }
    }

    pub fn telemetry(&self) -> Arc<FaultTelemetry> {
        self.telemetry.clone()
    }

    pub fn liveness(&self) -> LivenessProbe {
        self.liveness.probe()
    }

    /// Handles one `<command> [flag value]...` argument string.
    pub fn dispatch(&self, args: &str) -> Result<DispatchOutcome, FaultError> {
        let request = FaultRequest::parse(args)?;
        self.execute(request)
    }

    pub fn execute(&self, request: FaultRequest) -> Result<DispatchOutcome, FaultError> {
        match request {
            FaultRequest::Cpu(options) => self.start_cpu(&options),
            FaultRequest::Mem(options) => self.start_mem(&options),
            FaultRequest::Stop => Ok(self.stop()),
            FaultRequest::Unrecognized(command) => {
                warn!(command = %command, "ignoring unrecognized fault command");
                Ok(DispatchOutcome::Ignored { command })
            }
        }
    }

    fn start_cpu(&self, options: &Options) -> Result<DispatchOutcome, FaultError> {
        self.liveness.arm();
        let duration = options.duration();
        let deadline = Deadline::after(duration);

        info!(threads = options.threads, duration_secs = options.duration_secs, "starting cpu fault");

        for index in 0..options.threads {
            let worker = CpuWorker::new(
                index,
                deadline,
                self.liveness.probe(),
                self.telemetry.enter_worker(WorkerKind::Cpu),
            );
            thread::Builder::new()
                .name(format!("cpu-fault-{}", index))
                .spawn(move || worker.run())
                .map_err(|source| FaultError::Spawn { kind: WorkerKind::Cpu.as_str(), source })?;
        }

        Ok(DispatchOutcome::CpuStarted { threads: options.threads, duration, deadline })
    }

    fn start_mem(&self, options: &Options) -> Result<DispatchOutcome, FaultError> {
        self.liveness.arm();
        let duration = options.duration();
        let deadline = Deadline::after(duration);
        let plan = MemoryPlan::from(options);

        info!(
            block_mib = options.block_mib,
            sleep_ms = options.sleep_ms,
            keep = options.keep,
            duration_secs = options.duration_secs,
            "starting memory fault"
        );

        let worker = MemoryWorker::new(
            plan,
            deadline,
            self.liveness.probe(),
            self.allocator.clone(),
            self.telemetry.enter_worker(WorkerKind::Memory),
        );
        thread::Builder::new()
            .name("mem-fault".to_string())
            .spawn(move || {
                worker.run();
            })
            .map_err(|source| FaultError::Spawn { kind: WorkerKind::Memory.as_str(), source })?;

        Ok(DispatchOutcome::MemStarted {
            block_bytes: plan.block_bytes,
            interval: plan.interval,
            keep: plan.keep,
            duration,
            deadline,
        })
    }

    fn stop(&self) -> DispatchOutcome {
        let was_alive = self.liveness.disarm();
        info!(was_alive, active_workers = self.telemetry.active_workers(), "stopping all faults");
        DispatchOutcome::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_is_ignored() {
        let dispatcher = FaultDispatcher::new();
        let outcome = dispatcher.dispatch("disk -d 5").unwrap();
        assert_eq!(outcome, DispatchOutcome::Ignored { command: "disk".into() });
        assert!(!dispatcher.liveness().is_alive());
    }

    #[test]
    fn bad_options_leave_signal_untouched() {
        let dispatcher = FaultDispatcher::new();
        assert!(dispatcher.dispatch("cpu -d forever").is_err());
        assert!(!dispatcher.liveness().is_alive());
        assert_eq!(dispatcher.telemetry().active_workers(), 0);
    }

    #[test]
    fn zero_threads_arms_without_workers() {
        let dispatcher = FaultDispatcher::new();
        let outcome = dispatcher.dispatch("cpu -t 0 -d 1").unwrap();
        assert!(matches!(outcome, DispatchOutcome::CpuStarted { threads: 0, .. }));
        assert!(dispatcher.liveness().is_alive());
        assert_eq!(dispatcher.telemetry().snapshot().cpu_launched, 0);
    }

    #[test]
    fn outcomes_render_for_operators() {
        let deadline = Deadline::after(Duration::ZERO);
        let cpu = DispatchOutcome::CpuStarted { threads: 4, duration: Duration::from_secs(30), deadline };
        assert_eq!(cpu.to_string(), "cpu fault started: 4 worker(s) for 30s");

        let mem = DispatchOutcome::MemStarted {
            block_bytes: 2 * 1024 * 1024,
            interval: Duration::from_millis(100),
            keep: true,
            duration: Duration::from_secs(1),
            deadline,
        };
        assert_eq!(mem.to_string(), "memory fault started: 2 MB every 100 ms for 1s (keeping blocks)");
        assert_eq!(DispatchOutcome::Stopped.to_string(), "all faults stopped");
    }
}
