use std::io;
use tracing::debug;
use crate::dispatcher::{DispatchOutcome, FaultDispatcher};
use crate::error::AttachError;
use crate::memory::{BlockAllocator, HeapAllocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetProcess {
    pid: u32,
}

impl TargetProcess {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    pub fn current() -> Self {
        Self { pid: std::process::id() }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_current(&self) -> bool {
        self.pid == std::process::id()
    }

    /// Checks that the process exists and may be signalled by us.
    pub fn probe(&self) -> Result<(), AttachError> {
        let pid = libc::pid_t::try_from(self.pid)
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or(AttachError::NotFound { pid: self.pid })?;

        // Signal 0 performs the permission and existence checks only.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(AttachError::NotFound { pid: self.pid }),
            Some(libc::EPERM) => Err(AttachError::PermissionDenied { pid: self.pid }),
            _ => Err(AttachError::Probe { pid: self.pid, source: err }),
        }
    }
}

/// Seam for delivering invocations into a target process.
pub trait AttachShim {
    /// Delivers `args` to the fault engine inside `target` and invokes it once.
    fn attach(&self, target: &TargetProcess, args: &str) -> Result<DispatchOutcome, AttachError>;
}

/// Serves a dispatcher hosted by the current process only.
#[derive(Debug, Clone)]
pub struct LocalShim<A = HeapAllocator> {
    dispatcher: FaultDispatcher<A>,
}

impl<A> LocalShim<A>
where
    A: BlockAllocator + Clone + Send + 'static,
{
    pub fn new(dispatcher: FaultDispatcher<A>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &FaultDispatcher<A> {
        &self.dispatcher
    }
}

impl<A> AttachShim for LocalShim<A>
where
    A: BlockAllocator + Clone + Send + 'static,
{
    fn attach(&self, target: &TargetProcess, args: &str) -> Result<DispatchOutcome, AttachError> {
        if !target.is_current() {
            return Err(AttachError::Unsupported { pid: target.pid() });
        }
        target.probe()?;

        debug!(pid = target.pid(), args, "delivering fault invocation");
        Ok(self.dispatcher.dispatch(args)?)
    }
}
