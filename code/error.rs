use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaultError {
    #[error("Invalid fault options: {0}")]
    InvalidOptions(#[source] clap::Error),

    #[error("Failed to spawn {kind} fault worker: {source}")]
    Spawn {
        kind: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Returned by a block allocator when the requested block cannot be obtained.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Failed to allocate a block of {bytes} bytes")]
pub struct AllocationFailed {
    pub bytes: usize,
}

#[derive(Error, Debug)]
pub enum AttachError {
    #[error("Target process {pid} not found")]
    NotFound { pid: u32 },

    #[error("Permission denied for target process {pid}")]
    PermissionDenied { pid: u32 },

    #[error("Cannot load the fault engine into foreign process {pid}")]
    Unsupported { pid: u32 },

    #[error("Failed to probe target process {pid}: {source}")]
    Probe {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Fault invocation rejected: {0}")]
    Delivery(#[from] FaultError),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
