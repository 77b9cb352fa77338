pub mod attach;
pub mod config;
pub mod cpu;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod report;
pub mod signal;
pub mod telemetry;
pub mod usage;

pub use attach::{AttachShim, LocalShim, TargetProcess};
pub use config::{FaultRequest, Options, MAX_BLOCK_MIB};
pub use dispatcher::{DispatchOutcome, FaultDispatcher};
pub use error::{AllocationFailed, AttachError, FaultError, ReportError};
pub use memory::{BlockAllocator, HeapAllocator};
pub use signal::{Deadline, LivenessProbe, LivenessSignal};
pub use telemetry::{FaultTelemetry, TelemetrySnapshot};
