use std::time::Duration;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::error::FaultError;

pub const DEFAULT_DURATION_SECS: u64 = 60;
pub const DEFAULT_THREADS: usize = 1;
pub const DEFAULT_BLOCK_MIB: u32 = 1;
pub const DEFAULT_SLEEP_MS: u64 = 2000;
/// Largest block a memory fault will request in one allocation.
pub const MAX_BLOCK_MIB: u32 = 2047;

const MIB: usize = 1024 * 1024;

/// Options shared by every fault command. Flags meant for the other fault
/// type are accepted and ignored.
#[derive(Parser, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[command(
    name = "fault",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Options {
    /// Fault duration in seconds
    #[arg(short = 'd', long = "duration", default_value_t = DEFAULT_DURATION_SECS)]
    pub duration_secs: u64,

    /// CPU worker threads
    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    /// MiB allocated per memory fault iteration
    #[arg(short = 'm', long = "memory", default_value_t = DEFAULT_BLOCK_MIB)]
    pub block_mib: u32,

    /// Milliseconds between allocations
    #[arg(short = 's', long = "sleep", default_value_t = DEFAULT_SLEEP_MS)]
    pub sleep_ms: u64,

    /// Retain every allocated block until the fault ends
    #[arg(short = 'k', long = "keep", default_value_t = false)]
    pub keep: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
            threads: DEFAULT_THREADS,
            block_mib: DEFAULT_BLOCK_MIB,
            sleep_ms: DEFAULT_SLEEP_MS,
            keep: false,
        }
    }
}

impl Options {
    /// Parses option tokens (without the command word) and clamps the block size.
    pub fn parse_tokens<I, T>(tokens: I) -> Result<Self, FaultError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut options = Self::try_parse_from(tokens).map_err(FaultError::InvalidOptions)?;
        if options.block_mib > MAX_BLOCK_MIB {
            debug!(requested = options.block_mib, max = MAX_BLOCK_MIB, "clamping memory block size");
            options.block_mib = MAX_BLOCK_MIB;
        }
        Ok(options)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    pub fn block_bytes(&self) -> usize {
        (self.block_mib.min(MAX_BLOCK_MIB) as usize).saturating_mul(MIB)
    }
}

/// One parsed fault invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultRequest {
    Cpu(Options),
    Mem(Options),
    Stop,
    Unrecognized(String),
}

impl FaultRequest {
    /// Splits a `<command> [flag value]...` argument string.
    ///
    /// Unknown commands are not an error; option errors are, but only for
    /// `cpu` and `mem`. `stop` ignores anything after it.
    pub fn parse(args: &str) -> Result<Self, FaultError> {
        let mut tokens = args.split_whitespace();
        let command = tokens.next().unwrap_or_default();

        match command {
            "cpu" => Ok(FaultRequest::Cpu(Options::parse_tokens(tokens)?)),
            "mem" => Ok(FaultRequest::Mem(Options::parse_tokens(tokens)?)),
            "stop" => Ok(FaultRequest::Stop),
            other => Ok(FaultRequest::Unrecognized(other.to_string())),
        }
    }
}
