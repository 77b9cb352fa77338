use std::fs;
use std::io;
use serde::{Deserialize, Serialize};

/// Resource usage of the process hosting the fault engine.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    pub user_cpu_secs: f64,
    pub system_cpu_secs: f64,
    pub max_rss_kb: u64,
    /// Only available where `/proc/self/statm` exists.
    pub resident_kb: Option<u64>,
}

impl ProcessUsage {
    pub fn cpu_secs(&self) -> f64 {
        self.user_cpu_secs + self.system_cpu_secs
    }
}

#[inline]
fn page_size() -> usize {
    use libc::{sysconf, _SC_PAGESIZE};
    unsafe {
        let ps = sysconf(_SC_PAGESIZE);
        if ps > 0 { ps as usize } else { 4096 }
    }
}

fn timeval_secs(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0
}

pub fn sample() -> io::Result<ProcessUsage> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let usage = unsafe { usage.assume_init() };

    // ru_maxrss is bytes on macOS, kilobytes elsewhere.
    let max_rss = usage.ru_maxrss.max(0) as u64;
    let max_rss_kb = if cfg!(target_os = "macos") { max_rss / 1024 } else { max_rss };

    Ok(ProcessUsage {
        user_cpu_secs: timeval_secs(usage.ru_utime),
        system_cpu_secs: timeval_secs(usage.ru_stime),
        max_rss_kb,
        resident_kb: resident_kb(),
    })
}

fn resident_kb() -> Option<u64> {
    let content = fs::read_to_string("/proc/self/statm").ok()?;
    parse_statm_resident(&content, page_size())
}

/// `MemAvailable` from `/proc/meminfo`, in bytes. `None` where the kernel
/// does not report it.
pub fn available_memory_bytes() -> Option<u64> {
    let content = fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_available(&content)
}

fn parse_meminfo_available(content: &str) -> Option<u64> {
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 { continue; }
        if parts[0] == "MemAvailable:" {
            let kb = parts[1].parse::<u64>().ok()?;
            return Some(kb.saturating_mul(1024));
        }
    }
    None
}

fn parse_statm_resident(content: &str, page_size: usize) -> Option<u64> {
    let pages = content.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(pages.saturating_mul(page_size as u64) / 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_this_process() {
        let usage = sample().unwrap();
        assert!(usage.user_cpu_secs >= 0.0);
        assert!(usage.system_cpu_secs >= 0.0);
        assert!(usage.max_rss_kb > 0);
    }

    #[test]
    fn statm_resident_is_second_field() {
        assert_eq!(parse_statm_resident("1000 256 10 1 0 100 0\n", 4096), Some(1024));
        assert_eq!(parse_statm_resident("1000", 4096), None);
        assert_eq!(parse_statm_resident("a b c", 4096), None);
    }

    #[test]
    fn meminfo_available_is_read_in_bytes() {
        let meminfo = "MemTotal:       16318480 kB\n\
                       MemFree:         1204480 kB\n\
                       MemAvailable:    8159240 kB\n\
                       Buffers:          412312 kB\n";
        assert_eq!(parse_meminfo_available(meminfo), Some(8_159_240 * 1024));
    }

    #[test]
    fn meminfo_without_available_line_is_unknown() {
        assert_eq!(parse_meminfo_available("MemTotal: 1000 kB\nMemFree: 10 kB\n"), None);
        assert_eq!(parse_meminfo_available("MemAvailable: lots kB\n"), None);
    }

    #[test]
    fn page_size_is_sane() {
        assert!(page_size() >= 4096);
    }
}
