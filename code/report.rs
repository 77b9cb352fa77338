use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::ReportError;
use crate::telemetry::TelemetrySnapshot;
use crate::usage::ProcessUsage;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Snapshot {
    pub iteration: usize,
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub telemetry: TelemetrySnapshot,
    pub usage: Option<ProcessUsage>,
}

impl Snapshot {
    pub fn new(iteration: usize, telemetry: TelemetrySnapshot, usage: Option<ProcessUsage>) -> Self {
        Self {
            iteration,
            timestamp: chrono::Local::now(),
            telemetry,
            usage,
        }
    }

    pub fn status_line(&self) -> String {
        let t = &self.telemetry;
        let mut line = format!(
            "[STATUS] cpu workers: {} | mem workers: {} | allocs: {}/{} | retained: {:.1} MB",
            t.cpu_active,
            t.mem_active,
            t.alloc_successes,
            t.alloc_attempts,
            t.retained_bytes as f64 / (1024.0 * 1024.0),
        );
        if let Some(u) = &self.usage {
            line.push_str(&format!(
                " | cpu time: {:.1}s | max rss: {} MB",
                u.cpu_secs(),
                u.max_rss_kb / 1024
            ));
        }
        line
    }

    pub fn print_compact(&self) {
        println!("{}", self.status_line());
        if self.telemetry.alloc_failures > 0 {
            println!("  memory fault degraded after {} failed allocation(s)", self.telemetry.alloc_failures);
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    pub total_snapshots: usize,
    pub duration_seconds: i64,
    pub peak_cpu_workers: u64,
    pub peak_mem_workers: u64,
    pub peak_retained_bytes: u64,
    pub cpu_iterations: u64,
    pub alloc_attempts: u64,
    pub alloc_successes: u64,
    pub alloc_failures: u64,
    pub cpu_seconds: f64,
    pub peak_rss_kb: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionReport {
    pub report_id: String,
    pub generation_time: chrono::DateTime<chrono::Local>,
    pub commands: Vec<String>,
    pub snapshots: Vec<Snapshot>,
    pub statistics: Statistics,
}

impl SessionReport {
    pub fn new(commands: Vec<String>, snapshots: Vec<Snapshot>) -> Self {
        let statistics = Self::calculate_statistics(&snapshots);
        let report_id = format!("fault_session_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));

        Self {
            report_id,
            generation_time: chrono::Local::now(),
            commands,
            snapshots,
            statistics,
        }
    }

    fn calculate_statistics(snapshots: &[Snapshot]) -> Statistics {
        let duration_seconds = match (snapshots.first(), snapshots.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds(),
            _ => 0,
        };

        // Counters are monotonic, so the last snapshot holds the totals.
        let last = snapshots.last().map(|s| s.telemetry).unwrap_or_default();
        let peak = |f: fn(&TelemetrySnapshot) -> u64| {
            snapshots.iter().map(|s| f(&s.telemetry)).max().unwrap_or(0)
        };

        let cpu_seconds = snapshots
            .iter()
            .filter_map(|s| s.usage)
            .map(|u| u.cpu_secs())
            .fold(0.0, f64::max);
        let peak_rss_kb = snapshots
            .iter()
            .filter_map(|s| s.usage)
            .map(|u| u.max_rss_kb)
            .max()
            .unwrap_or(0);

        Statistics {
            total_snapshots: snapshots.len(),
            duration_seconds,
            peak_cpu_workers: peak(|t| t.cpu_active),
            peak_mem_workers: peak(|t| t.mem_active),
            peak_retained_bytes: peak(|t| t.retained_bytes),
            cpu_iterations: last.cpu_iterations,
            alloc_attempts: last.alloc_attempts,
            alloc_successes: last.alloc_successes,
            alloc_failures: last.alloc_failures,
            cpu_seconds,
            peak_rss_kb,
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<PathBuf, ReportError> {
        let json = serde_json::to_string_pretty(&self)?;
        fs::write(path, json)?;
        Ok(path.to_path_buf())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ReportError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn print_summary(&self) {
        let s = &self.statistics;
        println!("\n=== FAULT SESSION REPORT ===");
        println!("Commands: {}", self.commands.join(" ; "));
        println!("Duration: {} seconds", s.duration_seconds);
        println!("Total Snapshots: {}", s.total_snapshots);
        println!("-- CPU:    peak workers {} | busy-work iterations {}", s.peak_cpu_workers, s.cpu_iterations);
        println!("-- MEMORY: peak workers {} | allocations {}/{} | failures {} | peak retained {:.1} MB",
                 s.peak_mem_workers,
                 s.alloc_successes,
                 s.alloc_attempts,
                 s.alloc_failures,
                 s.peak_retained_bytes as f64 / (1024.0 * 1024.0));
        println!("-- PROCESS: cpu time {:.1}s | peak rss {} MB", s.cpu_seconds, s.peak_rss_kb / 1024);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(iteration: usize, cpu_active: u64, retained_bytes: u64, attempts: u64) -> Snapshot {
        let telemetry = TelemetrySnapshot {
            cpu_active,
            retained_bytes,
            alloc_attempts: attempts,
            alloc_successes: attempts,
            ..TelemetrySnapshot::default()
        };
        let usage = ProcessUsage { user_cpu_secs: iteration as f64, max_rss_kb: 2048, ..ProcessUsage::default() };
        Snapshot::new(iteration, telemetry, Some(usage))
    }

    #[test]
    fn empty_session_has_zero_statistics() {
        let report = SessionReport::new(vec![], vec![]);
        assert_eq!(report.statistics.total_snapshots, 0);
        assert_eq!(report.statistics.peak_cpu_workers, 0);
        assert_eq!(report.statistics.cpu_seconds, 0.0);
    }

    #[test]
    fn statistics_take_peaks_and_totals() {
        let snapshots = vec![
            snapshot(1, 4, 1024, 1),
            snapshot(2, 2, 4096, 3),
            snapshot(3, 0, 0, 5),
        ];
        let report = SessionReport::new(vec!["cpu -t 4".into()], snapshots);
        let s = &report.statistics;

        assert_eq!(s.total_snapshots, 3);
        assert_eq!(s.peak_cpu_workers, 4);
        assert_eq!(s.peak_retained_bytes, 4096);
        assert_eq!(s.alloc_attempts, 5);
        assert_eq!(s.cpu_seconds, 3.0);
        assert_eq!(s.peak_rss_kb, 2048);
    }

    #[test]
    fn status_line_mentions_workers() {
        let line = snapshot(1, 3, 2 * 1024 * 1024, 2).status_line();
        assert!(line.starts_with("[STATUS] cpu workers: 3"));
        assert!(line.contains("retained: 2.0 MB"));
    }

    #[test]
    fn report_survives_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let report = SessionReport::new(vec!["mem -k".into()], vec![snapshot(1, 0, 1024, 1)]);
        let saved = report.save_to_file(&path).unwrap();
        assert_eq!(saved, path);

        let loaded = SessionReport::load_from_file(&path).unwrap();
        assert_eq!(loaded.commands, vec!["mem -k".to_string()]);
        assert_eq!(loaded.statistics, report.statistics);
    }

    #[test]
    fn report_keeps_every_delivered_command() {
        let commands = vec!["cpu -d 30 -t 2".to_string(), "mem -m 8 -k".to_string(), "stop".to_string()];
        let report = SessionReport::new(commands.clone(), vec![snapshot(1, 2, 0, 0)]);
        assert_eq!(report.commands, commands);

        let json = serde_json::to_string(&report).unwrap();
        let decoded: SessionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.commands, commands);
    }

    #[test]
    fn missing_report_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionReport::load_from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
