//! Periodic producer of metric snapshots.
//!
//! Each poll tick samples two independent sources concurrently (process
//! statistics and system statistics) and waits for both before merging,
//! so a tick's snapshot is internally consistent relative to its own start.
//! A tick where every source yields nothing produces no snapshot at all;
//! downstream stages treat that as a no-op.

use crate::metrics::Snapshot;
use rand::Rng;

/// Counter bumped once per completed tick.
pub const POLL_COUNT: &str = "PollCount";
/// Gauge refreshed with a random sample every tick.
pub const RANDOM_VALUE: &str = "RandomValue";

/// Stateless runtime/system sampler. All tick-local state lives in the
/// snapshot it returns.
#[derive(Debug, Default)]
pub struct Sampler;

impl Sampler {
    pub fn new() -> Self {
        Self
    }

    /// Runs one sampling tick. Returns `None` when no source yielded.
    pub async fn sample(&self) -> Option<Snapshot> {
        let (process, system) = tokio::join!(sample_process(), sample_system());
        if process.is_none() && system.is_none() {
            return None;
        }

        let mut snapshot = Snapshot::new();
        if let Some(process) = process {
            snapshot.merge(process);
        }
        if let Some(system) = system {
            snapshot.merge(system);
        }

        // Self-describing telemetry about the sampler, merged like any
        // other metric.
        snapshot.add_counter(POLL_COUNT, 1);
        snapshot.set_gauge(RANDOM_VALUE, rand::thread_rng().gen::<f64>());

        Some(snapshot)
    }
}

/// Process-level source: memory footprint from /proc/self/status. The kB
/// fields there are page-size independent, unlike statm's page counts.
#[cfg(target_os = "linux")]
async fn sample_process() -> Option<Snapshot> {
    let status = tokio::fs::read_to_string("/proc/self/status").await.ok()?;
    let mut snapshot = Snapshot::new();
    for line in status.lines() {
        let gauge = match line.split(':').next() {
            Some("VmSize") => "VirtualBytes",
            Some("VmRSS") => "ResidentSetBytes",
            _ => continue,
        };
        if let Some(kb) = parse_kb_line(line) {
            snapshot.set_gauge(gauge, (kb * 1024) as f64);
        }
    }
    if snapshot.is_empty() {
        None
    } else {
        Some(snapshot)
    }
}

/// System-level source: memory from /proc/meminfo, load from /proc/loadavg.
#[cfg(target_os = "linux")]
async fn sample_system() -> Option<Snapshot> {
    let (meminfo, loadavg) = tokio::join!(
        tokio::fs::read_to_string("/proc/meminfo"),
        tokio::fs::read_to_string("/proc/loadavg"),
    );

    let mut snapshot = Snapshot::new();

    if let Ok(meminfo) = meminfo {
        for line in meminfo.lines() {
            let gauge = match line.split(':').next() {
                Some("MemTotal") => "MemTotal",
                Some("MemFree") => "MemFree",
                Some("MemAvailable") => "MemAvailable",
                _ => continue,
            };
            if let Some(kb) = parse_kb_line(line) {
                snapshot.set_gauge(gauge, (kb * 1024) as f64);
            }
        }
    }

    if let Ok(loadavg) = loadavg {
        if let Some(load1) = loadavg
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok())
        {
            snapshot.set_gauge("LoadAverage1m", load1);
        }
    }

    if snapshot.is_empty() {
        None
    } else {
        Some(snapshot)
    }
}

/// Parses the numeric kB value out of a `Key:   N kB` line, the shared
/// format of /proc/meminfo and /proc/self/status.
#[cfg(target_os = "linux")]
fn parse_kb_line(line: &str) -> Option<u64> {
    line.split(':').nth(1)?.split_whitespace().next()?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
async fn sample_process() -> Option<Snapshot> {
    None
}

#[cfg(not(target_os = "linux"))]
async fn sample_system() -> Option<Snapshot> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_tick_yields_self_telemetry() {
        let sampler = Sampler::new();
        let snapshot = sampler.sample().await.expect("linux /proc sources available");
        assert_eq!(snapshot.counters[POLL_COUNT], 1);
        let random = snapshot.gauges[RANDOM_VALUE];
        assert!((0.0..1.0).contains(&random));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_process_source_reports_memory() {
        let snapshot = sample_process().await.unwrap();
        assert!(snapshot.gauges["ResidentSetBytes"] > 0.0);
        assert!(snapshot.gauges["VirtualBytes"] > 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_kb_line() {
        assert_eq!(parse_kb_line("MemTotal:       16280636 kB"), Some(16280636));
        assert_eq!(parse_kb_line("VmRSS:\t    5124 kB"), Some(5124));
        assert_eq!(parse_kb_line("garbage"), None);
    }

    #[cfg(not(target_os = "linux"))]
    #[tokio::test]
    async fn test_empty_tick_yields_no_snapshot() {
        let sampler = Sampler::new();
        assert!(sampler.sample().await.is_none());
    }
}
