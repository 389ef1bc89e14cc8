//! Per-phase resource logging for long mapping runs.
//!
//! Built on `sysinfo`, which only ships with the `cli` feature. Library
//! builds get a monitor with the same surface that never logs.

#[cfg(feature = "cli")]
pub use probe::{ResourceUsage, RunMonitor};

#[cfg(feature = "cli")]
mod probe {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

    const MIB: u64 = 1024 * 1024;

    #[derive(Debug, Clone)]
    pub struct ResourceUsage {
        pub cpu_percent: f32,
        pub resident_mb: u64,
        pub share_of_total: f32,
        pub peak_mb: u64,
        pub since_start: Duration,
    }

    struct Probe {
        system: System,
        pid: Pid,
        phase_started: Instant,
        peak_mb: u64,
    }

    impl Probe {
        fn sample(&mut self, started: Instant) -> Option<ResourceUsage> {
            self.system.refresh_memory();
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[self.pid]),
                true,
                ProcessRefreshKind::everything(),
            );
            let process = self.system.process(self.pid)?;

            let resident_mb = process.memory() / MIB;
            let total_mb = self.system.total_memory() / MIB;
            self.peak_mb = self.peak_mb.max(resident_mb);

            Some(ResourceUsage {
                cpu_percent: process.cpu_usage(),
                resident_mb,
                share_of_total: if total_mb == 0 {
                    0.0
                } else {
                    resident_mb as f32 * 100.0 / total_mb as f32
                },
                peak_mb: self.peak_mb,
                since_start: started.elapsed(),
            })
        }
    }

    /// Logs process CPU and memory after each ETL phase.
    pub struct RunMonitor {
        probe: Option<Mutex<Probe>>,
        started: Instant,
    }

    impl RunMonitor {
        pub fn new(enabled: bool) -> Self {
            let started = Instant::now();
            if !enabled {
                return Self { probe: None, started };
            }

            let probe = match sysinfo::get_current_pid() {
                Ok(pid) => Some(Mutex::new(Probe {
                    system: System::new_with_specifics(RefreshKind::nothing()),
                    pid,
                    phase_started: started,
                    peak_mb: 0,
                })),
                Err(e) => {
                    tracing::warn!("Resource monitoring disabled, no process id: {}", e);
                    None
                }
            };
            Self { probe, started }
        }

        pub fn is_enabled(&self) -> bool {
            self.probe.is_some()
        }

        pub fn sample(&self) -> Option<ResourceUsage> {
            let mut probe = self.probe.as_ref()?.lock().ok()?;
            probe.sample(self.started)
        }

        /// Logs the phase duration, how many items it produced and current usage.
        pub fn phase_finished(&self, phase: &str, items: usize) {
            let Some(lock) = &self.probe else {
                return;
            };
            let Ok(mut probe) = lock.lock() else {
                return;
            };
            let took = probe.phase_started.elapsed();
            probe.phase_started = Instant::now();

            if let Some(usage) = probe.sample(self.started) {
                tracing::info!(
                    "📊 {} produced {} items in {:?} (CPU {:.1}%, RSS {}MB / {:.1}%, peak {}MB)",
                    phase,
                    items,
                    took,
                    usage.cpu_percent,
                    usage.resident_mb,
                    usage.share_of_total,
                    usage.peak_mb
                );
            }
        }

        pub fn log_final_stats(&self) {
            if let Some(usage) = self.sample() {
                tracing::info!(
                    "📊 Run finished in {:?}, peak RSS {}MB",
                    usage.since_start,
                    usage.peak_mb
                );
            }
        }
    }

    impl Default for RunMonitor {
        fn default() -> Self {
            Self::new(false)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_disabled_monitor_is_silent() {
            let monitor = RunMonitor::new(false);
            assert!(!monitor.is_enabled());
            assert!(monitor.sample().is_none());
            monitor.phase_finished("extract", 3);
            monitor.log_final_stats();
        }

        #[test]
        fn test_peak_never_drops() {
            let monitor = RunMonitor::new(true);
            if let Some(first) = monitor.sample() {
                let second = monitor.sample().unwrap();
                assert!(second.peak_mb >= first.resident_mb);
                assert!(second.peak_mb >= first.peak_mb);
            }
        }
    }
}

#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct RunMonitor;

#[cfg(not(feature = "cli"))]
impl RunMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn phase_finished(&self, _phase: &str, _items: usize) {}

    pub fn log_final_stats(&self) {}
}
