//! Rolling metrics window (§4.1): time-bucketed success/latency statistics per node.
//!
//! A fixed-duration sample ring. `successRate` and `avgLatency` are computed
//! only over samples whose timestamp is within the window at read time;
//! expired samples are pruned lazily rather than swept on a timer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
struct Sample {
    at: Instant,
    success: bool,
    latency_ms: Option<u64>,
}

/// Snapshot of a window's statistics at one point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowSnapshot {
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub sample_count: usize,
}

/// Default window duration (30s, §3).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Bounded-memory ring of samples within a fixed duration window.
///
/// Not internally synchronized; callers (the health tracker) hold one per
/// node behind their own lock.
#[derive(Debug)]
pub struct RollingWindow {
    duration: Duration,
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            samples: VecDeque::new(),
            // Bounded: at most a few thousand samples is plenty for a 30s window
            // at realistic request rates; older ones are pruned on every operation.
            capacity: 4096,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > self.duration {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Records a successful sample. `latency_ms` must be non-negative (the
    /// type already enforces that); negative latencies are a caller bug and
    /// are rejected defensively via `i64` at the call boundary in the tracker.
    pub fn record_success(&mut self, latency_ms: u64) {
        let now = Instant::now();
        self.prune(now);
        self.samples.push_back(Sample {
            at: now,
            success: true,
            latency_ms: Some(latency_ms),
        });
    }

    pub fn record_failure(&mut self) {
        let now = Instant::now();
        self.prune(now);
        self.samples.push_back(Sample {
            at: now,
            success: false,
            latency_ms: None,
        });
    }

    /// Computes the snapshot, excluding samples older than the window even if
    /// `prune` has not run since they expired.
    pub fn snapshot(&self) -> WindowSnapshot {
        let now = Instant::now();
        let mut total = 0usize;
        let mut successes = 0usize;
        let mut latency_sum = 0u64;
        let mut latency_count = 0u64;
        for s in self.samples.iter().rev() {
            if now.duration_since(s.at) > self.duration {
                break;
            }
            total += 1;
            if s.success {
                successes += 1;
                if let Some(l) = s.latency_ms {
                    latency_sum += l;
                    latency_count += 1;
                }
            }
        }
        let success_rate = if total == 0 {
            0.0
        } else {
            successes as f64 / total as f64
        };
        let avg_latency_ms = if latency_count == 0 {
            0.0
        } else {
            latency_sum as f64 / latency_count as f64
        };
        WindowSnapshot {
            success_rate,
            avg_latency_ms,
            sample_count: total,
        }
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: an empty window reports success_rate 0 and no samples.
    #[test]
    fn empty_window_has_zero_success_rate() {
        let w = RollingWindow::default();
        let s = w.snapshot();
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.sample_count, 0);
        assert_eq!(s.avg_latency_ms, 0.0);
    }

    /// **Scenario**: mixed successes/failures compute the right success rate
    /// and average latency over successes only.
    #[test]
    fn success_rate_and_avg_latency_over_mixed_samples() {
        let mut w = RollingWindow::new(Duration::from_secs(30));
        w.record_success(100);
        w.record_success(200);
        w.record_failure();
        let s = w.snapshot();
        assert_eq!(s.sample_count, 3);
        assert!((s.success_rate - (2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(s.avg_latency_ms, 150.0);
    }

    /// **Scenario**: samples older than the window duration are excluded from
    /// the snapshot even without an explicit sweep.
    #[test]
    fn samples_outside_window_are_excluded_from_snapshot() {
        let mut w = RollingWindow::new(Duration::from_millis(20));
        w.record_success(10);
        std::thread::sleep(Duration::from_millis(40));
        w.record_failure();
        let s = w.snapshot();
        // Only the recent failure should count; the old success fell out of the window.
        assert_eq!(s.sample_count, 1);
        assert_eq!(s.success_rate, 0.0);
    }
}
