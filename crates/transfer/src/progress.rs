use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Snapshot handed to progress callbacks after each acknowledged chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Remote name of the file the chunk belonged to.
    pub file_name: String,
    /// Total bytes of all files in the operation.
    pub total_bytes: u64,
    /// Bytes acknowledged so far across all files.
    pub transferred_bytes: u64,
    pub chunks_sent: u64,
    pub total_chunks: u64,
}

impl TransferProgress {
    /// `100 × chunks_sent / total_chunks`, or 100 when there is nothing to send.
    pub fn percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        100.0 * self.chunks_sent as f64 / self.total_chunks as f64
    }

    pub fn is_done(&self) -> bool {
        self.chunks_sent >= self.total_chunks
    }
}

/// Upload or download rate over the last few seconds.
///
/// Fed with the running byte total after every chunk; the rate is the
/// growth of that total across the retained window.
#[derive(Debug, Clone)]
pub struct SpeedCalculator {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

const MAX_SAMPLES: usize = 256;

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl SpeedCalculator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Records the cumulative byte count reached now.
    pub fn record(&mut self, total_bytes: u64) {
        self.record_at(total_bytes, Instant::now());
    }

    fn record_at(&mut self, total_bytes: u64, now: Instant) {
        self.samples.push_back((now, total_bytes));
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
        // Keep one sample at or before the cutoff as the window's baseline.
        if let Some(cutoff) = now.checked_sub(self.window) {
            while self.samples.len() > 2 && self.samples[1].0 <= cutoff {
                self.samples.pop_front();
            }
        }
    }

    /// Bytes per second across the window, 0.0 until two samples exist.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(&(t0, b0)), Some(&(t1, b1))) = (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = t1.duration_since(t0);
        if elapsed.is_zero() {
            return 0.0;
        }
        b1.saturating_sub(b0) as f64 / elapsed.as_secs_f64()
    }

    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining_bytes as f64 / rate).ok()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(sent: u64, total: u64) -> TransferProgress {
        TransferProgress {
            file_name: "a".into(),
            total_bytes: 0,
            transferred_bytes: 0,
            chunks_sent: sent,
            total_chunks: total,
        }
    }

    #[test]
    fn percent_from_chunks() {
        assert_eq!(progress(0, 4).percent(), 0.0);
        assert_eq!(progress(1, 4).percent(), 25.0);
        assert_eq!(progress(4, 4).percent(), 100.0);
        assert!(progress(4, 4).is_done());
    }

    #[test]
    fn percent_with_nothing_to_send() {
        assert_eq!(progress(0, 0).percent(), 100.0);
    }

    #[test]
    fn rate_needs_two_samples() {
        let mut speed = SpeedCalculator::default();
        assert_eq!(speed.bytes_per_second(), 0.0);
        assert!(speed.eta(1000).is_none());
        speed.record(100);
        assert_eq!(speed.bytes_per_second(), 0.0);
    }

    #[test]
    fn rate_from_running_total() {
        let mut speed = SpeedCalculator::new(Duration::from_secs(10));
        let t0 = Instant::now();
        speed.record_at(0, t0);
        speed.record_at(1000, t0 + Duration::from_millis(500));
        speed.record_at(2000, t0 + Duration::from_secs(1));
        assert_eq!(speed.bytes_per_second(), 2000.0);
        assert_eq!(speed.eta(4000), Some(Duration::from_secs(2)));
    }

    #[test]
    fn old_samples_leave_the_window() {
        let mut speed = SpeedCalculator::new(Duration::from_secs(1));
        let t0 = Instant::now();
        speed.record_at(0, t0);
        speed.record_at(1_000_000, t0 + Duration::from_secs(5));
        speed.record_at(1_000_100, t0 + Duration::from_secs(6));
        assert_eq!(speed.samples.len(), 2);
        assert_eq!(speed.bytes_per_second(), 100.0);
    }

    #[test]
    fn sample_count_is_capped() {
        let mut speed = SpeedCalculator::new(Duration::from_secs(3600));
        let t0 = Instant::now();
        for i in 0..1000u64 {
            speed.record_at(i, t0 + Duration::from_millis(i));
        }
        assert_eq!(speed.samples.len(), MAX_SAMPLES);
    }

    #[test]
    fn reset_forgets_samples() {
        let mut speed = SpeedCalculator::default();
        let t0 = Instant::now();
        speed.record_at(0, t0);
        speed.record_at(500, t0 + Duration::from_secs(1));
        speed.reset();
        assert_eq!(speed.bytes_per_second(), 0.0);
    }
}
