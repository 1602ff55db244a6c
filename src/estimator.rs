use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How often the UI asks the estimator for a fresh percentage.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Ceiling for heuristic progress. 100% is reserved for confirmed completion.
const HEURISTIC_CAP: u8 = 99;

/// Timer-based progress for jobs with no push channel (image-to-video).
///
/// Progress is illustrative, not authoritative: it is `elapsed / estimated`
/// capped at 99%, monotonically non-decreasing, and only reaches 100% after
/// [`ProgressEstimator::confirm_complete`]. Real status arriving from the
/// server can ratchet the floor up via [`ProgressEstimator::observe_real`],
/// but displayed progress never regresses below what was already shown.
#[derive(Debug)]
pub struct ProgressEstimator {
    started: Instant,
    estimated: Duration,
    last_percent: u8,
    completed: bool,
}

impl ProgressEstimator {
    pub fn new(estimated_seconds: u64) -> Self {
        Self {
            started: Instant::now(),
            // A zero estimate would jump straight to the cap.
            estimated: Duration::from_secs(estimated_seconds.max(1)),
            last_percent: 0,
            completed: false,
        }
    }

    /// Current heuristic percentage, in `[0, 99]` until completion.
    pub fn percent(&mut self) -> u8 {
        let elapsed = self.started.elapsed();
        self.percent_at(elapsed)
    }

    fn percent_at(&mut self, elapsed: Duration) -> u8 {
        if self.completed {
            return 100;
        }
        let ratio = elapsed.as_secs_f64() / self.estimated.as_secs_f64();
        let raw = (ratio * 100.0).floor() as u64;
        let capped = raw.min(HEURISTIC_CAP as u64) as u8;
        self.last_percent = self.last_percent.max(capped);
        self.last_percent
    }

    /// Fold in authoritative progress from the server, keeping the display
    /// monotone even when the heuristic is ahead of reality.
    pub fn observe_real(&mut self, percent: u8) {
        if !self.completed {
            self.last_percent = self.last_percent.max(percent.min(HEURISTIC_CAP));
        }
    }

    /// Whether the delayed poll should start. Polling is intentionally held
    /// off for the full estimated duration to avoid hammering the server
    /// during the predictable processing window.
    pub fn poll_due(&self) -> bool {
        self.started.elapsed() >= self.estimated
    }

    /// Mark the job confirmed complete; `percent` now reports 100.
    pub fn confirm_complete(&mut self) {
        self.completed = true;
        self.last_percent = 100;
    }

    /// Milliseconds since the job was submitted.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Rolling log of real completion durations, bucketed by output resolution.
///
/// Used to seed the estimator when the server omits `estimated_seconds`
/// from a submission receipt.
#[derive(Debug, Default)]
pub struct DurationLog {
    samples: Mutex<HashMap<ResolutionBucket, (u64, u64)>>,
}

/// Groups outputs by pixel count for duration averaging.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ResolutionBucket {
    Small,
    Medium,
    Large,
    Unknown,
}

impl ResolutionBucket {
    /// Thresholds: <500K pixels = Small, <2M = Medium, else Large.
    pub fn from_dimensions(width: Option<u32>, height: Option<u32>) -> Self {
        match (width, height) {
            (Some(w), Some(h)) => {
                let pixels = w as u64 * h as u64;
                if pixels < 500_000 {
                    Self::Small
                } else if pixels < 2_000_000 {
                    Self::Medium
                } else {
                    Self::Large
                }
            }
            _ => Self::Unknown,
        }
    }
}

impl DurationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed completion duration.
    pub fn record(&self, bucket: ResolutionBucket, duration_secs: u64) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let entry = samples.entry(bucket).or_insert((0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// Average duration for the bucket, falling back to `Unknown`, then to
    /// the overall average. `None` when no data exists at all.
    pub fn estimate_secs(&self, bucket: ResolutionBucket) -> Option<u64> {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let avg = |entry: &(u64, u64)| -> u64 {
            if entry.1 == 0 {
                0
            } else {
                entry.0 / entry.1
            }
        };
        if let Some(entry) = samples.get(&bucket) {
            return Some(avg(entry));
        }
        if let Some(entry) = samples.get(&ResolutionBucket::Unknown) {
            return Some(avg(entry));
        }
        let (total, count) = samples
            .values()
            .fold((0u64, 0u64), |(t, c), e| (t + e.0, c + e.1));
        if count == 0 {
            None
        } else {
            Some(total / count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_tracks_elapsed() {
        let mut est = ProgressEstimator::new(100);
        assert_eq!(est.percent_at(Duration::from_secs(0)), 0);
        assert_eq!(est.percent_at(Duration::from_secs(30)), 30);
        assert_eq!(est.percent_at(Duration::from_secs(75)), 75);
    }

    #[test]
    fn test_percent_caps_at_99_until_confirmed() {
        let mut est = ProgressEstimator::new(10);
        assert_eq!(est.percent_at(Duration::from_secs(10)), 99);
        assert_eq!(est.percent_at(Duration::from_secs(1000)), 99);
        est.confirm_complete();
        assert_eq!(est.percent(), 100);
    }

    #[test]
    fn test_percent_is_monotone() {
        let mut est = ProgressEstimator::new(100);
        assert_eq!(est.percent_at(Duration::from_secs(50)), 50);
        // A smaller elapsed value (clock weirdness) must not regress.
        assert_eq!(est.percent_at(Duration::from_secs(20)), 50);
    }

    #[test]
    fn test_observe_real_ratchets_floor() {
        let mut est = ProgressEstimator::new(100);
        est.observe_real(40);
        assert_eq!(est.percent_at(Duration::from_secs(10)), 40);
        // Real progress never pushes the display to 100 on its own.
        est.observe_real(100);
        assert_eq!(est.percent_at(Duration::from_secs(10)), 99);
    }

    #[test]
    fn test_zero_estimate_does_not_divide_by_zero() {
        let mut est = ProgressEstimator::new(0);
        let p = est.percent_at(Duration::from_millis(100));
        assert!(p <= 99);
    }

    #[test]
    fn test_poll_not_due_immediately() {
        let est = ProgressEstimator::new(3600);
        assert!(!est.poll_due());
    }

    #[test]
    fn test_duration_log_average() {
        let log = DurationLog::new();
        log.record(ResolutionBucket::Medium, 40);
        log.record(ResolutionBucket::Medium, 60);
        assert_eq!(log.estimate_secs(ResolutionBucket::Medium), Some(50));
    }

    #[test]
    fn test_duration_log_fallback_chain() {
        let log = DurationLog::new();
        assert_eq!(log.estimate_secs(ResolutionBucket::Large), None);
        log.record(ResolutionBucket::Small, 20);
        // No Large or Unknown data: falls back to the overall average.
        assert_eq!(log.estimate_secs(ResolutionBucket::Large), Some(20));
        log.record(ResolutionBucket::Unknown, 100);
        assert_eq!(log.estimate_secs(ResolutionBucket::Large), Some(100));
    }

    #[test]
    fn test_resolution_buckets() {
        assert_eq!(
            ResolutionBucket::from_dimensions(Some(512), Some(512)),
            ResolutionBucket::Small
        );
        assert_eq!(
            ResolutionBucket::from_dimensions(Some(1024), Some(1024)),
            ResolutionBucket::Medium
        );
        assert_eq!(
            ResolutionBucket::from_dimensions(Some(1920), Some(1080)),
            ResolutionBucket::Large
        );
        assert_eq!(
            ResolutionBucket::from_dimensions(None, Some(512)),
            ResolutionBucket::Unknown
        );
    }
}
