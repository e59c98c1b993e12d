use media_io::ParsedSignal;
use serde::{Deserialize, Serialize};

/// Highest percentage heartbeats can reach; only a clean exit reports 100.
pub const HEARTBEAT_CAP: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub elapsed_seconds: f64,
    pub percent: u8,
}

/// Turns parsed stderr signals into a non-decreasing percentage.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    duration: f64,
    elapsed: f64,
    percent: u8,
}

impl ProgressTracker {
    /// `duration <= 0` means unknown and selects heartbeat estimation.
    pub fn new(duration: f64) -> Self {
        Self {
            duration: if duration.is_finite() { duration.max(0.0) } else { 0.0 },
            elapsed: 0.0,
            percent: 0,
        }
    }

    pub fn has_duration(&self) -> bool {
        self.duration > 0.0
    }

    pub fn sample(&self) -> ProgressSample {
        ProgressSample {
            elapsed_seconds: self.elapsed,
            percent: self.percent,
        }
    }

    /// Feed one signal; returns the new sample when the percentage moved.
    pub fn apply(&mut self, signal: ParsedSignal) -> Option<ProgressSample> {
        let before = self.percent;
        match signal {
            ParsedSignal::TimeSample(seconds) if self.has_duration() => {
                self.elapsed = self.elapsed.max(seconds);
                let ratio = (seconds / self.duration * 100.0).floor().clamp(0.0, 100.0);
                self.percent = self.percent.max(ratio as u8);
            }
            ParsedSignal::TimeSample(seconds) => {
                self.elapsed = self.elapsed.max(seconds);
                self.heartbeat();
            }
            ParsedSignal::Heartbeat if !self.has_duration() => self.heartbeat(),
            ParsedSignal::Heartbeat | ParsedSignal::None => {}
        }
        (self.percent != before).then(|| self.sample())
    }

    /// Mark the job finished; returns the sample if it was not already at 100.
    pub fn complete(&mut self) -> Option<ProgressSample> {
        if self.percent == 100 {
            return None;
        }
        self.percent = 100;
        if self.has_duration() {
            self.elapsed = self.elapsed.max(self.duration);
        }
        Some(self.sample())
    }

    fn heartbeat(&mut self) {
        if self.percent < HEARTBEAT_CAP {
            self.percent += 1;
        }
    }
}
