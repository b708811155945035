//! Small integer-only PPG estimator.
//!
//! DC is tracked with an exponential running mean, beats are rising zero
//! crossings of the DC-free signal, and the rate comes from the mean of the
//! last few beat intervals. It is deliberately simple; any preprocessor that
//! honours the [`SignalPreprocessor`] contract can replace it.

use core::time::Duration;

use heapless::{Deque, HistoryBuf};

use super::{AmbientStatus, ResetScope, Sample, SignalPreprocessor};

/// Sampling cadence expected by [`BasicPpg`] (25 Hz).
pub const PPG_SAMPLE_CADENCE: Duration = Duration::from_millis(40);

/// Ambient reading above which the optical signal is considered swamped.
pub const DEFAULT_AMBIENT_THRESHOLD: u32 = 4_000;

const RAW_HISTORY: usize = 64;
const INTERVAL_WINDOW: usize = 8;
const MIN_INTERVALS: usize = 4;
// 240 bpm
const MIN_BEAT_MS: u32 = 250;
// 30 bpm
const MAX_BEAT_MS: u32 = 2_000;
// Running mean weight is 1 / 2^MEAN_SHIFT.
const MEAN_SHIFT: u32 = 3;

pub struct BasicPpg {
    ambient_threshold: u32,
    raw: HistoryBuf<u32, RAW_HISTORY>,
    mean: Option<i64>,
    previous_ac: i64,
    sample_index: u32,
    last_crossing: Option<u32>,
    intervals: Deque<u32, INTERVAL_WINDOW>,
}

impl BasicPpg {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_ambient_threshold(DEFAULT_AMBIENT_THRESHOLD)
    }

    #[must_use]
    pub const fn with_ambient_threshold(ambient_threshold: u32) -> Self {
        Self {
            ambient_threshold,
            raw: HistoryBuf::new(),
            mean: None,
            previous_ac: 0,
            sample_index: 0,
            last_crossing: None,
            intervals: Deque::new(),
        }
    }

    /// Number of raw samples currently retained.
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    /// Number of beat intervals collected since the last reset.
    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    fn cadence_ms() -> u32 {
        u32::try_from(PPG_SAMPLE_CADENCE.as_millis()).unwrap_or(u32::MAX)
    }

    fn record_crossing(&mut self) {
        let index = self.sample_index;
        let Some(previous) = self.last_crossing else {
            self.last_crossing = Some(index);
            return;
        };

        let interval = index.wrapping_sub(previous).saturating_mul(Self::cadence_ms());
        if interval < MIN_BEAT_MS {
            // Noise around the baseline; keep the earlier crossing.
            return;
        }

        self.last_crossing = Some(index);
        if interval > MAX_BEAT_MS {
            self.intervals.clear();
            return;
        }

        if self.intervals.is_full() {
            self.intervals.pop_front();
        }
        let _ = self.intervals.push_back(interval);
    }

    fn rebuild_mean_from_raw(&mut self) {
        let count = self.raw.len();
        if count == 0 {
            self.mean = None;
            return;
        }
        let sum: i64 = self.raw.oldest_ordered().map(|value| i64::from(*value)).sum();
        self.mean = i64::try_from(count).ok().map(|count| sum / count);
    }
}

impl Default for BasicPpg {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalPreprocessor for BasicPpg {
    fn preprocess(&mut self, sample: Sample) -> AmbientStatus {
        if sample.ambient > self.ambient_threshold {
            return AmbientStatus::Saturated;
        }

        self.raw.write(sample.ir);
        let value = i64::from(sample.ir);
        let mean = match self.mean {
            Some(mean) => mean + ((value - mean) >> MEAN_SHIFT),
            None => value,
        };
        self.mean = Some(mean);

        let ac = value - mean;
        if self.previous_ac < 0 && ac >= 0 {
            self.record_crossing();
        }
        self.previous_ac = ac;
        self.sample_index = self.sample_index.wrapping_add(1);

        AmbientStatus::Normal
    }

    fn heart_rate(&mut self) -> i32 {
        if self.intervals.len() < MIN_INTERVALS {
            return 0;
        }

        let (sum, min, max) = self.intervals.iter().fold(
            (0u32, u32::MAX, 0u32),
            |(sum, min, max), &interval| (sum + interval, min.min(interval), max.max(interval)),
        );
        let count = u32::try_from(self.intervals.len()).unwrap_or(u32::MAX);
        let mean = sum / count;
        if mean == 0 || max - min > mean / 2 {
            return -1;
        }

        i32::try_from(60_000 / mean).unwrap_or(i32::MAX)
    }

    fn reset(&mut self, scope: ResetScope) {
        self.intervals.clear();
        self.last_crossing = None;
        self.previous_ac = 0;
        match scope {
            ResetScope::Full => {
                self.raw.clear();
                self.mean = None;
                self.sample_index = 0;
            }
            ResetScope::KeepRawHistory => self.rebuild_mean_from_raw(),
        }
    }

    fn sample_cadence(&self) -> Duration {
        PPG_SAMPLE_CADENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Square wave around 10 000 with the given period in samples.
    fn pulse(index: u32, period: u32) -> Sample {
        let ir = if index % period < period / 2 { 10_500 } else { 9_500 };
        Sample::new(ir, 100)
    }

    #[test]
    fn converges_on_a_steady_pulse() {
        let mut ppg = BasicPpg::new();
        // 25 samples at 40 ms per beat is 60 bpm.
        for index in 0..40 {
            assert_eq!(ppg.preprocess(pulse(index, 25)), AmbientStatus::Normal);
        }
        assert_eq!(ppg.heart_rate(), 0);

        for index in 40..200 {
            ppg.preprocess(pulse(index, 25));
        }
        assert_eq!(ppg.heart_rate(), 60);
    }

    #[test]
    fn bright_ambient_reports_saturation_without_buffering() {
        let mut ppg = BasicPpg::new();
        let status = ppg.preprocess(Sample::new(10_000, DEFAULT_AMBIENT_THRESHOLD + 1));
        assert_eq!(status, AmbientStatus::Saturated);
        assert_eq!(ppg.raw_len(), 0);
    }

    #[test]
    fn irregular_intervals_request_a_reset() {
        let mut ppg = BasicPpg::new();
        let mut index = 0;
        for period in [25u32, 25, 10, 45, 12, 40, 25] {
            for step in 0..period {
                let ir = if step < period / 2 { 10_500 } else { 9_500 };
                ppg.preprocess(Sample::new(ir, 0));
                index += 1;
            }
        }
        assert!(index > 0);
        assert!(ppg.interval_count() >= MIN_INTERVALS);
        assert_eq!(ppg.heart_rate(), -1);
    }

    #[test]
    fn partial_reset_keeps_raw_history() {
        let mut ppg = BasicPpg::new();
        for index in 0..100 {
            ppg.preprocess(pulse(index, 25));
        }
        assert!(ppg.interval_count() > 0);

        ppg.reset(ResetScope::KeepRawHistory);
        assert_eq!(ppg.interval_count(), 0);
        assert_eq!(ppg.raw_len(), RAW_HISTORY);

        ppg.reset(ResetScope::Full);
        assert_eq!(ppg.raw_len(), 0);
    }
}
