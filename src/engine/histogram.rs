//! Module: histogram
//!
//! Purpose: Statistical analysis of the inter-arrival window. Produces the
//! inputs of the recommendation factor: a 9-region deviation histogram, the
//! continuous-burst maximum, the nominal packet time and the mean receive
//! cost. Also maintains the decaying factor-delta window used as a channel
//! volatility estimate.
//!
//! All math is integer. Nominal packet time derives from the frame counts:
//! one audio frame is 128 PCM samples, so a window holding `F` frames over
//! `n` packets at `khz` kHz has a nominal inter-arrival of
//! `128_000 * F / khz / n` microseconds.

use super::sampler::SourceSamples;

/// Number of deviation regions.
pub const REGION_COUNT: usize = 9;

/// Region a zero-deviation sample classifies into.
pub const CENTER_REGION: usize = 3;

/// Region boundaries as percent-of-nominal deviation.
const REGION_BOUNDS_PCT: [u64; 5] = [10, 25, 50, 100, 200];

/// Lowest region index counted as a "big" deviation by the burst detector.
const BIG_REGION: usize = 5;

/// PCM samples per audio frame.
pub const SAMPLES_PER_FRAME: u64 = 128;

/// Derived statistics of one analysis pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistogramResult {
    /// Nominal inter-arrival time, microseconds.
    pub nominal_us: u64,
    /// Nominal packet payload, PCM samples.
    pub nominal_samples: u64,
    /// Mean observed inter-arrival time, microseconds.
    pub recv_cost_us: u64,
    /// Dominant jitter-burst signal: largest running burst sum seen,
    /// floored at the largest single-sample deviation, microseconds.
    pub cbig_max_us: u64,
    /// Largest single positive deviation, microseconds.
    pub single_max_us: u64,
    /// True when the burst detector fired during this pass.
    pub burst_seen: bool,
}

/// Deviation histogram with burst tracking.
///
/// `cbig_max`/`single_max` survive across analysis passes until `clear()`
/// so a short convergence burst is not forgotten between passes.
pub struct JitterHistogram {
    regions: [u32; REGION_COUNT],
    cbig_max_us: u64,
    single_max_us: u64,
}

impl JitterHistogram {
    pub const fn new() -> Self {
        Self {
            regions: [0; REGION_COUNT],
            cbig_max_us: 0,
            single_max_us: 0,
        }
    }

    /// Burst arming threshold as percent-of-nominal span. 200% at
    /// smoothing 0, stepping down to 150% at smoothing 5: a padded
    /// tuning watches for smaller bursts because it intends to cover
    /// them with buffer.
    pub const fn burst_threshold_pct(smoothing_factor: u8) -> u64 {
        let lowered = (smoothing_factor as u64) * 10;
        if lowered > 50 {
            150
        } else {
            200 - lowered
        }
    }

    /// Classify a deviation into its region.
    ///
    /// Magnitude buckets by percent of nominal at 10/25/50/100/200, folded
    /// around the center by deviation sign, clamped into 0..=8.
    pub fn region_index(dev_us: i64, nominal_us: u64) -> usize {
        if nominal_us == 0 {
            return CENTER_REGION;
        }
        let pct = (dev_us.unsigned_abs()).saturating_mul(100) / nominal_us;
        let mut steps = REGION_BOUNDS_PCT.len();
        for (i, bound) in REGION_BOUNDS_PCT.iter().enumerate() {
            if pct < *bound {
                steps = i;
                break;
            }
        }
        if dev_us >= 0 {
            (CENTER_REGION + steps).min(REGION_COUNT - 1)
        } else {
            CENTER_REGION.saturating_sub(steps)
        }
    }

    /// Analyze the current window. Returns `None` when the window is
    /// empty or degenerate (no frames yet).
    pub fn analyze(
        &mut self,
        samples: &SourceSamples,
        khz: u32,
        smoothing_factor: u8,
    ) -> Option<HistogramResult> {
        let n = samples.len() as u64;
        if n == 0 {
            return None;
        }

        let mut frame_sum: u64 = 0;
        let mut span_sum: u64 = 0;
        for s in samples.iter() {
            frame_sum += s.frames as u64;
            span_sum += s.span_us as u64;
        }

        let nominal_samples = SAMPLES_PER_FRAME * frame_sum / n;
        let nominal_us = SAMPLES_PER_FRAME * frame_sum * 1_000 / (khz as u64) / n;
        if nominal_us == 0 {
            return None;
        }
        let recv_cost_us = span_sum / n;

        // Excess over nominal at which a sample arms the burst detector.
        let threshold_pct = Self::burst_threshold_pct(smoothing_factor);
        let arm_excess_us = (nominal_us * (threshold_pct - 100) / 100) as i64;

        let mut burst_active = false;
        let mut burst_sum: i64 = 0;
        let mut burst_len: u32 = 0;
        let mut burst_seen = false;

        for s in samples.iter() {
            let dev = s.span_us as i64 - nominal_us as i64;
            let region = Self::region_index(dev, nominal_us);
            self.regions[region] += 1;

            if dev > self.single_max_us as i64 {
                self.single_max_us = dev as u64;
            }

            if burst_active {
                burst_sum += dev;
                burst_len += 1;
                if burst_sum > self.cbig_max_us as i64 {
                    self.cbig_max_us = burst_sum as u64;
                }
                // Run ends when the accumulated excess collapses: hard
                // stop below 80% of the arming excess, soft stop below
                // the full excess once the run is at least 5 long.
                if burst_sum < arm_excess_us * 8 / 10
                    || (burst_len >= 5 && burst_sum < arm_excess_us)
                {
                    burst_active = false;
                }
            } else if dev >= arm_excess_us && region >= BIG_REGION {
                burst_active = true;
                burst_seen = true;
                burst_sum = dev;
                burst_len = 1;
                if burst_sum > self.cbig_max_us as i64 {
                    self.cbig_max_us = burst_sum as u64;
                }
            }
        }

        // The burst signal never undercuts the worst single sample.
        if self.single_max_us > self.cbig_max_us {
            self.cbig_max_us = self.single_max_us;
        }

        Some(HistogramResult {
            nominal_us,
            nominal_samples,
            recv_cost_us,
            cbig_max_us: self.cbig_max_us,
            single_max_us: self.single_max_us,
            burst_seen,
        })
    }

    /// Region counts (diagnostics).
    #[inline]
    pub fn regions(&self) -> &[u32; REGION_COUNT] {
        &self.regions
    }

    /// Reset all accumulators. Skipped while quick-calc keeps the burst
    /// history warm.
    pub fn clear(&mut self) {
        self.regions = [0; REGION_COUNT];
        self.cbig_max_us = 0;
        self.single_max_us = 0;
    }
}

impl Default for JitterHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Trailing window size of the volatility estimator.
pub const FACTOR_WINDOW_SLOTS: usize = 8;

/// Exponentially shifted slot weights, percent. Sum is 100.
const FACTOR_WEIGHTS: [u64; FACTOR_WINDOW_SLOTS] = [35, 22, 15, 11, 7, 5, 3, 2];

/// Decaying window of squared recommendation-factor deltas.
///
/// A channel whose factor swings period-to-period gets extra buffer on
/// top of the raw recommendation; the weighted sum is that swing measure.
pub struct FactorWindow {
    slots: [u64; FACTOR_WINDOW_SLOTS],
    last_factor: Option<u32>,
}

impl FactorWindow {
    pub const fn new() -> Self {
        Self {
            slots: [0; FACTOR_WINDOW_SLOTS],
            last_factor: None,
        }
    }

    /// Fold in this period's factor.
    pub fn push(&mut self, factor: u32) {
        if let Some(prev) = self.last_factor {
            let delta = factor.abs_diff(prev) as u64;
            self.slots.rotate_right(1);
            self.slots[0] = delta * delta;
        }
        self.last_factor = Some(factor);
    }

    /// Weighted volatility estimate.
    pub fn volatility(&self) -> u64 {
        self.slots
            .iter()
            .zip(FACTOR_WEIGHTS.iter())
            .map(|(slot, weight)| slot * weight)
            .sum::<u64>()
            / 100
    }

    pub fn clear(&mut self) {
        self.slots = [0; FACTOR_WINDOW_SLOTS];
        self.last_factor = None;
    }
}

impl Default for FactorWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_window(span_us: u64, frames: u32, count: usize) -> SourceSamples {
        let mut samples = SourceSamples::new();
        let mut t = 0u64;
        samples.record(t, frames);
        for _ in 0..count {
            t += span_us;
            samples.record(t, frames);
        }
        samples
    }

    #[test]
    fn test_nominal_matches_cadence() {
        // 4 frames of 128 samples at 48 kHz: 512 samples = 10667 us.
        let samples = steady_window(10_667, 4, 24);
        let mut hist = JitterHistogram::new();
        let result = hist.analyze(&samples, 48, 0).unwrap();
        assert_eq!(result.nominal_samples, 512);
        assert_eq!(result.nominal_us, 10_666);
        assert_eq!(result.recv_cost_us, 10_667);
    }

    #[test]
    fn test_zero_deviation_hits_center_region() {
        for nominal in [1u64, 100, 10_000, 1_000_000] {
            assert_eq!(JitterHistogram::region_index(0, nominal), CENTER_REGION);
        }
    }

    #[test]
    fn test_region_folding_by_sign() {
        let nominal = 10_000u64;
        // +30% -> two steps above center, -30% -> two below.
        assert_eq!(JitterHistogram::region_index(3_000, nominal), 5);
        assert_eq!(JitterHistogram::region_index(-3_000, nominal), 1);
        // Extremes clamp to the valid range.
        assert_eq!(JitterHistogram::region_index(50_000, nominal), 8);
        assert_eq!(JitterHistogram::region_index(-50_000, nominal), 0);
    }

    #[test]
    fn test_burst_threshold_tracks_smoothing() {
        assert_eq!(JitterHistogram::burst_threshold_pct(0), 200);
        assert_eq!(JitterHistogram::burst_threshold_pct(3), 170);
        assert_eq!(JitterHistogram::burst_threshold_pct(5), 150);
        // Out-of-range smoothing saturates.
        assert_eq!(JitterHistogram::burst_threshold_pct(9), 150);
    }

    #[test]
    fn test_steady_cadence_no_burst() {
        let samples = steady_window(10_000, 4, 24);
        let mut hist = JitterHistogram::new();
        let result = hist.analyze(&samples, 48, 2).unwrap();
        assert!(!result.burst_seen);
        // cbig floors at single_max, which is tiny on a steady cadence.
        assert_eq!(result.cbig_max_us, result.single_max_us);
    }

    #[test]
    fn test_late_burst_detected_and_accumulated() {
        // Steady cadence then three packets at 250% of nominal.
        let mut samples = SourceSamples::new();
        let mut t = 0u64;
        samples.record(t, 4);
        for _ in 0..21 {
            t += 10_667;
            samples.record(t, 4);
        }
        for _ in 0..3 {
            t += 26_668;
            samples.record(t, 4);
        }
        let mut hist = JitterHistogram::new();
        let result = hist.analyze(&samples, 48, 2).unwrap();
        assert!(result.burst_seen);
        // Three accumulated excesses beat any single deviation.
        assert!(result.cbig_max_us > result.single_max_us);
        assert!(result.cbig_max_us >= 3 * (26_668 - result.nominal_us) * 9 / 10);
    }

    #[test]
    fn test_cbig_survives_until_clear() {
        let mut samples = SourceSamples::new();
        let mut t = 0u64;
        samples.record(t, 4);
        for _ in 0..20 {
            t += 10_667;
            samples.record(t, 4);
        }
        t += 30_000;
        samples.record(t, 4);
        let mut hist = JitterHistogram::new();
        let first = hist.analyze(&samples, 48, 2).unwrap();
        assert!(first.cbig_max_us > 0);

        // A later pass over a steadier window keeps the burst memory.
        let steady = steady_window(10_667, 4, 24);
        let second = hist.analyze(&steady, 48, 2).unwrap();
        assert_eq!(second.cbig_max_us, first.cbig_max_us);

        hist.clear();
        let third = hist.analyze(&steady, 48, 2).unwrap();
        assert!(third.cbig_max_us < first.cbig_max_us);
    }

    #[test]
    fn test_empty_window_yields_none() {
        let samples = SourceSamples::new();
        let mut hist = JitterHistogram::new();
        assert!(hist.analyze(&samples, 48, 2).is_none());
    }

    #[test]
    fn test_factor_window_volatility() {
        let mut window = FactorWindow::new();
        window.push(100);
        assert_eq!(window.volatility(), 0);

        // A 50-point swing: newest slot weight is 35%.
        window.push(150);
        assert_eq!(window.volatility(), 50 * 50 * 35 / 100);

        // Steady factors decay the estimate as the swing shifts out.
        let spiky = window.volatility();
        for _ in 0..FACTOR_WINDOW_SLOTS {
            window.push(150);
        }
        assert!(window.volatility() < spiky);
        assert_eq!(window.volatility(), 0);
    }
}
