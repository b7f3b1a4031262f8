//! Staccato reaction state.
//!
//! An audible glitch shows up here as an upward recommendation jump while
//! playing: the buffer ran dry, packets bunched up, the factor spiked.
//! Repeated jumps raise a floor increment on top of the configured
//! minimum so the ladder cannot walk the buffer back into the underrun;
//! a long quiet stretch decays the floor away again.

use crate::config::LatencyConfig;

/// Glitch-reaction state: floor increment, event window, quiescence timer.
pub struct StaccatoState {
    increment_ms: u16,
    count: u32,
    window_start_ms: u64,
    /// Lowest latency applied since the last qualifying event.
    min_latency_seen_ms: u16,
    last_event_ms: u64,
}

/// Upward jump over the pending value that qualifies as a glitch, ms.
pub const QUALIFY_JUMP_MS: u16 = 5;

impl StaccatoState {
    pub const fn new() -> Self {
        Self {
            increment_ms: 0,
            count: 0,
            window_start_ms: 0,
            min_latency_seen_ms: u16::MAX,
            last_event_ms: 0,
        }
    }

    /// Floor increment added on top of the configured minimum.
    #[inline]
    pub fn increment_ms(&self) -> u16 {
        self.increment_ms
    }

    #[inline]
    pub fn min_latency_seen_ms(&self) -> u16 {
        self.min_latency_seen_ms
    }

    /// Feed an upward adjustment. Returns whether the floor was raised.
    ///
    /// `cap_ms` bounds the increment (the working bounds span); isolated
    /// events are ignored at low smoothing until the in-window count
    /// reaches the configured threshold.
    pub fn on_up_adjust(
        &mut self,
        now_ms: u64,
        new_target_ms: u16,
        pending_ms: u16,
        config: &LatencyConfig,
        cap_ms: u16,
    ) -> bool {
        if now_ms.saturating_sub(self.window_start_ms) > config.staccato_ignore_period_ms as u64 {
            self.window_start_ms = now_ms;
            self.count = 1;
        } else {
            self.count += 1;
        }

        if config.smoothing_factor <= 1 && self.count < config.staccato_ignore_count {
            return false;
        }
        if new_target_ms < pending_ms.saturating_add(QUALIFY_JUMP_MS) {
            return false;
        }

        self.increment_ms = self
            .increment_ms
            .saturating_add(config.staccato_step_ms)
            .min(cap_ms);
        self.min_latency_seen_ms = new_target_ms;
        self.last_event_ms = now_ms;
        log::debug!(
            "staccato: floor raised to +{} ms (count {})",
            self.increment_ms,
            self.count
        );
        true
    }

    /// Track an applied latency for the minimum-seen sentinel.
    #[inline]
    pub fn note_latency(&mut self, latency_ms: u16) {
        if latency_ms < self.min_latency_seen_ms {
            self.min_latency_seen_ms = latency_ms;
        }
    }

    /// Decay the floor one step per quiet period.
    pub fn tick(&mut self, now_ms: u64, config: &LatencyConfig) {
        if self.increment_ms == 0 {
            return;
        }
        let quiet_ms = config.staccato_clear_period_s as u64 * 1_000;
        if now_ms.saturating_sub(self.last_event_ms) >= quiet_ms {
            self.increment_ms = self.increment_ms.saturating_sub(config.staccato_step_ms);
            self.last_event_ms = now_ms;
            log::debug!("staccato: floor decayed to +{} ms", self.increment_ms);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for StaccatoState {
    fn default() -> Self {
        Self::new()
    }
}
