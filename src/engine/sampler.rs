//! Packet inter-arrival sampler.
//!
//! Fixed 24-slot ring of `{inter-arrival span, frame count}` records.
//! The first packet after a clear only anchors the receive time; every
//! packet after that contributes one span. Only a bud that analyzes
//! (master or unpaired) feeds this; the slave's ring stays empty.

/// Ring capacity. At typical A2DP cadence this is roughly half a second
/// of history.
pub const SOURCE_SAMPLE_SLOTS: usize = 24;

/// One inter-arrival record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceSample {
    /// Time since the previous packet, microseconds.
    pub span_us: u32,
    /// Audio frames carried by this packet.
    pub frames: u16,
}

/// Fixed-capacity circular buffer of inter-arrival records.
pub struct SourceSamples {
    slots: [SourceSample; SOURCE_SAMPLE_SLOTS],
    next: usize,
    filled: usize,
    last_recv_us: Option<u64>,
}

impl SourceSamples {
    pub const fn new() -> Self {
        Self {
            slots: [SourceSample { span_us: 0, frames: 0 }; SOURCE_SAMPLE_SLOTS],
            next: 0,
            filled: 0,
            last_recv_us: None,
        }
    }

    /// Record one packet arrival. Returns the stored record, or `None`
    /// for the anchoring first packet.
    pub fn record(&mut self, recv_time_us: u64, frames: u32) -> Option<SourceSample> {
        let span = match self.last_recv_us {
            Some(prev) => recv_time_us.saturating_sub(prev).min(u32::MAX as u64) as u32,
            None => {
                self.last_recv_us = Some(recv_time_us);
                return None;
            }
        };
        self.last_recv_us = Some(recv_time_us);

        let sample = SourceSample {
            span_us: span,
            frames: frames.min(u16::MAX as u32) as u16,
        };
        self.slots[self.next] = sample;
        self.next = (self.next + 1) % SOURCE_SAMPLE_SLOTS;
        if self.filled < SOURCE_SAMPLE_SLOTS {
            self.filled += 1;
        }
        Some(sample)
    }

    /// Number of valid records in the window.
    #[inline]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Iterate the window oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = SourceSample> + '_ {
        let start = if self.filled < SOURCE_SAMPLE_SLOTS {
            0
        } else {
            self.next
        };
        (0..self.filled).map(move |i| self.slots[(start + i) % SOURCE_SAMPLE_SLOTS])
    }

    /// Forget everything, including the receive-time anchor. Used on a
    /// role change to slave: stale spans from the master role would
    /// poison the next analysis.
    pub fn clear(&mut self) {
        self.filled = 0;
        self.next = 0;
        self.last_recv_us = None;
    }
}

impl Default for SourceSamples {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_packet_only_anchors() {
        let mut samples = SourceSamples::new();
        assert_eq!(samples.record(1_000, 4), None);
        assert!(samples.is_empty());

        let sample = samples.record(3_500, 4).unwrap();
        assert_eq!(sample.span_us, 2_500);
        assert_eq!(sample.frames, 4);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_window_wraps_at_capacity() {
        let mut samples = SourceSamples::new();
        samples.record(0, 1);
        for i in 1..=SOURCE_SAMPLE_SLOTS as u64 + 8 {
            samples.record(i * 1_000, i as u32);
        }
        assert_eq!(samples.len(), SOURCE_SAMPLE_SLOTS);
        // Oldest surviving record is the 9th span.
        let first = samples.iter().next().unwrap();
        assert_eq!(first.frames, 9);
        // All spans are the steady 1 ms cadence.
        assert!(samples.iter().all(|s| s.span_us == 1_000));
    }

    #[test]
    fn test_clear_drops_anchor() {
        let mut samples = SourceSamples::new();
        samples.record(1_000, 1);
        samples.record(2_000, 1);
        samples.clear();
        assert!(samples.is_empty());
        // Next record anchors again instead of producing a huge span.
        assert_eq!(samples.record(60_000, 1), None);
    }

    #[test]
    fn test_time_going_backwards_saturates() {
        let mut samples = SourceSamples::new();
        samples.record(5_000, 1);
        let sample = samples.record(4_000, 1).unwrap();
        assert_eq!(sample.span_us, 0);
    }
}
