//! Remembered latency across sessions.
//!
//! One value per device, owned by the mode controller and handed to each
//! engine by reference. A fresh engine starts from the remembered latency
//! for its codec instead of re-converging from scratch; a codec switch or
//! multi-device handover invalidates it.

use crate::types::MediaFormat;

/// Process-lifetime latency memory: `{format, latency_ms, valid}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyCache {
    format: MediaFormat,
    latency_ms: u16,
    valid: bool,
}

impl LatencyCache {
    pub const fn new() -> Self {
        Self {
            format: MediaFormat::Unknown,
            latency_ms: 0,
            valid: false,
        }
    }

    /// Remembered latency for `format`, or `None` when the cache is
    /// invalid or holds a different codec (caller falls back to its
    /// baseline).
    #[inline]
    pub fn get(&self, format: MediaFormat) -> Option<u16> {
        if self.valid && self.format == format {
            Some(self.latency_ms)
        } else {
            None
        }
    }

    /// Unconditional overwrite; always marks the entry valid.
    #[inline]
    pub fn set(&mut self, format: MediaFormat, latency_ms: u16) {
        self.format = format;
        self.latency_ms = latency_ms;
        self.valid = true;
    }

    /// Clear validity only. Format and value are kept for diagnostics.
    #[inline]
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Last written value regardless of validity (diagnostics).
    #[inline]
    pub fn last_written(&self) -> (MediaFormat, u16) {
        (self.format, self.latency_ms)
    }
}

impl Default for LatencyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_misses() {
        let cache = LatencyCache::new();
        assert_eq!(cache.get(MediaFormat::Sbc), None);
        assert!(!cache.is_valid());
    }

    #[test]
    fn test_set_then_get_same_format() {
        let mut cache = LatencyCache::new();
        cache.set(MediaFormat::Aac, 85);
        assert_eq!(cache.get(MediaFormat::Aac), Some(85));
        // A different codec misses even while valid.
        assert_eq!(cache.get(MediaFormat::Sbc), None);
    }

    #[test]
    fn test_invalidate_keeps_diagnostics() {
        let mut cache = LatencyCache::new();
        cache.set(MediaFormat::Ldac, 120);
        cache.invalidate();
        assert_eq!(cache.get(MediaFormat::Ldac), None);
        assert_eq!(cache.last_written(), (MediaFormat::Ldac, 120));
        // Rewriting revalidates.
        cache.set(MediaFormat::Ldac, 110);
        assert_eq!(cache.get(MediaFormat::Ldac), Some(110));
    }
}
