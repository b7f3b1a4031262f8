//! Latency mode selection.
//!
//! The user-facing cycle is Normal -> Low -> Adaptive -> Normal, with two
//! wrinkles: a build can replace plain Low with Adaptive entirely, and when
//! it does not, leaving Adaptive passes through Low once (a one-shot hold)
//! so the downward cycle takes two presses instead of jumping straight to
//! Normal. With the adaptive feature disabled the cycle is inert.

use crate::config::LatencyConfig;

/// Playback latency mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LatencyMode {
    /// Full buffering, maximum robustness.
    Normal = 0,
    /// Fixed reduced buffering from the policy table.
    Low = 1,
    /// Engine-driven buffering.
    Adaptive = 2,
}

impl LatencyMode {
    /// Convert from the persisted property value. Out-of-range values
    /// (from an older firmware or a corrupt blob) fall back to Normal.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => LatencyMode::Low,
            2 => LatencyMode::Adaptive,
            _ => LatencyMode::Normal,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for any reduced-latency mode.
    #[inline]
    pub const fn is_low_latency(self) -> bool {
        !matches!(self, LatencyMode::Normal)
    }
}

/// Compute the mode a cycle keypress moves to.
///
/// Pure function of the current mode, the config and the one-shot hold
/// flag; returns the next mode and the new hold flag. Callers feed the
/// returned flag back in on the next press.
pub fn next_mode(current: LatencyMode, config: &LatencyConfig, hold: bool) -> (LatencyMode, bool) {
    if !config.allm_enable {
        // Neither Low nor Adaptive is offered without the adaptive
        // feature; cycling parks on Normal.
        return (LatencyMode::Normal, false);
    }

    if config.allm_instead_of_low {
        // Low is removed from the cycle entirely.
        return match current {
            LatencyMode::Normal => (LatencyMode::Adaptive, false),
            _ => (LatencyMode::Normal, false),
        };
    }

    match current {
        LatencyMode::Normal => (LatencyMode::Low, false),
        LatencyMode::Low => {
            if hold {
                (LatencyMode::Normal, false)
            } else {
                (LatencyMode::Adaptive, false)
            }
        }
        // Leaving Adaptive inserts one Low step before Normal.
        LatencyMode::Adaptive => (LatencyMode::Low, true),
    }
}

/// Mode selected at boot: the persisted value when persistence is on,
/// else the configured default, with plain Low promoted to Adaptive when
/// the adaptive feature supersedes it.
pub fn initial_mode(config: &LatencyConfig, persisted: Option<u8>) -> LatencyMode {
    let mut mode = match persisted {
        Some(raw) if config.persist_mode => LatencyMode::from_u8(raw),
        _ => config.default_mode,
    };
    if mode == LatencyMode::Low && config.allm_enable {
        mode = LatencyMode::Adaptive;
    }
    if mode == LatencyMode::Adaptive && !config.allm_enable {
        mode = LatencyMode::Normal;
    }
    mode
}
