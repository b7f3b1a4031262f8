//! Mode state machine tests: boot restore, the cycle with its hold step,
//! request correction, persistence and live-session plumbing.

mod common;

use common::*;
use tws_latency::{LatencyConfig, LatencyMode, LatencyModeController, MediaFormat};

fn controller(config: LatencyConfig, host: FakeHost) -> LatencyModeController<FakeHost> {
    LatencyModeController::new(config, host)
}

#[test]
fn test_boot_restores_persisted_mode() {
    let host = FakeHost {
        saved_mode: Some(LatencyMode::Adaptive.as_u8()),
        ..FakeHost::default()
    };
    let ctl = controller(LatencyConfig::balanced(), host);
    assert_eq!(ctl.mode(), LatencyMode::Adaptive);
    assert!(ctl.is_low_latency());
}

#[test]
fn test_boot_uses_default_without_persisted_value() {
    let ctl = controller(LatencyConfig::balanced(), FakeHost::default());
    assert_eq!(ctl.mode(), LatencyMode::Normal);
    assert!(!ctl.is_low_latency());
}

#[test]
fn test_boot_promotes_default_low_to_adaptive() {
    let config = LatencyConfig {
        default_mode: LatencyMode::Low,
        ..LatencyConfig::balanced()
    };
    let ctl = controller(config, FakeHost::default());
    assert_eq!(ctl.mode(), LatencyMode::Adaptive);
}

#[test]
fn test_substitution_cycle_never_offers_low() {
    let config = LatencyConfig {
        allm_instead_of_low: true,
        ..LatencyConfig::balanced()
    };
    let mut ctl = controller(config, FakeHost::default());
    assert_eq!(ctl.mode(), LatencyMode::Normal);
    assert_eq!(ctl.check_next_mode(), LatencyMode::Adaptive);

    ctl.set_mode(ctl.check_next_mode(), false);
    assert_eq!(ctl.mode(), LatencyMode::Adaptive);
    ctl.set_mode(ctl.check_next_mode(), false);
    assert_eq!(ctl.mode(), LatencyMode::Normal);
}

#[test]
fn test_leaving_adaptive_holds_low_once() {
    let mut ctl = controller(LatencyConfig::balanced(), FakeHost::default());
    // Normal -> Low -> Adaptive -> Low (held) -> Normal: four presses.
    let expected = [
        LatencyMode::Low,
        LatencyMode::Adaptive,
        LatencyMode::Low,
        LatencyMode::Normal,
    ];
    for mode in expected {
        ctl.set_mode(ctl.check_next_mode(), false);
        assert_eq!(ctl.mode(), mode);
    }
}

#[test]
fn test_unchecked_request_is_corrected() {
    let mut ctl = controller(LatencyConfig::balanced(), FakeHost::default());
    // From Normal the cycle goes to Low; an out-of-cycle Adaptive
    // request gets overridden.
    ctl.set_mode(LatencyMode::Adaptive, false);
    assert_eq!(ctl.mode(), LatencyMode::Low);
}

#[test]
fn test_checked_request_applies_directly() {
    let mut ctl = controller(LatencyConfig::balanced(), FakeHost::default());
    ctl.set_mode(LatencyMode::Adaptive, true);
    assert_eq!(ctl.mode(), LatencyMode::Adaptive);
}

#[test]
fn test_mode_changes_persist_when_enabled() {
    let mut ctl = controller(LatencyConfig::balanced(), FakeHost::default());
    ctl.set_mode(LatencyMode::Adaptive, true);
    ctl.set_mode(LatencyMode::Normal, true);
    assert_eq!(
        ctl.host_mut().store_writes,
        [LatencyMode::Adaptive.as_u8(), LatencyMode::Normal.as_u8()]
    );
    // An unchanged mode writes nothing.
    ctl.set_mode(LatencyMode::Normal, true);
    assert_eq!(ctl.host_mut().store_writes.len(), 2);
}

#[test]
fn test_mode_changes_not_persisted_when_disabled() {
    let config = LatencyConfig {
        persist_mode: false,
        ..LatencyConfig::balanced()
    };
    let mut ctl = controller(config, FakeHost::default());
    ctl.set_mode(LatencyMode::Adaptive, true);
    assert!(ctl.host_mut().store_writes.is_empty());
}

#[test]
fn test_cycle_is_inert_without_adaptive_feature() {
    let config = LatencyConfig {
        allm_enable: false,
        ..LatencyConfig::balanced()
    };
    let mut ctl = controller(config, FakeHost::default());
    for _ in 0..3 {
        assert_eq!(ctl.check_next_mode(), LatencyMode::Normal);
        ctl.set_mode(ctl.check_next_mode(), false);
        assert_eq!(ctl.mode(), LatencyMode::Normal);
    }
}

#[test]
fn test_mode_change_pushes_threshold_and_toggles_plc() {
    let mut ctl = controller(LatencyConfig::balanced(), FakeHost::default());
    ctl.dispatch(music_init());
    assert!(ctl.host_mut().plc_states.is_empty());

    // Leaving Normal engages concealment and pushes the new threshold.
    ctl.set_mode(LatencyMode::Low, true);
    assert_eq!(ctl.host_mut().plc_states, [true]);
    assert_eq!(ctl.host_mut().latencies_us.last(), Some(&LOW_THRESHOLD_US));
    assert_eq!(ctl.host_mut().adjust_calls.last(), Some(&LOW_THRESHOLD_US));

    // Returning releases it and pushes the Normal threshold.
    ctl.set_mode(LatencyMode::Normal, true);
    assert_eq!(ctl.host_mut().plc_states, [true, false]);
    assert_eq!(
        ctl.host_mut().latencies_us.last(),
        Some(&NORMAL_THRESHOLD_US)
    );
}

#[test]
fn test_voice_call_pins_normal_and_blocks_plumbing() {
    let mut ctl = controller(LatencyConfig::balanced(), FakeHost::default());
    ctl.dispatch(voice_init());
    ctl.set_mode(LatencyMode::Adaptive, true);
    // Global mode moved, but the call saw nothing.
    assert_eq!(ctl.mode(), LatencyMode::Adaptive);
    assert!(ctl.host_mut().latencies_us.is_empty());
    assert!(ctl.host_mut().plc_states.is_empty());
    // Threshold lookups answer for the pinned session mode.
    assert_eq!(
        ctl.get_threshold_us(MediaFormat::Unknown),
        NORMAL_THRESHOLD_US
    );
}

#[test]
fn test_threshold_delegates_to_engine_in_adaptive() {
    let host = FakeHost {
        saved_mode: Some(LatencyMode::Adaptive.as_u8()),
        ..FakeHost::default()
    };
    let mut ctl = controller(LatencyConfig::balanced(), host);
    // Without a session the policy table answers.
    assert_eq!(ctl.get_threshold_us(MediaFormat::Aac), LOW_THRESHOLD_US);

    // With an engine, its current value answers (seeded from the
    // policy baseline here: 100 ms).
    ctl.dispatch(music_init());
    assert_eq!(ctl.get_threshold_us(MediaFormat::Aac), 100_000);
    assert_eq!(ctl.get_threshold_min_us(MediaFormat::Aac), 40_000);
}

#[test]
fn test_threshold_uses_policy_table_in_normal() {
    let mut ctl = controller(LatencyConfig::balanced(), FakeHost::default());
    ctl.dispatch(music_init());
    assert_eq!(
        ctl.get_threshold_us(MediaFormat::Aac),
        NORMAL_THRESHOLD_US
    );
    assert_eq!(ctl.get_threshold_min_us(MediaFormat::Aac), MIN_THRESHOLD_US);
}
