//! Shared test support: a scripted host standing in for the firmware's
//! clock, property store, policy table, DSP sink and TWS peer link.

#![allow(dead_code)]

use std::collections::VecDeque;

use tws_latency::{
    Clock, Command, LatencyMode, LatencyModeController, LatencyPolicy, MediaFormat, MediaSink,
    PeerLink, PropertyStore,
};

/// Policy-table baseline for Normal mode, microseconds.
pub const NORMAL_THRESHOLD_US: u32 = 150_000;

/// Policy-table baseline for the reduced-latency modes, microseconds.
pub const LOW_THRESHOLD_US: u32 = 100_000;

/// Policy-table lower bound, microseconds.
pub const MIN_THRESHOLD_US: u32 = 40_000;

/// Scripted collaborator services. Cycles convert 1:1 to microseconds.
#[derive(Default)]
pub struct FakeHost {
    pub now_ms: u64,
    pub saved_mode: Option<u8>,
    pub store_writes: Vec<u8>,
    pub latencies_us: Vec<u32>,
    pub adjust_calls: Vec<u32>,
    pub plc_states: Vec<bool>,
    pub sent_packets: Vec<Vec<u8>>,
    pub inbound_packets: VecDeque<Vec<u8>>,
    pub refuse_sends: bool,
}

impl Clock for FakeHost {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }
    fn cycles_to_us(&self, cycles: u64) -> u64 {
        cycles
    }
}

impl PropertyStore for FakeHost {
    fn load_mode(&mut self) -> Option<u8> {
        self.saved_mode
    }
    fn store_mode(&mut self, mode: u8) {
        self.saved_mode = Some(mode);
        self.store_writes.push(mode);
    }
}

impl LatencyPolicy for FakeHost {
    fn threshold_us(&self, mode: LatencyMode, _format: MediaFormat) -> u32 {
        match mode {
            LatencyMode::Normal => NORMAL_THRESHOLD_US,
            LatencyMode::Low | LatencyMode::Adaptive => LOW_THRESHOLD_US,
        }
    }
    fn threshold_min_us(&self, _mode: LatencyMode, _format: MediaFormat) -> u32 {
        MIN_THRESHOLD_US
    }
}

impl MediaSink for FakeHost {
    fn set_latency_us(&mut self, _media_handle: u32, latency_us: u32) {
        self.latencies_us.push(latency_us);
    }
    fn adjust_stream_data(&mut self, _dsp_handle: u32, latency_us: u32) {
        self.adjust_calls.push(latency_us);
    }
    fn set_plc_enabled(&mut self, _dsp_handle: u32, enabled: bool) {
        self.plc_states.push(enabled);
    }
}

impl PeerLink for FakeHost {
    fn send(&mut self, payload: &[u8]) -> bool {
        if self.refuse_sends {
            return false;
        }
        self.sent_packets.push(payload.to_vec());
        true
    }
    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        let payload = self.inbound_packets.pop_front()?;
        buf[..payload.len()].copy_from_slice(&payload);
        Some(payload.len())
    }
}

/// Music stream at 48 kHz, AAC, with arbitrary handles.
pub fn music_init() -> Command {
    Command::Init {
        stream_type: 1,
        format: MediaFormat::Aac.as_u32(),
        sample_rate_hz: 48_000,
        media_handle: 11,
        dsp_handle: 22,
    }
}

/// Voice stream with an unspecified codec.
pub fn voice_init() -> Command {
    Command::Init {
        stream_type: 2,
        format: 0,
        sample_rate_hz: 48_000,
        media_handle: 11,
        dsp_handle: 22,
    }
}

/// Packed `pkt_len`/`frame_cnt` word as the profile layer reports it.
pub fn packed_len(pkt_len: u16, frame_cnt: u8) -> u16 {
    (pkt_len & 0x0FFF) | ((frame_cnt as u16) << 12)
}

/// Feed `count` packets at a fixed cadence, advancing `t_us` and `seq`.
pub fn feed_packets(
    controller: &mut LatencyModeController<FakeHost>,
    t_us: &mut u64,
    seq: &mut u16,
    count: usize,
    span_us: u64,
) {
    for _ in 0..count {
        controller.dispatch(Command::SetPktInfo {
            seq_no: *seq,
            len_and_frames: packed_len(600, 4),
            recv_time_cycles: *t_us,
        });
        *seq = seq.wrapping_add(1);
        *t_us += span_us;
    }
}

/// Advance wall time and run one tick.
pub fn tick_at(controller: &mut LatencyModeController<FakeHost>, now_ms: u64) {
    controller.host_mut().now_ms = now_ms;
    controller.dispatch(Command::Main);
}
