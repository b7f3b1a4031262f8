//! Module: session
//!
//! Purpose: Per-stream latency control context. Owns the optional adaptive
//! engine and the optional concealment stage, computes the link fixed
//! cost, pushes accepted latencies to the decoder and keeps the TWS pair
//! in sync over the peer channel.
//!
//! One session exists per playback stream; the mode controller creates,
//! refreshes and destroys it through the command surface.

use alloc::boxed::Box;

use crate::cache::LatencyCache;
use crate::config::LatencyConfig;
use crate::engine::{AdaptiveEngine, EngineSnapshot, LatencyUpdate};
use crate::host::{MediaSink, PeerLink};
use crate::mode::LatencyMode;
use crate::plc::{MusicPlc, PLC_ALGORITHMIC_COST_US};
use crate::sync::{LatencySyncPacket, SyncMode};
use crate::types::{CommonSessionInfo, MediaFormat, PacketInfo, SampleRateClass, StreamType, TwsRole};

/// Retransmissions of one logical sync packet.
pub const MAX_SYNC_REPEATS: u8 = 2;

/// Received packets drained per tick.
const PEER_POLL_BUDGET: usize = 4;

/// Music link transmission cost by largest observed payload: a larger
/// negotiated MTU means fewer, bigger, later-arriving packets.
const MUSIC_COST_TIERS_US: [(u16, u32); 3] = [(300, 2_000), (600, 4_000), (900, 6_000)];

/// Cost above the largest tier boundary.
const MUSIC_COST_TOP_US: u32 = 8_000;

/// Flat voice-path transmission cost.
const VOICE_FIXED_COST_US: u32 = 2_000;

/// Peer-sync traffic counters, never cleared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncCounters {
    pub sent: u32,
    pub received: u32,
    pub deduplicated: u32,
}

/// Latency control context for one playback stream.
pub struct LatencyControlSession {
    info: CommonSessionInfo,
    media_handle: u32,
    dsp_handle: u32,
    engine: Option<Box<AdaptiveEngine>>,
    plc: Option<MusicPlc>,
    /// Largest payload seen this stream; keys the fixed-cost tier.
    max_pkt_len: u16,
    next_pkt_num: u16,
    last_sent: Option<LatencySyncPacket>,
    repeats_sent: u8,
    last_applied_pkt_num: Option<u16>,
    counters: SyncCounters,
}

impl LatencyControlSession {
    pub fn new(
        stream_type: StreamType,
        format: MediaFormat,
        rate: SampleRateClass,
        media_handle: u32,
        dsp_handle: u32,
    ) -> Self {
        log::info!(
            "session: created for {:?} stream, codec {:?}",
            stream_type,
            format
        );
        Self {
            info: CommonSessionInfo::new(stream_type, format, rate),
            media_handle,
            dsp_handle,
            engine: None,
            plc: None,
            max_pkt_len: 0,
            next_pkt_num: 0,
            last_sent: None,
            repeats_sent: MAX_SYNC_REPEATS,
            last_applied_pkt_num: None,
            counters: SyncCounters::default(),
        }
    }

    #[inline]
    pub fn stream_type(&self) -> StreamType {
        self.info.stream_type
    }

    #[inline]
    pub fn format(&self) -> MediaFormat {
        self.info.format
    }

    #[inline]
    pub fn role(&self) -> TwsRole {
        self.info.role
    }

    #[inline]
    pub fn dsp_handle(&self) -> u32 {
        self.dsp_handle
    }

    #[inline]
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    #[inline]
    pub fn sync_counters(&self) -> SyncCounters {
        self.counters
    }

    /// Engine's currently applied latency, when one exists.
    pub fn engine_latency_ms(&self) -> Option<u16> {
        self.engine.as_ref().map(|e| e.current_latency_ms())
    }

    /// Engine's working minimum bound, when one exists.
    pub fn engine_minimum_ms(&self) -> Option<u16> {
        self.engine.as_ref().map(|e| e.bounds().min_ms)
    }

    pub fn engine_snapshot(&self) -> Option<EngineSnapshot> {
        self.engine.as_ref().map(|e| e.snapshot())
    }

    /// The mode this stream actually runs in. A voice call is pinned to
    /// Normal whatever the global mode says.
    pub fn effective_mode(&self, global: LatencyMode) -> LatencyMode {
        match self.info.stream_type {
            StreamType::Voice => LatencyMode::Normal,
            StreamType::Music => global,
        }
    }

    /// Attach the adaptive engine (music with the feature configured).
    pub fn install_engine(&mut self, config: LatencyConfig, baseline_ms: u16, cache: &LatencyCache) {
        let engine = AdaptiveEngine::new(self.info, config, baseline_ms, cache);
        self.engine = Some(Box::new(engine));
    }

    /// Idempotent re-init for the same stream type: only codec and rate
    /// refresh; peer-sync and engine state carry over where they can.
    pub fn refresh(&mut self, format: MediaFormat, rate: SampleRateClass) {
        if format == self.info.format && rate == self.info.rate {
            return;
        }
        log::info!(
            "session: refresh codec {:?} -> {:?}",
            self.info.format,
            format
        );
        self.info.format = format;
        self.info.rate = rate;
        self.max_pkt_len = 0;
        if let Some(engine) = self.engine.as_mut() {
            engine.refresh_stream(format, rate);
        }
    }

    pub fn engage_plc<M: MediaSink>(&mut self, sink: &mut M) {
        if self.plc.is_none() {
            self.plc = Some(MusicPlc::engage(self.dsp_handle, sink));
        }
    }

    pub fn release_plc<M: MediaSink>(&mut self, sink: &mut M) {
        if let Some(plc) = self.plc.take() {
            plc.release(sink);
        }
    }

    #[inline]
    pub fn has_plc(&self) -> bool {
        self.plc.is_some()
    }

    /// Role change from the pairing service; forwarded on change only.
    pub fn set_tws_role(&mut self, role: TwsRole) {
        if role == self.info.role {
            return;
        }
        self.info.role = role;
        if let Some(engine) = self.engine.as_mut() {
            engine.set_role(role);
        }
    }

    /// Packet-timing report from the profile layer. A slave does not
    /// sample; it mirrors the master.
    pub fn on_packet_received(&mut self, packet: PacketInfo) {
        if self.info.role.is_slave() {
            return;
        }
        if packet.pkt_len > self.max_pkt_len {
            self.max_pkt_len = packet.pkt_len;
        }
        let fixed_cost = self.fixed_cost_samples();
        if let Some(engine) = self.engine.as_mut() {
            engine.set_fixed_cost_samples(fixed_cost);
            engine.on_packet(&packet);
        }
    }

    pub fn on_playback_started(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.on_playback_started();
        }
    }

    /// Stream fixed cost in PCM samples: the link transmission cost for
    /// the observed packet size class (music) or the flat voice cost plus
    /// the concealment stage's algorithmic delay.
    pub fn fixed_cost_samples(&self) -> u32 {
        let cost_us = match self.info.stream_type {
            StreamType::Music => {
                let mut cost = MUSIC_COST_TOP_US;
                for (max_len, tier_cost) in MUSIC_COST_TIERS_US {
                    if self.max_pkt_len <= max_len {
                        cost = tier_cost;
                        break;
                    }
                }
                cost
            }
            StreamType::Voice => VOICE_FIXED_COST_US + PLC_ALGORITHMIC_COST_US,
        };
        cost_us * self.info.rate.khz() / 1_000
    }

    /// Push a latency to the decoder.
    pub fn push_latency_us<M: MediaSink>(&self, sink: &mut M, latency_us: u32) {
        sink.set_latency_us(self.media_handle, latency_us);
    }

    /// Send the current value to the peer (master only). `Repeat` resends
    /// the previous logical packet, bounded, with the repeat ordinal in
    /// the adjust byte; anything else allocates a fresh packet number.
    pub fn sync_to_peer<L: PeerLink>(&mut self, link: &mut L, mode: SyncMode, latency_ms: u16) {
        if self.info.role != TwsRole::Master {
            return;
        }
        let packet = match mode {
            SyncMode::Repeat => {
                let Some(last) = self.last_sent else {
                    return;
                };
                if self.repeats_sent >= MAX_SYNC_REPEATS {
                    return;
                }
                self.repeats_sent += 1;
                LatencySyncPacket {
                    mode: SyncMode::Repeat,
                    adjust: self.repeats_sent,
                    ..last
                }
            }
            SyncMode::Update | SyncMode::Save => {
                let pkt_num = self.next_pkt_num;
                self.next_pkt_num = self.next_pkt_num.wrapping_add(1);
                let packet = LatencySyncPacket::new(mode, latency_ms, pkt_num);
                self.last_sent = Some(packet);
                self.repeats_sent = 0;
                packet
            }
        };
        if link.send(&packet.encode()) {
            self.counters.sent += 1;
            log::debug!(
                "sync: sent {:?} {} ms (pkt {})",
                packet.mode,
                packet.latency_ms,
                packet.pkt_num
            );
        }
    }

    /// Cover transport loss: one bounded retransmission of the last
    /// packet per tick until the budget is spent.
    pub fn pump_repeat<L: PeerLink>(&mut self, link: &mut L) {
        if self.info.role == TwsRole::Master && self.repeats_sent < MAX_SYNC_REPEATS {
            self.sync_to_peer(link, SyncMode::Repeat, 0);
        }
    }

    /// Drain and apply peer sync packets (slave only).
    pub fn poll_peer<H: PeerLink + MediaSink>(&mut self, host: &mut H, cache: &mut LatencyCache) {
        if !self.info.role.is_slave() {
            return;
        }
        let mut buf = [0u8; 16];
        for _ in 0..PEER_POLL_BUDGET {
            let Some(len) = host.try_recv(&mut buf) else {
                break;
            };
            match LatencySyncPacket::decode(&buf[..len]) {
                Ok(packet) => {
                    if let Some(latency_ms) = self.handle_sync(packet, cache) {
                        self.push_latency_us(host, latency_ms as u32 * 1_000);
                    }
                }
                Err(err) => log::warn!("sync: dropped bad packet: {}", err),
            }
        }
    }

    /// Apply one received sync packet; returns the value to push, or
    /// `None` for an already-seen retransmission.
    fn handle_sync(&mut self, packet: LatencySyncPacket, cache: &mut LatencyCache) -> Option<u16> {
        self.counters.received += 1;
        if packet.mode == SyncMode::Repeat && self.last_applied_pkt_num == Some(packet.pkt_num) {
            self.counters.deduplicated += 1;
            return None;
        }
        self.last_applied_pkt_num = Some(packet.pkt_num);
        let latency_ms = match self.engine.as_mut() {
            // Unconditional acceptance: the slave widens its bounds
            // rather than clamping the master's value.
            Some(engine) => engine.accept_remote(packet.latency_ms, cache).latency_ms,
            None => {
                cache.set(self.info.format, packet.latency_ms);
                packet.latency_ms
            }
        };
        Some(latency_ms)
    }

    /// Drive the engine one tick; the caller pushes and syncs the result.
    pub fn drive_engine(&mut self, now_ms: u64, cache: &mut LatencyCache) -> Option<LatencyUpdate> {
        self.engine.as_mut()?.tick(now_ms, cache)
    }
}
