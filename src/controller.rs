//! Module: controller
//!
//! Purpose: Process-wide latency mode state machine and the single command
//! entry point the rest of the firmware calls. Owns the latency cache and
//! at most one live session; everything below it is driven from here.
//!
//! Every command is safe to send before, during and after a stream's
//! lifetime: with no live session the dispatcher answers with defaults
//! and does nothing.

use crate::cache::LatencyCache;
use crate::config::LatencyConfig;
use crate::engine::EngineSnapshot;
use crate::host::Host;
use crate::mode::{initial_mode, next_mode, LatencyMode};
use crate::session::LatencyControlSession;
use crate::sync::SyncMode;
use crate::types::{MediaFormat, PacketInfo, SampleRateClass, StreamType, TwsRole};

/// Command surface. One variant per operation the firmware dispatches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create or refresh the session for a stream.
    Init {
        stream_type: u32,
        format: u32,
        sample_rate_hz: u32,
        media_handle: u32,
        dsp_handle: u32,
    },
    /// Destroy the session if the disambiguation matches.
    Deinit { stream_type: u32, format: u32 },
    /// TWS role change from the pairing service.
    SetTwsRole { role: u32 },
    /// Per-packet timing report from the profile layer.
    SetPktInfo {
        seq_no: u16,
        /// `[15..12] frame_cnt`, `[11..0] pkt_len`.
        len_and_frames: u16,
        recv_time_cycles: u64,
    },
    /// Playback-started notification.
    SetStart,
    /// Query the stream fixed cost in PCM samples.
    GetFixed,
    /// Invalidate the remembered latency (codec switch, handover).
    AptInvalid,
    /// Push the current latency to the peer (adaptive mode only).
    AptSyncLcy,
    /// Run one periodic tick.
    Main,
}

/// Dispatch result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    None,
    FixedCost(u32),
}

/// Point-in-time view of the whole subsystem for the console/display.
#[derive(Clone, Copy, Debug)]
pub struct ControllerSnapshot {
    pub mode: LatencyMode,
    pub hold_low: bool,
    pub session_stream: Option<StreamType>,
    pub cache_valid: bool,
    pub engine: Option<EngineSnapshot>,
}

/// Process-wide latency mode controller.
pub struct LatencyModeController<H: Host> {
    host: H,
    config: LatencyConfig,
    mode: LatencyMode,
    /// One-shot flag making the Low step after Adaptive fall to Normal.
    hold_low: bool,
    cache: LatencyCache,
    session: Option<LatencyControlSession>,
}

impl<H: Host> LatencyModeController<H> {
    /// Boot the subsystem: validate the tunables and restore the mode.
    pub fn new(config: LatencyConfig, mut host: H) -> Self {
        let config = config.validated();
        let persisted = host.load_mode();
        let mode = initial_mode(&config, persisted);
        log::info!("latency: boot mode {:?}", mode);
        Self {
            host,
            config,
            mode,
            hold_low: false,
            cache: LatencyCache::new(),
            session: None,
        }
    }

    #[inline]
    pub fn mode(&self) -> LatencyMode {
        self.mode
    }

    #[inline]
    pub fn is_low_latency(&self) -> bool {
        self.mode.is_low_latency()
    }

    #[inline]
    pub fn config(&self) -> &LatencyConfig {
        &self.config
    }

    /// Collaborator access for the integrating firmware (and tests).
    #[inline]
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Mode the next cycle keypress would land on. Pure peek.
    pub fn check_next_mode(&self) -> LatencyMode {
        next_mode(self.mode, &self.config, self.hold_low).0
    }

    /// Switch mode. With `checked == false` the request is recomputed
    /// against the cycle and corrected when it disagrees.
    pub fn set_mode(&mut self, requested: LatencyMode, checked: bool) {
        let (expected, next_hold) = next_mode(self.mode, &self.config, self.hold_low);
        let target = if checked {
            self.hold_low = false;
            requested
        } else {
            if requested != expected {
                log::warn!(
                    "latency: corrected mode request {:?} -> {:?}",
                    requested,
                    expected
                );
            }
            self.hold_low = next_hold;
            expected
        };
        if target == self.mode {
            return;
        }
        let previous = self.mode;
        self.mode = target;
        log::info!("latency: mode {:?} -> {:?}", previous, target);
        if self.config.persist_mode {
            self.host.store_mode(target.as_u8());
        }
        self.apply_mode_to_session(previous, target);
    }

    /// Effective buffering threshold for a codec, microseconds. Adaptive
    /// mode with a live engine answers with the engine's value; anything
    /// else comes from the policy table.
    pub fn get_threshold_us(&self, format: MediaFormat) -> u32 {
        let mode = self.session_mode();
        if mode == LatencyMode::Adaptive {
            if let Some(ms) = self.session.as_ref().and_then(|s| s.engine_latency_ms()) {
                return ms as u32 * 1_000;
            }
        }
        self.host.threshold_us(mode, format)
    }

    /// Lower threshold bound for a codec, microseconds.
    pub fn get_threshold_min_us(&self, format: MediaFormat) -> u32 {
        let mode = self.session_mode();
        if mode == LatencyMode::Adaptive {
            if let Some(ms) = self.session.as_ref().and_then(|s| s.engine_minimum_ms()) {
                return ms as u32 * 1_000;
            }
        }
        self.host.threshold_min_us(mode, format)
    }

    /// The single entry point the rest of the firmware calls.
    pub fn dispatch(&mut self, command: Command) -> Reply {
        match command {
            Command::Init {
                stream_type,
                format,
                sample_rate_hz,
                media_handle,
                dsp_handle,
            } => {
                self.session_init(stream_type, format, sample_rate_hz, media_handle, dsp_handle);
                Reply::None
            }
            Command::Deinit {
                stream_type,
                format,
            } => {
                self.session_deinit(stream_type, format);
                Reply::None
            }
            Command::SetTwsRole { role } => {
                if let Some(session) = self.session.as_mut() {
                    session.set_tws_role(TwsRole::from_u32(role));
                }
                Reply::None
            }
            Command::SetPktInfo {
                seq_no,
                len_and_frames,
                recv_time_cycles,
            } => {
                let recv_time_us = self.host.cycles_to_us(recv_time_cycles);
                if let Some(session) = self.session.as_mut() {
                    session.on_packet_received(PacketInfo::from_raw(
                        seq_no,
                        len_and_frames,
                        recv_time_us,
                    ));
                }
                Reply::None
            }
            Command::SetStart => {
                if let Some(session) = self.session.as_mut() {
                    session.on_playback_started();
                }
                Reply::None
            }
            Command::GetFixed => Reply::FixedCost(
                self.session
                    .as_ref()
                    .map(|s| s.fixed_cost_samples())
                    .unwrap_or(0),
            ),
            Command::AptInvalid => {
                self.cache.invalidate();
                Reply::None
            }
            Command::AptSyncLcy => {
                self.sync_current_to_peer();
                Reply::None
            }
            Command::Main => {
                self.run_tick();
                Reply::None
            }
        }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            mode: self.mode,
            hold_low: self.hold_low,
            session_stream: self.session.as_ref().map(|s| s.stream_type()),
            cache_valid: self.cache.is_valid(),
            engine: self.session.as_ref().and_then(|s| s.engine_snapshot()),
        }
    }

    /// Mode the live stream actually runs in (a voice call pins Normal).
    fn session_mode(&self) -> LatencyMode {
        self.session
            .as_ref()
            .map(|s| s.effective_mode(self.mode))
            .unwrap_or(self.mode)
    }

    fn session_init(
        &mut self,
        stream_type_raw: u32,
        format_raw: u32,
        sample_rate_hz: u32,
        media_handle: u32,
        dsp_handle: u32,
    ) {
        let Some(stream_type) = StreamType::from_u32(stream_type_raw) else {
            log::warn!("session: rejected stream type {}", stream_type_raw);
            return;
        };
        let format = MediaFormat::from_u32(format_raw);
        let rate = SampleRateClass::from_hz(sample_rate_hz);

        match self.session.as_ref().map(|s| s.stream_type() == stream_type) {
            Some(true) => {
                // Same stream re-initializing: refresh in place.
                if let Some(existing) = self.session.as_mut() {
                    existing.refresh(format, rate);
                }
                return;
            }
            Some(false) => self.teardown_session(),
            None => {}
        }

        let mut session =
            LatencyControlSession::new(stream_type, format, rate, media_handle, dsp_handle);
        if stream_type == StreamType::Music {
            if self.mode.is_low_latency() && self.config.plc_enable {
                session.engage_plc(&mut self.host);
            }
            if self.config.allm_enable {
                let baseline_ms = (self.host.threshold_us(LatencyMode::Adaptive, format) / 1_000)
                    .min(u16::MAX as u32) as u16;
                session.install_engine(self.config, baseline_ms, &self.cache);
            }
        }
        self.session = Some(session);
    }

    /// Deinit disambiguation: a non-zero stream type must match the live
    /// stream; otherwise a non-zero format must; both zero destroys
    /// unconditionally.
    fn session_deinit(&mut self, stream_type_raw: u32, format_raw: u32) {
        let matched = match self.session.as_ref() {
            Some(session) => {
                if stream_type_raw > 0 {
                    StreamType::from_u32(stream_type_raw) == Some(session.stream_type())
                } else if format_raw > 0 {
                    MediaFormat::from_u32(format_raw) == session.format()
                } else {
                    true
                }
            }
            None => return,
        };
        if matched {
            self.teardown_session();
        } else {
            log::warn!("session: deinit ignored, stream mismatch");
        }
    }

    fn teardown_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.release_plc(&mut self.host);
            log::info!("session: destroyed ({:?})", session.stream_type());
        }
    }

    fn sync_current_to_peer(&mut self) {
        if self.mode != LatencyMode::Adaptive {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(latency_ms) = session.engine_latency_ms() else {
            return;
        };
        session.sync_to_peer(&mut self.host, SyncMode::Save, latency_ms);
    }

    fn apply_mode_to_session(&mut self, previous: LatencyMode, target: LatencyMode) {
        let (is_voice, format, dsp_handle) = match self.session.as_ref() {
            Some(session) => (
                session.stream_type() == StreamType::Voice,
                session.format(),
                session.dsp_handle(),
            ),
            None => return,
        };
        if is_voice {
            return;
        }
        let threshold_us = self.get_threshold_us(format);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.push_latency_us(&mut self.host, threshold_us);
        self.host.adjust_stream_data(dsp_handle, threshold_us);
        if previous == LatencyMode::Normal && target != LatencyMode::Normal {
            if self.config.plc_enable {
                session.engage_plc(&mut self.host);
            }
        } else if target == LatencyMode::Normal {
            session.release_plc(&mut self.host);
        }
    }

    fn run_tick(&mut self) {
        let now_ms = self.host.now_ms();
        let global_mode = self.mode;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.poll_peer(&mut self.host, &mut self.cache);
        session.pump_repeat(&mut self.host);
        if session.effective_mode(global_mode) == LatencyMode::Adaptive {
            if let Some(update) = session.drive_engine(now_ms, &mut self.cache) {
                session.push_latency_us(&mut self.host, update.latency_ms as u32 * 1_000);
                session.sync_to_peer(&mut self.host, SyncMode::Update, update.latency_ms);
            }
        }
    }
}
