//! Module: engine
//!
//! Purpose: Adaptive latency engine. Watches packet inter-arrival jitter,
//! derives a recommended playback buffering latency, smooths changes with
//! asymmetric up/down hysteresis and keeps a TWS pair converged through
//! the sync channel.
//!
//! The engine is a pure state machine: time arrives as a parameter, all
//! effects leave as returned [`LatencyUpdate`] values that the owning
//! session turns into decoder pushes and peer sync packets. Nothing here
//! touches hardware.
//!
//! Lifecycle: `Init` at construction; playback start moves to `Preplay`
//! (started before the first sync) and the first completed sync cycle to
//! `Playing`, or the other way around (`Synced`) when the first cycle
//! lands before the start notification. A slave engine jumps straight to
//! `Playing` and only mirrors what the master sends.

pub mod histogram;
pub mod ladder;
pub mod sampler;
pub mod staccato;

use crate::cache::LatencyCache;
use crate::config::{LatencyBounds, LatencyConfig};
use crate::types::{CommonSessionInfo, MediaFormat, PacketInfo, SampleRateClass, TwsRole};

use self::histogram::{FactorWindow, JitterHistogram};
use self::ladder::DownTimerLadder;
use self::sampler::SourceSamples;
use self::staccato::StaccatoState;

/// Engine lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EngineStatus {
    /// Constructed, nothing heard yet.
    Init,
    /// Playback started before the first recommendation cycle.
    Preplay,
    /// First recommendation cycle done, playback not yet started.
    Synced,
    /// Steady state for the rest of the stream.
    Playing,
}

/// Why an update was applied (log and diagnostics detail).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateReason {
    /// Warm start from the remembered per-codec latency.
    CacheSeed,
    /// Regular recommendation, applied immediately (upward).
    Recommendation,
    /// A staged down-adjustment timer elapsed.
    LadderStage,
    /// Value accepted from the TWS master.
    PeerSync,
}

/// An applied latency change the session must push downstream (and, as
/// master, sync to the peer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyUpdate {
    pub latency_ms: u16,
    pub reason: UpdateReason,
}

/// Never-cleared event counters for field diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub recommendations: u32,
    pub updates_applied: u32,
    pub updates_disavowed: u32,
    pub bursts_detected: u32,
    pub staccato_events: u32,
}

/// Point-in-time view of the engine for the console/display service.
#[derive(Clone, Copy, Debug)]
pub struct EngineSnapshot {
    pub status: EngineStatus,
    pub current_ms: u16,
    pub pending_ms: u16,
    pub bounds: LatencyBounds,
    pub last_factor: u32,
    pub volatility: u64,
    pub stage_count: usize,
    pub staccato_increment_ms: u16,
    pub quick_active: bool,
    pub sample_count: usize,
    pub counters: EngineCounters,
}

/// Volatility level that adds 12 points to the factor (25^2).
const VOLATILITY_MID: u64 = 625;

/// Volatility level that adds 24 points to the factor (45^2).
const VOLATILITY_HIGH: u64 = 2_025;

/// Smallest recommendation change worth applying, ms.
const DISAVOW_DELTA_MS: u16 = 3;

/// Accelerated convergence burst, entered when nothing is remembered for
/// the current codec: the recommend period shrinks to a tenth (held to
/// 1..=2 s) for up to ten computations, publishing the running maximum.
struct QuickCalc {
    active: bool,
    remaining: u8,
    cancel_armed: bool,
    max_seen_ms: u16,
}

/// Recommendations per quick-calc burst.
const QUICK_CALC_ROUNDS: u8 = 10;

impl QuickCalc {
    const fn new() -> Self {
        Self {
            active: false,
            remaining: 0,
            cancel_armed: false,
            max_seen_ms: 0,
        }
    }

    fn enter(&mut self) {
        if !self.active {
            self.active = true;
            self.remaining = QUICK_CALC_ROUNDS;
            self.cancel_armed = false;
            self.max_seen_ms = 0;
            log::debug!("quick-calc: entered");
        }
    }

    #[inline]
    fn active(&self) -> bool {
        self.active
    }

    fn arm_cancel(&mut self) {
        self.cancel_armed = true;
    }

    fn period_ms(&self, config: &LatencyConfig) -> u64 {
        (config.recommend_period_s as u64 * 100).clamp(1_000, 2_000)
    }

    /// Fold one computed target in; returns the burst's running maximum.
    fn observe(&mut self, target_ms: u16) -> u16 {
        if target_ms > self.max_seen_ms {
            self.max_seen_ms = target_ms;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 || self.cancel_armed {
            self.active = false;
            self.cancel_armed = false;
            log::debug!("quick-calc: done, max {} ms", self.max_seen_ms);
        }
        self.max_seen_ms
    }
}

/// Per-session adaptive latency controller.
pub struct AdaptiveEngine {
    info: CommonSessionInfo,
    config: LatencyConfig,
    bounds: LatencyBounds,
    status: EngineStatus,
    samples: SourceSamples,
    histogram: JitterHistogram,
    factor_window: FactorWindow,
    ladder: DownTimerLadder,
    staccato: StaccatoState,
    quick: QuickCalc,
    /// Latency currently applied downstream.
    current_ms: u16,
    /// Latest routed target; trails `current_ms` during a staged descent.
    pending_ms: u16,
    fixed_cost_samples: u32,
    last_reco_ms: Option<u64>,
    first_reco_done: bool,
    last_factor: u32,
    last_volatility: u64,
    counters: EngineCounters,
}

impl AdaptiveEngine {
    /// Build an engine for a stream. `baseline_ms` is the policy-table
    /// latency used when nothing is remembered for this codec.
    pub fn new(
        info: CommonSessionInfo,
        config: LatencyConfig,
        baseline_ms: u16,
        cache: &LatencyCache,
    ) -> Self {
        let bounds = config.bounds();
        let seed = cache.get(info.format).unwrap_or(baseline_ms);
        Self {
            info,
            bounds,
            status: EngineStatus::Init,
            samples: SourceSamples::new(),
            histogram: JitterHistogram::new(),
            factor_window: FactorWindow::new(),
            ladder: DownTimerLadder::new(config.down_timer_period_s),
            staccato: StaccatoState::new(),
            quick: QuickCalc::new(),
            current_ms: seed,
            pending_ms: seed,
            fixed_cost_samples: 0,
            last_reco_ms: None,
            first_reco_done: false,
            last_factor: 0,
            last_volatility: 0,
            counters: EngineCounters::default(),
            config,
        }
    }

    #[inline]
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    #[inline]
    pub fn current_latency_ms(&self) -> u16 {
        self.current_ms
    }

    #[inline]
    pub fn bounds(&self) -> LatencyBounds {
        self.bounds
    }

    #[inline]
    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            status: self.status,
            current_ms: self.current_ms,
            pending_ms: self.pending_ms,
            bounds: self.bounds,
            last_factor: self.last_factor,
            volatility: self.last_volatility,
            stage_count: self.ladder.stage_count(),
            staccato_increment_ms: self.staccato.increment_ms(),
            quick_active: self.quick.active(),
            sample_count: self.samples.len(),
            counters: self.counters,
        }
    }

    /// Role change from the pairing service. Becoming slave drops all
    /// collected statistics: a mirroring bud must not analyze.
    pub fn set_role(&mut self, role: TwsRole) {
        if role == self.info.role {
            return;
        }
        log::info!("engine: role {:?} -> {:?}", self.info.role, role);
        self.info.role = role;
        if role.is_slave() {
            self.samples.clear();
            self.histogram.clear();
            self.factor_window.clear();
            self.ladder.clear();
            if self.status != EngineStatus::Init {
                self.status = EngineStatus::Playing;
            }
        }
    }

    /// Codec or rate refresh on an idempotent session re-init. Collected
    /// statistics describe the old cadence and are dropped.
    pub fn refresh_stream(&mut self, format: MediaFormat, rate: SampleRateClass) {
        if format == self.info.format && rate == self.info.rate {
            return;
        }
        self.info.format = format;
        self.info.rate = rate;
        self.samples.clear();
        self.histogram.clear();
        self.factor_window.clear();
        self.first_reco_done = false;
        self.quick.arm_cancel();
    }

    /// Session-computed transmission fixed cost, PCM samples.
    #[inline]
    pub fn set_fixed_cost_samples(&mut self, samples: u32) {
        self.fixed_cost_samples = samples;
    }

    /// Feed one received packet into the sampler. Ignored on a slave.
    pub fn on_packet(&mut self, packet: &PacketInfo) {
        if !self.info.role.analyzes() {
            return;
        }
        self.samples.record(packet.recv_time_us, packet.frames());
    }

    /// Playback-start notification from the media layer.
    pub fn on_playback_started(&mut self) {
        if self.info.role.is_slave() {
            self.status = EngineStatus::Playing;
            return;
        }
        self.status = match self.status {
            EngineStatus::Synced | EngineStatus::Playing => EngineStatus::Playing,
            EngineStatus::Init | EngineStatus::Preplay => EngineStatus::Preplay,
        };
    }

    /// Accept a value from the master (slave path): widen the bounds so
    /// the value fits, remember it, report it for the downstream push.
    pub fn accept_remote(&mut self, latency_ms: u16, cache: &mut LatencyCache) -> LatencyUpdate {
        self.bounds.expand_to_admit(latency_ms);
        self.current_ms = latency_ms;
        self.pending_ms = latency_ms;
        self.staccato.note_latency(latency_ms);
        cache.set(self.info.format, latency_ms);
        self.counters.updates_applied += 1;
        log::info!("engine: accepted {} ms from master", latency_ms);
        LatencyUpdate {
            latency_ms,
            reason: UpdateReason::PeerSync,
        }
    }

    /// Main periodic drive. Returns an update the session must apply.
    pub fn tick(&mut self, now_ms: u64, cache: &mut LatencyCache) -> Option<LatencyUpdate> {
        if self.info.role.is_slave() || !self.info.role.is_known() {
            return None;
        }
        match self.status {
            EngineStatus::Init | EngineStatus::Preplay => self.tick_prestart(now_ms, cache),
            EngineStatus::Synced => None,
            EngineStatus::Playing => self.tick_playing(now_ms, cache),
        }
    }

    fn advance_prestart(&mut self) {
        self.status = if self.status == EngineStatus::Preplay {
            EngineStatus::Playing
        } else {
            EngineStatus::Synced
        };
    }

    fn tick_prestart(&mut self, now_ms: u64, cache: &mut LatencyCache) -> Option<LatencyUpdate> {
        if let Some(remembered) = cache.get(self.info.format) {
            self.advance_prestart();
            return Some(self.apply_master(remembered, UpdateReason::CacheSeed, cache));
        }
        self.quick.enter();
        if self.samples.is_empty() {
            return None;
        }
        // Forced first cycle so the stream never starts on a stale value.
        let update = self.run_recommendation(now_ms, cache, true);
        self.advance_prestart();
        update
    }

    fn tick_playing(&mut self, now_ms: u64, cache: &mut LatencyCache) -> Option<LatencyUpdate> {
        if let Some(target) = self.ladder.pop_due(now_ms) {
            return Some(self.apply_master(target, UpdateReason::LadderStage, cache));
        }
        self.staccato.tick(now_ms, &self.config);
        // A codec switch or explicit invalidation mid-stream re-enters
        // the accelerated convergence burst.
        if cache.get(self.info.format).is_none() && !self.quick.active() {
            self.quick.enter();
        }
        self.run_recommendation(now_ms, cache, false)
    }

    fn run_recommendation(
        &mut self,
        now_ms: u64,
        cache: &mut LatencyCache,
        forced: bool,
    ) -> Option<LatencyUpdate> {
        let period_ms = if self.quick.active() {
            self.quick.period_ms(&self.config)
        } else {
            self.config.recommend_period_s as u64 * 1_000
        };
        if !forced {
            if let Some(last) = self.last_reco_ms {
                if now_ms.saturating_sub(last) < period_ms {
                    return None;
                }
            }
        }
        self.last_reco_ms = Some(now_ms);

        let result = self.histogram.analyze(
            &self.samples,
            self.info.rate.khz(),
            self.config.smoothing_factor,
        )?;
        self.counters.recommendations += 1;
        if result.burst_seen {
            self.counters.bursts_detected += 1;
        }

        // Recommendation factor, percent of nominal.
        let jitter_pct = result.cbig_max_us * 100 / result.nominal_us;
        let cost_pct =
            result.recv_cost_us.saturating_sub(result.nominal_us) * 100 / result.nominal_us;
        let factor =
            (jitter_pct + cost_pct).min(u32::MAX as u64) as u32 + self.config.smoothing_factor as u32 * 20;
        self.factor_window.push(factor);
        let volatility = self.factor_window.volatility();
        self.last_factor = factor;
        self.last_volatility = volatility;

        let adjusted = factor as u64
            + if volatility >= VOLATILITY_HIGH {
                24
            } else if volatility >= VOLATILITY_MID {
                12
            } else {
                0
            };

        // Half a packet of slack, the jitter margin, the link fixed cost;
        // samples over kHz gives milliseconds, rounded.
        let khz = self.info.rate.khz() as u64;
        let total_samples = result.nominal_samples / 2
            + result.nominal_samples * adjusted / 100
            + self.fixed_cost_samples as u64;
        let mut target_ms = ((total_samples + khz / 2) / khz).min(u16::MAX as u64) as u16;

        if !self.first_reco_done {
            self.first_reco_done = true;
            let floor = (result.nominal_us * 8 / 10 / 1_000).min(u16::MAX as u64) as u16;
            target_ms = target_ms.max(floor.saturating_add(self.bounds.min_ms));
        }

        let effective = if self.quick.active() {
            self.quick.observe(target_ms)
        } else {
            target_ms
        };
        if !self.quick.active() {
            self.histogram.clear();
        }

        if forced {
            // The stream must not start on a stale value: apply directly,
            // bypassing both the disavow window and the ladder.
            self.ladder.clear();
            self.pending_ms = effective;
            return Some(self.apply_master(effective, UpdateReason::Recommendation, cache));
        }

        let delta = effective.abs_diff(self.pending_ms);
        if delta < DISAVOW_DELTA_MS
            && effective != self.bounds.min_ms
            && self.pending_ms != self.bounds.min_ms
        {
            self.counters.updates_disavowed += 1;
            return None;
        }

        self.route_target(now_ms, effective, cache)
    }

    /// Asymmetric routing: rises apply at once, falls walk the ladder.
    fn route_target(
        &mut self,
        now_ms: u64,
        target_ms: u16,
        cache: &mut LatencyCache,
    ) -> Option<LatencyUpdate> {
        use core::cmp::Ordering;

        match target_ms.cmp(&self.current_ms) {
            Ordering::Greater => {
                let cap = self.bounds.max_ms.saturating_sub(self.bounds.min_ms);
                if self
                    .staccato
                    .on_up_adjust(now_ms, target_ms, self.pending_ms, &self.config, cap)
                {
                    self.counters.staccato_events += 1;
                }
                self.ladder.clear();
                self.pending_ms = target_ms;
                Some(self.apply_master(target_ms, UpdateReason::Recommendation, cache))
            }
            Ordering::Less => {
                if self.ladder.renew_final(target_ms) {
                    self.pending_ms = target_ms;
                    return None;
                }
                self.ladder.schedule(
                    now_ms,
                    self.current_ms,
                    target_ms,
                    self.config.down_step_span_ms,
                );
                self.pending_ms = target_ms;
                None
            }
            Ordering::Equal => {
                // A descent toward a stale target is obsolete once the
                // recommendation is back at the applied value.
                if !self.ladder.is_empty() {
                    self.ladder.clear();
                    self.pending_ms = target_ms;
                }
                None
            }
        }
    }

    /// Clamp into the working bounds (staccato floor included), remember
    /// and account the applied value.
    fn apply_master(
        &mut self,
        latency_ms: u16,
        reason: UpdateReason,
        cache: &mut LatencyCache,
    ) -> LatencyUpdate {
        let clamped = self
            .bounds
            .clamp_master(latency_ms, self.staccato.increment_ms());
        self.current_ms = clamped;
        if self.ladder.is_empty() {
            self.pending_ms = clamped;
        }
        self.staccato.note_latency(clamped);
        cache.set(self.info.format, clamped);
        self.counters.updates_applied += 1;
        log::info!("engine: apply {} ms ({:?})", clamped, reason);
        LatencyUpdate {
            latency_ms: clamped,
            reason,
        }
    }
}
