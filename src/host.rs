//! Module: host
//!
//! Purpose: Contracts toward the rest of the firmware. The latency core
//! performs no I/O of its own; the clock, property storage, the policy
//! table, the DSP/media sink and the TWS peer link are all supplied by
//! the integrating firmware through these traits.
//!
//! Everything is synchronous get/set or fire-and-forget; nothing here may
//! block. The controller is generic over the single [`Host`] umbrella so
//! production wires the real services and tests wire a scripted fake.

use crate::mode::LatencyMode;
use crate::types::MediaFormat;

/// Monotonic time sources.
pub trait Clock {
    /// Monotonic milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Convert a raw hardware cycle stamp (as reported with each packet)
    /// to monotonic microseconds.
    fn cycles_to_us(&self, cycles: u64) -> u64;
}

/// Persisted key/value properties surviving power cycles.
pub trait PropertyStore {
    /// Saved latency mode, if one was ever written.
    fn load_mode(&mut self) -> Option<u8>;

    fn store_mode(&mut self, mode: u8);
}

/// Per-(mode, codec) baseline threshold table maintained by the product
/// configuration, microseconds.
pub trait LatencyPolicy {
    fn threshold_us(&self, mode: LatencyMode, format: MediaFormat) -> u32;

    fn threshold_min_us(&self, mode: LatencyMode, format: MediaFormat) -> u32;
}

/// Decoder / DSP control surface.
pub trait MediaSink {
    /// Set the playback buffering latency.
    fn set_latency_us(&mut self, media_handle: u32, latency_us: u32);

    /// Drop/insert data adjustment on a latency change. The shipped DSP
    /// build performs no actual PCM manipulation here; the hook carries
    /// the new threshold so a future build can.
    fn adjust_stream_data(&mut self, dsp_handle: u32, latency_us: u32);

    /// Toggle the music frame-interpolation stage.
    fn set_plc_enabled(&mut self, dsp_handle: u32, enabled: bool);
}

/// TWS user-data channel: one-way, best-effort, bounded payloads.
pub trait PeerLink {
    /// Queue a payload toward the peer. Returns false when the transport
    /// refused it (no retry here; the repeat mechanism covers loss).
    fn send(&mut self, payload: &[u8]) -> bool;

    /// Poll one received payload into `buf`, returning its length.
    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize>;
}

/// Umbrella over every collaborator. Blanket-implemented, so a single
/// firmware services object (or a test fake) satisfies the controller.
pub trait Host: Clock + PropertyStore + LatencyPolicy + MediaSink + PeerLink {}

impl<T: Clock + PropertyStore + LatencyPolicy + MediaSink + PeerLink> Host for T {}
