//! Music frame interpolation (packet-loss concealment) lifecycle.
//!
//! The concealment algorithm itself runs in the DSP; this side only
//! switches the stage on for low-latency music playback and off again.
//! Constructed when the mode leaves Normal, released when it returns or
//! the session dies.

use crate::host::MediaSink;

/// Extra algorithmic delay the concealment stage adds to the voice path,
/// microseconds. The current DSP build reports none.
pub const PLC_ALGORITHMIC_COST_US: u32 = 0;

/// Handle to an engaged concealment stage.
pub struct MusicPlc {
    dsp_handle: u32,
}

impl MusicPlc {
    /// Switch the stage on.
    pub fn engage<M: MediaSink>(dsp_handle: u32, sink: &mut M) -> Self {
        sink.set_plc_enabled(dsp_handle, true);
        log::info!("plc: engaged");
        Self { dsp_handle }
    }

    /// Switch the stage off, consuming the handle.
    pub fn release<M: MediaSink>(self, sink: &mut M) {
        sink.set_plc_enabled(self.dsp_handle, false);
        log::info!("plc: released");
    }
}
