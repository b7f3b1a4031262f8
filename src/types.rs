//! Module: types
//!
//! Purpose: Core value types shared by the session, engine and controller.
//! Stream identity (codec, stream type, sample rate), TWS pairing role and
//! the per-packet timing record fed to the jitter sampler.
//!
//! Safety: Safe. No unsafe blocks. Copy types only.

/// Media codec carried by the A2DP stream.
///
/// Raw values match the profile layer's codec identifiers; `from_u32`
/// tolerates unknown codes so a newer profile build cannot wedge the
/// latency core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MediaFormat {
    Unknown = 0,
    Sbc = 1,
    Aac = 2,
    AptxClassic = 3,
    AptxHd = 4,
    Ldac = 5,
    Lc3 = 6,
}

impl MediaFormat {
    /// Convert from the raw profile-layer codec identifier.
    pub const fn from_u32(value: u32) -> Self {
        match value {
            1 => MediaFormat::Sbc,
            2 => MediaFormat::Aac,
            3 => MediaFormat::AptxClassic,
            4 => MediaFormat::AptxHd,
            5 => MediaFormat::Ldac,
            6 => MediaFormat::Lc3,
            _ => MediaFormat::Unknown,
        }
    }

    /// Raw codec identifier.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Stream class of a playback session.
///
/// Only these two are accepted by session creation; values are non-zero so
/// the deinit payload can use 0 for "unspecified".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum StreamType {
    Music = 1,
    Voice = 2,
}

impl StreamType {
    /// Convert from a raw command payload. Returns `None` for anything
    /// other than music or voice.
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(StreamType::Music),
            2 => Some(StreamType::Voice),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// TWS pairing role of this earbud.
///
/// The master runs the full engine and forwards sync packets; the slave
/// accepts whatever the master sends. `None` is a single (unpaired) bud,
/// `Unknown` is the state before the pairing service reports in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TwsRole {
    Unknown = 0,
    None = 1,
    Master = 2,
    Slave = 3,
}

impl TwsRole {
    pub const fn from_u32(value: u32) -> Self {
        match value {
            1 => TwsRole::None,
            2 => TwsRole::Master,
            3 => TwsRole::Slave,
            _ => TwsRole::Unknown,
        }
    }

    /// True for any role that analyzes incoming packets itself
    /// (master or unpaired). The slave only mirrors the master.
    #[inline]
    pub const fn analyzes(self) -> bool {
        matches!(self, TwsRole::Master | TwsRole::None)
    }

    #[inline]
    pub const fn is_slave(self) -> bool {
        matches!(self, TwsRole::Slave)
    }

    #[inline]
    pub const fn is_known(self) -> bool {
        !matches!(self, TwsRole::Unknown)
    }
}

/// Sample-rate class of the decoded stream.
///
/// The engine works in integer kHz; the odd 44.1 kHz family rounds to 44,
/// which is within the error the ±3 ms disavow window absorbs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleRateClass {
    Khz44,
    Khz48,
    Khz96,
}

impl SampleRateClass {
    /// Classify a raw rate in Hz. Unrecognized rates fall back to the
    /// 48 kHz class, the common A2DP default.
    pub const fn from_hz(hz: u32) -> Self {
        match hz {
            44_100 | 44_000 | 22_050 => SampleRateClass::Khz44,
            88_200 | 96_000 => SampleRateClass::Khz96,
            _ => SampleRateClass::Khz48,
        }
    }

    /// Integer kHz used by all engine math.
    #[inline]
    pub const fn khz(self) -> u32 {
        match self {
            SampleRateClass::Khz44 => 44,
            SampleRateClass::Khz48 => 48,
            SampleRateClass::Khz96 => 96,
        }
    }
}

/// Per-stream context owned by the session.
///
/// The engine keeps a copy (refreshed through its setters) instead of a
/// pointer back into the session, so neither side can observe a half
/// updated view of the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommonSessionInfo {
    pub format: MediaFormat,
    pub stream_type: StreamType,
    pub rate: SampleRateClass,
    pub role: TwsRole,
}

impl CommonSessionInfo {
    pub const fn new(stream_type: StreamType, format: MediaFormat, rate: SampleRateClass) -> Self {
        Self {
            format,
            stream_type,
            rate,
            role: TwsRole::Unknown,
        }
    }
}

/// Timing record for one received audio packet.
///
/// The profile layer reports `{seq_no, pkt_len:12 bits, frame_cnt:4 bits}`
/// packed into one word plus a raw cycle-counter receive stamp; the
/// dispatcher converts cycles to microseconds before it reaches here.
///
/// Packed layout:
/// ```text
/// [15..12] frame_cnt   [11..0] pkt_len
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketInfo {
    /// A2DP sequence number (wraps).
    pub seq_no: u16,
    /// Payload length in bytes (12 bits).
    pub pkt_len: u16,
    /// Audio frames in the packet (4 bits). Zero is treated as one
    /// frame downstream.
    pub frame_cnt: u8,
    /// Monotonic receive time in microseconds.
    pub recv_time_us: u64,
}

impl PacketInfo {
    /// Payload length mask (bits 11..0).
    pub const LEN_MASK: u16 = 0x0FFF;

    /// Frame count shift (bits 15..12).
    pub const FRAME_SHIFT: u16 = 12;

    /// Unpack the profile layer's packed word.
    pub const fn from_raw(seq_no: u16, len_and_frames: u16, recv_time_us: u64) -> Self {
        Self {
            seq_no,
            pkt_len: len_and_frames & Self::LEN_MASK,
            frame_cnt: (len_and_frames >> Self::FRAME_SHIFT) as u8,
            recv_time_us,
        }
    }

    /// Pack back into the wire word (used by tests and diagnostics).
    #[inline]
    pub const fn to_raw(&self) -> u16 {
        (self.pkt_len & Self::LEN_MASK) | ((self.frame_cnt as u16) << Self::FRAME_SHIFT)
    }

    /// Frame count with the zero-means-one rule applied.
    #[inline]
    pub const fn frames(&self) -> u32 {
        if self.frame_cnt == 0 {
            1
        } else {
            self.frame_cnt as u32
        }
    }
}
