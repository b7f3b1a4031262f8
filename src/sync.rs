//! Module: sync
//!
//! Purpose: Wire format for master -> slave latency sync packets.
//!
//! The packet rides the TWS user-data channel: one-way, best-effort, no
//! ordering on loss. Layout is fixed at 12 bytes, little-endian, with an
//! explicit encode/decode pair (never memory punning) so both buds agree
//! on the bytes regardless of compiler or target.
//!
//! ```text
//! [0..2) latency_ms u16 LE
//! [2]    mode       u8   1=Update 2=Save 3=Repeat
//! [3]    adjust     u8   repeat ordinal on Repeat, else 0 (reserved)
//! [4..8) samples    u32 LE (reserved, 0)
//! [8..10) pkt_num   u16 LE
//! [10..12) reserved
//! ```

use thiserror::Error;

/// Encoded packet length in bytes. The channel MTU allows 16.
pub const SYNC_PACKET_LEN: usize = 12;

/// What the receiver should do with the carried value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncMode {
    /// Apply the value now.
    Update = 1,
    /// Apply and remember across the stream (cache write on the slave).
    Save = 2,
    /// Retransmission of the previous packet; idempotent.
    Repeat = 3,
}

impl SyncMode {
    const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SyncMode::Update),
            2 => Some(SyncMode::Save),
            3 => Some(SyncMode::Repeat),
            _ => None,
        }
    }
}

/// Decode failures. The transport is lossy by contract, so callers log
/// and drop rather than escalate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncPacketError {
    #[error("sync packet too short: {0} bytes")]
    ShortBuffer(usize),
    #[error("unknown sync mode byte {0}")]
    BadMode(u8),
}

/// One latency sync packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencySyncPacket {
    pub latency_ms: u16,
    pub mode: SyncMode,
    /// Repeat ordinal (1..=2) on retransmissions, 0 otherwise.
    pub adjust: u8,
    /// Reserved for a future sample-count payload.
    pub samples: u32,
    /// Monotonic per-logical-packet number; repeats carry the original's.
    pub pkt_num: u16,
}

impl LatencySyncPacket {
    pub const fn new(mode: SyncMode, latency_ms: u16, pkt_num: u16) -> Self {
        Self {
            latency_ms,
            mode,
            adjust: 0,
            samples: 0,
            pkt_num,
        }
    }

    /// Serialize into the fixed wire layout.
    pub fn encode(&self) -> [u8; SYNC_PACKET_LEN] {
        let mut buf = [0u8; SYNC_PACKET_LEN];
        buf[0..2].copy_from_slice(&self.latency_ms.to_le_bytes());
        buf[2] = self.mode as u8;
        buf[3] = self.adjust;
        buf[4..8].copy_from_slice(&self.samples.to_le_bytes());
        buf[8..10].copy_from_slice(&self.pkt_num.to_le_bytes());
        buf
    }

    /// Parse from received bytes. Trailing bytes beyond the fixed layout
    /// are ignored (forward compatibility within the 16-byte MTU).
    pub fn decode(buf: &[u8]) -> Result<Self, SyncPacketError> {
        if buf.len() < SYNC_PACKET_LEN {
            return Err(SyncPacketError::ShortBuffer(buf.len()));
        }
        let mode = SyncMode::from_u8(buf[2]).ok_or(SyncPacketError::BadMode(buf[2]))?;
        Ok(Self {
            latency_ms: u16::from_le_bytes([buf[0], buf[1]]),
            mode,
            adjust: buf[3],
            samples: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            pkt_num: u16::from_le_bytes([buf[8], buf[9]]),
        })
    }
}
