//! # tws-latency
//!
//! Adaptive low-latency audio synchronization core for TWS earbud firmware.
//!
//! ## Architecture
//!
//! ```text
//! firmware ──▶ LatencyModeController ──▶ LatencyControlSession ──▶ AdaptiveEngine
//!              (mode cycle, dispatch)    (fixed cost, peer sync)   (jitter statistics,
//!               owns LatencyCache                                   hysteresis ladder)
//! ```
//!
//! The whole core is driven from one cooperative context: the firmware's
//! control loop feeds commands and a periodic tick into the controller,
//! and every hardware, storage and transport touch goes out through the
//! [`host`] collaborator traits. Nothing here blocks or spins a thread.
//!
//! The interesting part lives in [`engine`]: a statistical control loop
//! that measures packet jitter, derives a recommended buffering latency,
//! applies rises immediately while staging falls behind timers, reacts to
//! audible glitches, and keeps a TWS pair converged over a lossy one-way
//! sync channel.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod cache;
pub mod config;
pub mod controller;
pub mod engine;
pub mod host;
pub mod mode;
pub mod plc;
pub mod session;
pub mod sync;
pub mod types;

pub use cache::LatencyCache;
pub use config::{LatencyBounds, LatencyConfig};
pub use controller::{Command, ControllerSnapshot, LatencyModeController, Reply};
pub use engine::{
    AdaptiveEngine, EngineCounters, EngineSnapshot, EngineStatus, LatencyUpdate, UpdateReason,
};
pub use host::{Clock, Host, LatencyPolicy, MediaSink, PeerLink, PropertyStore};
pub use mode::LatencyMode;
pub use session::{LatencyControlSession, SyncCounters};
pub use sync::{LatencySyncPacket, SyncMode, SyncPacketError};
pub use types::{
    CommonSessionInfo, MediaFormat, PacketInfo, SampleRateClass, StreamType, TwsRole,
};
