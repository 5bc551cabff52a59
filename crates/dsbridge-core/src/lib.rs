//! DSBridge Core - Foundation types for the legacy audio-buffer emulator
//!
//! This crate provides the types shared by every DSBridge crate:
//! - Error kinds and the `Result` alias
//! - Wave format description (PCM / IEEE float)
//! - Device session configuration

pub mod config;
pub mod error;
pub mod format;

pub use config::SessionConfig;
pub use error::{BridgeError, Result};
pub use format::{SampleEncoding, WaveFormat};

/// Limits inherited from the legacy buffer contract.
pub mod limits {
    /// Lowest explicit playback frequency a voice accepts.
    pub const FREQUENCY_MIN: u32 = 100;

    /// Highest explicit playback frequency a voice accepts.
    pub const FREQUENCY_MAX: u32 = 200_000;

    /// Legacy status bit: the voice is playing.
    pub const STATUS_PLAYING: u32 = 0x1;

    /// Legacy status bit: the voice loops when it reaches the end.
    pub const STATUS_LOOPING: u32 = 0x4;
}
