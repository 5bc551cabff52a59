//! Device session configuration.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Tunables for a device session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Target headroom is `sample_rate / headroom_rate_divisor` frames, capped at
    /// the hardware buffer size.
    pub headroom_rate_divisor: u32,
    /// Initial scratch arena size in stereo frames.
    pub scratch_frames: usize,
    /// Name given to the render thread.
    pub render_thread_name: String,
    /// Requested hardware buffer size, for backends that let the client pick.
    pub buffer_frames: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headroom_rate_divisor: 60,
            scratch_frames: 4096,
            render_thread_name: "dsbridge-render".to_string(),
            buffer_frames: 4800,
        }
    }
}

impl SessionConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.headroom_rate_divisor == 0 {
            return Err(BridgeError::invalid("headroom_rate_divisor must be non-zero"));
        }
        if self.render_thread_name.is_empty() {
            return Err(BridgeError::invalid("render_thread_name must not be empty"));
        }
        if self.buffer_frames == 0 {
            return Err(BridgeError::invalid("buffer_frames must be non-zero"));
        }
        Ok(())
    }

    /// Frames the render loop tries to keep queued in hardware.
    pub fn target_headroom_frames(&self, sample_rate: u32, buffer_frames: u32) -> u32 {
        (sample_rate / self.headroom_rate_divisor.max(1)).min(buffer_frames)
    }
}
