//! Wave format description shared by voices and hardware streams.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// Linear PCM. 8-bit is unsigned centered at 128, 16-bit is signed little-endian.
    #[default]
    Pcm,
    /// 32-bit IEEE float, little-endian.
    IeeeFloat,
}

/// Layout of an interleaved sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaveFormat {
    pub encoding: SampleEncoding,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    /// CD-quality stereo PCM.
    pub const PCM_44K_STEREO_16: Self = Self {
        encoding: SampleEncoding::Pcm,
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
    };

    /// Linear PCM format.
    pub fn pcm(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        Self {
            encoding: SampleEncoding::Pcm,
            channels,
            sample_rate,
            bits_per_sample,
        }
    }

    /// 32-bit float format.
    pub fn ieee_float(channels: u16, sample_rate: u32) -> Self {
        Self {
            encoding: SampleEncoding::IeeeFloat,
            channels,
            sample_rate,
            bits_per_sample: 32,
        }
    }

    /// Bytes per sample of a single channel.
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes per frame (`channels × bytes_per_sample`).
    #[inline]
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }

    pub fn bytes_per_second(&self) -> usize {
        self.block_align() * self.sample_rate as usize
    }

    /// Number of whole frames contained in `bytes`.
    pub fn frames_in(&self, bytes: usize) -> usize {
        match self.block_align() {
            0 => 0,
            align => bytes / align,
        }
    }

    pub fn is_float(&self) -> bool {
        self.encoding == SampleEncoding::IeeeFloat
    }

    /// Reject formats that cannot describe any stream.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(BridgeError::invalid("format has zero channels"));
        }
        if self.sample_rate == 0 {
            return Err(BridgeError::invalid("format has zero sample rate"));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(BridgeError::invalid(format!(
                "bits per sample must be a non-zero multiple of 8, got {}",
                self.bits_per_sample
            )));
        }
        if self.is_float() && self.bits_per_sample != 32 {
            return Err(BridgeError::invalid(format!(
                "float format must be 32-bit, got {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}

impl Default for WaveFormat {
    fn default() -> Self {
        Self::PCM_44K_STEREO_16
    }
}
