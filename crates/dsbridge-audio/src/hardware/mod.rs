//! Boundary between the render loop and an output device.
//!
//! An [`Endpoint`] is a resolved, not-yet-opened output device. The render
//! thread activates it, which yields a [`HardwareStream`] that lives on that
//! thread for the rest of the session. Streams raise the
//! [`BufferReadySignal`] whenever the device has consumed audio and can take
//! more.

pub mod loopback;

#[cfg(feature = "cpal")]
pub mod cpal_backend;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use dsbridge_core::{Result, SessionConfig, WaveFormat};

pub use loopback::{LoopbackEndpoint, LoopbackMonitor};

#[cfg(feature = "cpal")]
pub use cpal_backend::CpalEndpoint;

/// Auto-reset "buffer ready" event.
///
/// Notifications coalesce: any number of `notify` calls between two waits
/// wake the render loop once.
#[derive(Debug, Clone)]
pub struct BufferReadySignal {
    tx: Sender<()>,
}

impl BufferReadySignal {
    /// Create the signal and the receiving end the render loop waits on.
    pub fn new() -> (Self, Receiver<()>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (Self { tx }, rx)
    }

    /// Wake the render loop. Returns false once the loop has gone away.
    pub fn notify(&self) -> bool {
        !matches!(self.tx.try_send(()), Err(TrySendError::Disconnected(_)))
    }
}

/// An opened output stream, driven from the render thread only.
pub trait HardwareStream {
    /// Format the device expects in `get_buffer` regions.
    fn mix_format(&self) -> WaveFormat;

    /// Total device buffer size in frames.
    fn buffer_frames(&self) -> u32;

    /// Frames written but not yet played.
    fn padding_frames(&self) -> Result<u32>;

    /// Writable region for `frames` frames.
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8]>;

    /// Commit the region from `get_buffer`. With `silent` its contents are ignored.
    fn release_buffer(&mut self, frames: u32, silent: bool) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

/// An output device ready to be opened.
pub trait Endpoint: Send + 'static {
    /// Human-readable device name for logs.
    fn name(&self) -> String;

    /// Open the device. Called on the render thread.
    fn activate(
        self: Box<Self>,
        config: &SessionConfig,
        ready: BufferReadySignal,
    ) -> Result<Box<dyn HardwareStream>>;
}
