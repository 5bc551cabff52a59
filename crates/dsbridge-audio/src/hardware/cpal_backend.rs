//! Output through the platform audio host via cpal.
//!
//! cpal pulls audio from a callback thread, while the render loop pushes.
//! The two meet in a lock-free single-producer single-consumer sample queue:
//! the render thread is the producer, the cpal callback the consumer. Every
//! callback raises the buffer-ready signal, which plays the role of the
//! device's "buffer drained" event.

use super::{BufferReadySignal, Endpoint, HardwareStream};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use dsbridge_core::{BridgeError, Result, SessionConfig, WaveFormat};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// SPSC queue of `f32` samples stored as raw bits in atomic slots.
struct SampleQueue {
    slots: Box<[AtomicU32]>,
    capacity: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

impl SampleQueue {
    /// Queue holding up to `capacity` samples.
    fn new(capacity: usize) -> Self {
        // One spare slot tells full from empty.
        let actual = capacity + 1;
        Self {
            slots: (0..actual).map(|_| AtomicU32::new(0)).collect(),
            capacity: actual,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    fn occupied(&self) -> usize {
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Acquire);
        if w >= r {
            w - r
        } else {
            self.capacity - r + w
        }
    }

    fn vacant(&self) -> usize {
        self.capacity - 1 - self.occupied()
    }

    /// Producer side. Returns the number of samples queued.
    fn push(&self, samples: impl Iterator<Item = f32>) -> usize {
        let room = self.vacant();
        let mut w = self.write_pos.load(Ordering::Relaxed);
        let mut count = 0;
        for sample in samples.take(room) {
            self.slots[w].store(sample.to_bits(), Ordering::Relaxed);
            w = (w + 1) % self.capacity;
            count += 1;
        }
        self.write_pos.store(w, Ordering::Release);
        count
    }

    /// Consumer side. Fills `out` from the queue, returns samples taken.
    fn pop_into(&self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.occupied());
        let mut r = self.read_pos.load(Ordering::Relaxed);
        for slot in out[..count].iter_mut() {
            *slot = f32::from_bits(self.slots[r].load(Ordering::Relaxed));
            r = (r + 1) % self.capacity;
        }
        self.read_pos.store(r, Ordering::Release);
        count
    }
}

/// The host's default output device, or one picked by name.
#[derive(Debug, Default, Clone)]
pub struct CpalEndpoint {
    device_name: Option<String>,
}

impl CpalEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the output device whose name matches exactly.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

impl Endpoint for CpalEndpoint {
    fn name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default output".to_string())
    }

    fn activate(
        self: Box<Self>,
        config: &SessionConfig,
        ready: BufferReadySignal,
    ) -> Result<Box<dyn HardwareStream>> {
        let host = cpal::default_host();
        let device = match &self.device_name {
            Some(wanted) => host
                .output_devices()
                .map_err(|e| BridgeError::NoDevice(e.to_string()))?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false)),
            None => host.default_output_device(),
        }
        .ok_or_else(|| BridgeError::NoDevice(self.name()))?;

        let default = device
            .default_output_config()
            .map_err(|e| BridgeError::NoDevice(e.to_string()))?;
        let sample_rate = default.sample_rate().0;
        let stream_config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };

        let buffer_frames = config.buffer_frames;
        let queue = Arc::new(SampleQueue::new(buffer_frames as usize * 2));
        let consumer = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let got = consumer.pop_into(out);
                    out[got..].fill(0.0);
                    ready.notify();
                },
                |err| warn!(error = %err, "Output stream error"),
                None,
            )
            .map_err(|e| BridgeError::NoDevice(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            buffer_frames,
            "cpal output stream opened"
        );

        Ok(Box::new(CpalStream {
            stream,
            queue,
            format: WaveFormat::ieee_float(2, sample_rate),
            buffer_frames,
            staging: Vec::new(),
        }))
    }
}

struct CpalStream {
    stream: cpal::Stream,
    queue: Arc<SampleQueue>,
    format: WaveFormat,
    buffer_frames: u32,
    staging: Vec<u8>,
}

impl HardwareStream for CpalStream {
    fn mix_format(&self) -> WaveFormat {
        self.format
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn padding_frames(&self) -> Result<u32> {
        Ok((self.queue.occupied() / 2) as u32)
    }

    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8]> {
        let free = self.queue.vacant() / 2;
        if frames as usize > free {
            return Err(BridgeError::invalid(format!(
                "requested {frames} frames, only {free} free"
            )));
        }
        let len = frames as usize * self.format.block_align();
        if self.staging.len() < len {
            self.staging.resize(len, 0);
        }
        Ok(&mut self.staging[..len])
    }

    fn release_buffer(&mut self, frames: u32, silent: bool) -> Result<()> {
        let len = frames as usize * self.format.block_align();
        if len > self.staging.len() {
            return Err(BridgeError::invalid("release without matching get_buffer"));
        }
        if silent {
            self.queue
                .push(std::iter::repeat(0.0).take(frames as usize * 2));
        } else {
            self.queue.push(
                self.staging[..len]
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| BridgeError::NoDevice(e.to_string()))
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| BridgeError::Fatal(e.to_string()))
    }
}
