//! In-memory output device.
//!
//! Committed audio is captured instead of played. Playback progress is
//! simulated either by hand through [`LoopbackMonitor::consume`] or by a
//! clock thread that drains the queue in real time.

use super::{BufferReadySignal, Endpoint, HardwareStream};
use dsbridge_core::{BridgeError, Result, SessionConfig, WaveFormat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct LoopbackShared {
    captured: Mutex<Vec<u8>>,
    /// Frames committed but not yet consumed.
    padding: Mutex<u32>,
    ready: Mutex<Option<BufferReadySignal>>,
    committed_frames: AtomicU64,
    silent_frames: AtomicU64,
    running: AtomicBool,
    released: AtomicBool,
    /// Count committed frames without keeping their bytes.
    discard_capture: AtomicBool,
}

/// Observer and driver for a loopback device, usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct LoopbackMonitor {
    shared: Arc<LoopbackShared>,
}

impl LoopbackMonitor {
    /// Pretend the device played up to `frames` queued frames, then signal.
    pub fn consume(&self, frames: u32) {
        {
            let mut padding = self.shared.padding.lock();
            *padding = padding.saturating_sub(frames);
        }
        self.trigger();
    }

    /// Raise the buffer-ready signal without consuming anything.
    pub fn trigger(&self) {
        if let Some(ready) = self.shared.ready.lock().as_ref() {
            ready.notify();
        }
    }

    /// Keep committed bytes (the default) or only count them.
    pub fn set_capture(&self, enabled: bool) {
        self.shared.discard_capture.store(!enabled, Ordering::Release);
    }

    pub fn set_padding(&self, frames: u32) {
        *self.shared.padding.lock() = frames;
    }

    pub fn padding(&self) -> u32 {
        *self.shared.padding.lock()
    }

    /// Copy of everything committed so far, silence included.
    pub fn captured(&self) -> Vec<u8> {
        self.shared.captured.lock().clone()
    }

    /// Take and clear the captured bytes.
    pub fn take_captured(&self) -> Vec<u8> {
        std::mem::take(&mut *self.shared.captured.lock())
    }

    pub fn committed_frames(&self) -> u64 {
        self.shared.committed_frames.load(Ordering::Acquire)
    }

    /// Frames committed with the silence flag.
    pub fn silent_frames(&self) -> u64 {
        self.shared.silent_frames.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// True once the stream has been dropped.
    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    /// Poll until at least `frames` frames have been committed.
    pub fn wait_for_frames(&self, frames: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.committed_frames() < frames {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

/// Builder for a loopback device.
#[derive(Debug)]
pub struct LoopbackEndpoint {
    format: WaveFormat,
    buffer_frames: Option<u32>,
    clock: Option<Duration>,
    failure: Option<BridgeError>,
    monitor: LoopbackMonitor,
}

impl LoopbackEndpoint {
    /// Device with the given mix format. Buffer size comes from the session config.
    pub fn new(format: WaveFormat) -> Self {
        Self {
            format,
            buffer_frames: None,
            clock: None,
            failure: None,
            monitor: LoopbackMonitor::default(),
        }
    }

    /// Override the buffer size.
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frames = Some(frames);
        self
    }

    /// Drain the queue in real time, signalling every `period`.
    pub fn with_clock(mut self, period: Duration) -> Self {
        self.clock = Some(period);
        self
    }

    /// Make activation fail with `error`.
    pub fn failing(mut self, error: BridgeError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Count committed frames without keeping their bytes.
    pub fn without_capture(self) -> Self {
        self.monitor.set_capture(false);
        self
    }

    pub fn monitor(&self) -> LoopbackMonitor {
        self.monitor.clone()
    }
}

impl Default for LoopbackEndpoint {
    fn default() -> Self {
        Self::new(WaveFormat::ieee_float(2, 48_000))
    }
}

impl Endpoint for LoopbackEndpoint {
    fn name(&self) -> String {
        "loopback".to_string()
    }

    fn activate(
        self: Box<Self>,
        config: &SessionConfig,
        ready: BufferReadySignal,
    ) -> Result<Box<dyn HardwareStream>> {
        let LoopbackEndpoint {
            format,
            buffer_frames,
            clock,
            failure,
            monitor,
        } = *self;
        if let Some(err) = failure {
            return Err(err);
        }
        format.validate()?;
        let buffer_frames = buffer_frames.unwrap_or(config.buffer_frames);
        if buffer_frames == 0 {
            return Err(BridgeError::invalid("loopback buffer must be non-zero"));
        }

        let shared = Arc::clone(&monitor.shared);
        *shared.ready.lock() = Some(ready);
        shared.released.store(false, Ordering::Release);

        let clock = match clock {
            Some(period) => Some(spawn_clock(monitor, format.sample_rate, period)?),
            None => None,
        };

        info!(?format, buffer_frames, "Loopback device activated");
        Ok(Box::new(LoopbackStream {
            format,
            buffer_frames,
            staging: Vec::new(),
            shared,
            clock,
        }))
    }
}

fn spawn_clock(
    monitor: LoopbackMonitor,
    sample_rate: u32,
    period: Duration,
) -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let per_tick = ((sample_rate as f64) * period.as_secs_f64()).ceil() as u32;
    thread::Builder::new()
        .name("loopback-clock".into())
        .spawn(move || {
            while !stop_flag.load(Ordering::Acquire) {
                thread::sleep(period);
                if monitor.is_running() {
                    monitor.consume(per_tick);
                }
            }
            debug!("Loopback clock finished");
        })
        .map_err(|e| BridgeError::Fatal(format!("spawn loopback clock: {e}")))?;
    Ok(stop)
}

struct LoopbackStream {
    format: WaveFormat,
    buffer_frames: u32,
    staging: Vec<u8>,
    shared: Arc<LoopbackShared>,
    clock: Option<Arc<AtomicBool>>,
}

impl HardwareStream for LoopbackStream {
    fn mix_format(&self) -> WaveFormat {
        self.format
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn padding_frames(&self) -> Result<u32> {
        Ok(*self.shared.padding.lock())
    }

    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8]> {
        let free = self.buffer_frames - (*self.shared.padding.lock()).min(self.buffer_frames);
        if frames > free {
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
            self.staging[..len].fill(0);
            self.shared.silent_frames.fetch_add(frames as u64, Ordering::AcqRel);
        }
        if !self.shared.discard_capture.load(Ordering::Acquire) {
            self.shared.captured.lock().extend_from_slice(&self.staging[..len]);
        }
        *self.shared.padding.lock() += frames;
        self.shared.committed_frames.fetch_add(frames as u64, Ordering::AcqRel);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.shared.running.store(true, Ordering::Release);
        // Prime the loop so the first tick fills the headroom.
        if let Some(ready) = self.shared.ready.lock().as_ref() {
            ready.notify();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for LoopbackStream {
    fn drop(&mut self) {
        if let Some(stop) = self.clock.take() {
            stop.store(true, Ordering::Release);
        }
        *self.shared.ready.lock() = None;
        self.shared.running.store(false, Ordering::Release);
        self.shared.released.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(
        endpoint: LoopbackEndpoint,
    ) -> (Box<dyn HardwareStream>, crossbeam_channel::Receiver<()>) {
        let (ready, rx) = BufferReadySignal::new();
        let stream = Box::new(endpoint)
            .activate(&SessionConfig::default(), ready)
            .unwrap();
        (stream, rx)
    }

    #[test]
    fn test_commit_tracks_padding_and_capture() {
        let endpoint = LoopbackEndpoint::default().with_buffer_frames(16);
        let monitor = endpoint.monitor();
        let (mut stream, _rx) = open(endpoint);

        let region = stream.get_buffer(4).unwrap();
        assert_eq!(region.len(), 32);
        region.fill(0x11);
        stream.release_buffer(4, false).unwrap();

        assert_eq!(stream.padding_frames().unwrap(), 4);
        assert_eq!(monitor.captured(), vec![0x11; 32]);
        monitor.consume(3);
        assert_eq!(stream.padding_frames().unwrap(), 1);
    }

    #[test]
    fn test_capture_can_be_disabled() {
        let endpoint = LoopbackEndpoint::default().with_buffer_frames(16).without_capture();
        let monitor = endpoint.monitor();
        let (mut stream, _rx) = open(endpoint);

        stream.get_buffer(4).unwrap().fill(0x22);
        stream.release_buffer(4, false).unwrap();
        assert!(monitor.captured().is_empty());
        assert_eq!(monitor.committed_frames(), 4);

        monitor.set_capture(true);
        stream.get_buffer(2).unwrap().fill(0x33);
        stream.release_buffer(2, false).unwrap();
        assert_eq!(monitor.captured(), vec![0x33; 16]);
    }

    #[test]
    fn test_silent_commit_zeroes() {
        let endpoint = LoopbackEndpoint::default().with_buffer_frames(16);
        let monitor = endpoint.monitor();
        let (mut stream, _rx) = open(endpoint);

        stream.get_buffer(2).unwrap().fill(0xFF);
        stream.release_buffer(2, true).unwrap();
        assert_eq!(monitor.captured(), vec![0; 16]);
        assert_eq!(monitor.silent_frames(), 2);
    }

    #[test]
    fn test_get_buffer_bounded_by_free_space() {
        let endpoint = LoopbackEndpoint::default().with_buffer_frames(8);
        let monitor = endpoint.monitor();
        let (mut stream, _rx) = open(endpoint);
        monitor.set_padding(6);
        assert!(stream.get_buffer(3).is_err());
        assert!(stream.get_buffer(2).is_ok());
    }

    #[test]
    fn test_start_primes_signal_and_drop_releases() {
        let endpoint = LoopbackEndpoint::default();
        let monitor = endpoint.monitor();
        let (mut stream, rx) = open(endpoint);
        stream.start().unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(monitor.is_running());
        drop(stream);
        assert!(monitor.is_released());
    }

    #[test]
    fn test_failing_endpoint() {
        let (ready, _rx) = BufferReadySignal::new();
        let endpoint = LoopbackEndpoint::default().failing(BridgeError::NoDevice("unplugged".into()));
        let result = Box::new(endpoint).activate(&SessionConfig::default(), ready);
        assert!(matches!(result, Err(BridgeError::NoDevice(_))));
    }
}
