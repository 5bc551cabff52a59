//! Render loop and device session lifecycle.
//!
//! One dedicated thread per session owns the hardware stream and the mixer.
//! It waits on two signals, "buffer ready" from the device and "close
//! requested" from the session, and on every buffer-ready tick tops the
//! device queue up to the target headroom.
//!
//! Shutdown is a two-event protocol: the session sends a close request and
//! then blocks until the thread acknowledges that it has released the
//! hardware. The acknowledgment is sent from a drop guard, so it also fires
//! if the thread unwinds. The OS thread is never joined.

use crate::convert::check_target_format;
use crate::hardware::{BufferReadySignal, Endpoint, HardwareStream};
use crate::mixer::Mixer;
use crate::voice::{Voice, VoiceId};
use crossbeam_channel::{select, Receiver, Sender};
use dsbridge_core::{BridgeError, Result, SessionConfig, WaveFormat};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use thread_priority::{set_current_thread_priority, ThreadPriority};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Running,
    Closing,
    Terminated,
}

/// State shared between the session handle and its render thread.
#[derive(Debug)]
struct SessionShared {
    state: Mutex<SessionState>,
    voices: RwLock<Vec<Arc<Voice>>>,
    ticks: AtomicU64,
    silent_ticks: AtomicU64,
}

impl SessionShared {
    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }
}

/// Sends the "thread exited" acknowledgment when dropped.
struct ExitAck(Sender<()>);

impl Drop for ExitAck {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// What the render thread reports once the device is open.
#[derive(Debug, Clone, Copy)]
struct InitInfo {
    mix_format: WaveFormat,
    buffer_frames: u32,
    headroom_frames: u32,
}

/// A live connection to one output device.
pub struct DeviceSession {
    shared: Arc<SessionShared>,
    info: InitInfo,
    close_tx: Option<Sender<()>>,
    exited_rx: Receiver<()>,
}

impl DeviceSession {
    /// Open `endpoint` on a new render thread.
    ///
    /// Blocks until the thread reports that the device is running, or that
    /// initialization failed.
    pub fn open(endpoint: Box<dyn Endpoint>, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(SessionShared {
            state: Mutex::new(SessionState::Initializing),
            voices: RwLock::new(Vec::new()),
            ticks: AtomicU64::new(0),
            silent_ticks: AtomicU64::new(0),
        });

        let (init_tx, init_rx) = crossbeam_channel::bounded::<Result<InitInfo>>(1);
        let (close_tx, close_rx) = crossbeam_channel::bounded::<()>(1);
        let (exited_tx, exited_rx) = crossbeam_channel::bounded::<()>(1);

        let device = endpoint.name();
        info!(device = %device, "Opening device session");

        let thread_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(config.render_thread_name.clone())
            .spawn(move || {
                let _ack = ExitAck(exited_tx);
                render_thread(endpoint, config, thread_shared, init_tx, close_rx);
            })
            .map_err(|e| BridgeError::Fatal(format!("spawn render thread: {e}")))?;

        match init_rx.recv() {
            Ok(Ok(info)) => {
                info!(
                    device = %device,
                    format = ?info.mix_format,
                    buffer_frames = info.buffer_frames,
                    headroom_frames = info.headroom_frames,
                    "Device session running"
                );
                Ok(Self {
                    shared,
                    info,
                    close_tx: Some(close_tx),
                    exited_rx,
                })
            }
            Ok(Err(err)) => {
                let _ = exited_rx.recv();
                shared.set_state(SessionState::Terminated);
                Err(err)
            }
            Err(_) => {
                let _ = exited_rx.recv();
                shared.set_state(SessionState::Terminated);
                Err(BridgeError::Fatal(
                    "render thread exited during initialization".to_string(),
                ))
            }
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Negotiated device format.
    pub fn mix_format(&self) -> WaveFormat {
        self.info.mix_format
    }

    pub fn buffer_frames(&self) -> u32 {
        self.info.buffer_frames
    }

    /// Frames the render loop keeps queued in the device.
    pub fn headroom_frames(&self) -> u32 {
        self.info.headroom_frames
    }

    /// Render ticks that committed audio, silence included.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    /// Render ticks committed as silence.
    pub fn silent_ticks(&self) -> u64 {
        self.shared.silent_ticks.load(Ordering::Acquire)
    }

    /// Add a voice to the mix.
    pub fn attach(&self, voice: Arc<Voice>) -> Result<()> {
        let mut voices = self.shared.voices.write();
        if voices.iter().any(|v| v.id() == voice.id()) {
            return Err(BridgeError::invalid(format!("{} already attached", voice.id())));
        }
        debug!(voice = %voice.id(), "Attached voice");
        voices.push(voice);
        Ok(())
    }

    /// Remove a voice from the mix, handing back the session's reference.
    pub fn detach(&self, id: VoiceId) -> Result<Arc<Voice>> {
        let mut voices = self.shared.voices.write();
        match voices.iter().position(|v| v.id() == id) {
            Some(pos) => {
                debug!(voice = %id, "Detached voice");
                Ok(voices.remove(pos))
            }
            None => Err(BridgeError::invalid(format!("{id} is not attached"))),
        }
    }

    pub fn voices(&self) -> Vec<Arc<Voice>> {
        self.shared.voices.read().clone()
    }

    /// Ask the render thread to stop and wait for it to release the device.
    pub fn close(&mut self) {
        let Some(close_tx) = self.close_tx.take() else {
            return;
        };
        info!("Closing device session");
        let _ = close_tx.send(());
        drop(close_tx);
        // Unbounded: the thread always acknowledges, even when unwinding.
        let _ = self.exited_rx.recv();
        self.shared.voices.write().clear();
        self.shared.set_state(SessionState::Terminated);
        info!(ticks = self.ticks(), "Device session terminated");
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn render_thread(
    endpoint: Box<dyn Endpoint>,
    config: SessionConfig,
    shared: Arc<SessionShared>,
    init_tx: Sender<Result<InitInfo>>,
    close_rx: Receiver<()>,
) {
    raise_priority();
    let (ready, ready_rx) = BufferReadySignal::new();
    let mut render = match RenderLoop::initialize(endpoint, &config, Arc::clone(&shared), ready) {
        Ok(render) => render,
        Err(err) => {
            error!(error = %err, "Device initialization failed");
            let _ = init_tx.send(Err(err));
            return;
        }
    };

    shared.set_state(SessionState::Running);
    let _ = init_tx.send(Ok(render.info));
    drop(init_tx);

    render.run(&ready_rx, &close_rx);
    render.shutdown();
}

/// Move the calling thread to the highest priority its policy allows.
///
/// Failure is logged and otherwise ignored; the loop still runs.
fn raise_priority() -> bool {
    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(()) => {
            debug!("Render thread priority raised");
            true
        }
        Err(err) => {
            warn!(error = ?err, "Could not raise render thread priority");
            false
        }
    }
}

/// Render-thread state for one session.
struct RenderLoop {
    stream: Box<dyn HardwareStream>,
    mixer: Mixer,
    shared: Arc<SessionShared>,
    info: InitInfo,
    /// Voices taking part in the current tick. Reused to avoid reallocating.
    active: Vec<Arc<Voice>>,
}

impl RenderLoop {
    fn initialize(
        endpoint: Box<dyn Endpoint>,
        config: &SessionConfig,
        shared: Arc<SessionShared>,
        ready: BufferReadySignal,
    ) -> Result<Self> {
        let mut stream = endpoint.activate(config, ready)?;
        let mix_format = stream.mix_format();
        check_target_format(&mix_format)?;

        let buffer_frames = stream.buffer_frames();
        if buffer_frames == 0 {
            return Err(BridgeError::NoDevice("device reported an empty buffer".to_string()));
        }
        let headroom_frames = config.target_headroom_frames(mix_format.sample_rate, buffer_frames);

        stream.start()?;

        Ok(Self {
            stream,
            mixer: Mixer::new(config.scratch_frames),
            shared,
            info: InitInfo {
                mix_format,
                buffer_frames,
                headroom_frames,
            },
            active: Vec::with_capacity(16),
        })
    }

    fn run(&mut self, ready_rx: &Receiver<()>, close_rx: &Receiver<()>) {
        debug!("Render loop started");
        loop {
            select! {
                recv(ready_rx) -> msg => {
                    if msg.is_err() {
                        warn!("Device signal disconnected");
                        break;
                    }
                    self.tick();
                }
                recv(close_rx) -> _ => break,
            }
        }
        debug!("Render loop finished");
    }

    /// One render tick: top the device queue up to the headroom target.
    fn tick(&mut self) {
        let padding = match self.stream.padding_frames() {
            Ok(padding) => padding,
            Err(err) => {
                warn!(error = %err, "Failed to query device padding");
                return;
            }
        };
        let available = self.info.headroom_frames as i64 - padding as i64;
        if available <= 0 {
            return;
        }
        let frames = available as u32;

        self.active.clear();
        self.active.extend(
            self.shared
                .voices
                .read()
                .iter()
                .filter(|v| v.is_playing())
                .cloned(),
        );

        let region = match self.stream.get_buffer(frames) {
            Ok(region) => region,
            Err(err) => {
                warn!(error = %err, frames, "Failed to acquire device buffer");
                return;
            }
        };

        let silent = if self.active.is_empty() {
            true
        } else {
            match self.mixer.mix(&self.active, &self.info.mix_format, frames as usize) {
                Ok(mixed) => {
                    let n = mixed.len().min(region.len());
                    region[..n].copy_from_slice(&mixed[..n]);
                    false
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        voices = self.active.len(),
                        "Mix failed, committing silence"
                    );
                    true
                }
            }
        };

        if let Err(err) = self.stream.release_buffer(frames, silent) {
            warn!(error = %err, frames, "Failed to commit device buffer");
            return;
        }

        self.shared.ticks.fetch_add(1, Ordering::AcqRel);
        if silent {
            self.shared.silent_ticks.fetch_add(1, Ordering::AcqRel);
        }
        trace!(frames, padding, voices = self.active.len(), silent, "Render tick");
    }

    fn shutdown(self) {
        self.shared.set_state(SessionState::Closing);
        let RenderLoop { mut stream, .. } = self;
        if let Err(err) = stream.stop() {
            warn!(error = %err, "Failed to stop device stream");
        }
        drop(stream);
        debug!("Device released");
    }
}
