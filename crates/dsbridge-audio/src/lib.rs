//! DSBridge Audio - Legacy buffer emulation engine
//!
//! Emulates the lock/play/notify buffer contract of a legacy audio API on
//! top of an event-driven output stream.
//!
//! Architecture:
//! - `RingBuffer`: Circular byte store with read/write cursors and a lease ledger
//! - `Voice`: One client playback buffer with format, volume, pan and frequency
//! - `Mixer`: Converts, resamples, attenuates and averages voices per tick
//! - `DeviceSession`: Render thread that drives the mixer from device signals
//! - `AudioDevice`: Top-level handle with initialize/close semantics

pub mod convert;
pub mod hardware;
pub mod lock_ledger;
pub mod mixer;
pub mod render;
pub mod ring_buffer;
pub mod scratch;
pub mod voice;

pub use hardware::{BufferReadySignal, Endpoint, HardwareStream, LoopbackEndpoint, LoopbackMonitor};
pub use lock_ledger::{LockLedger, LockRegion, Span};
pub use mixer::{Attenuation, Mixer};
pub use render::{DeviceSession, SessionState};
pub use ring_buffer::{CursorKind, RingBuffer};
pub use scratch::ScratchArena;
pub use voice::{Frequency, Voice, VoiceDesc, VoiceId, VoiceParams, VoiceStatus};

#[cfg(feature = "cpal")]
pub use hardware::CpalEndpoint;

use dsbridge_core::{BridgeError, Result, SessionConfig, WaveFormat};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Audio device handle.
///
/// Starts uninitialized; [`AudioDevice::initialize`] opens a session on an
/// endpoint. Voices can only be created while a session is live.
pub struct AudioDevice {
    config: SessionConfig,
    session: Mutex<Option<DeviceSession>>,
}

impl AudioDevice {
    /// Create an uninitialized device.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    /// Open a session on `endpoint`.
    pub fn initialize(&self, endpoint: impl Endpoint) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(BridgeError::AlreadyInitialized);
        }
        *session = Some(DeviceSession::open(Box::new(endpoint), self.config.clone())?);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn state(&self) -> SessionState {
        self.session
            .lock()
            .as_ref()
            .map_or(SessionState::Uninitialized, DeviceSession::state)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn with_session<T>(&self, f: impl FnOnce(&DeviceSession) -> Result<T>) -> Result<T> {
        match self.session.lock().as_ref() {
            Some(session) => f(session),
            None => Err(BridgeError::NotInitialized),
        }
    }

    /// Negotiated device format.
    pub fn mix_format(&self) -> Result<WaveFormat> {
        self.with_session(|s| Ok(s.mix_format()))
    }

    /// Create a stopped voice and attach it to the mix.
    pub fn create_voice(&self, desc: VoiceDesc) -> Result<Arc<Voice>> {
        self.with_session(|session| {
            let voice = Arc::new(Voice::new(desc)?);
            session.attach(Arc::clone(&voice))?;
            Ok(voice)
        })
    }

    /// Duplicate `source` over its sample memory and attach the copy.
    pub fn duplicate_voice(&self, source: &Voice) -> Result<Arc<Voice>> {
        self.with_session(|session| {
            let voice = Arc::new(source.duplicate()?);
            session.attach(Arc::clone(&voice))?;
            Ok(voice)
        })
    }

    pub fn attach(&self, voice: Arc<Voice>) -> Result<()> {
        self.with_session(|s| s.attach(voice))
    }

    pub fn detach(&self, id: VoiceId) -> Result<Arc<Voice>> {
        self.with_session(|s| s.detach(id))
    }

    pub fn voices(&self) -> Result<Vec<Arc<Voice>>> {
        self.with_session(|s| Ok(s.voices()))
    }

    /// Completed render ticks of the live session.
    pub fn ticks(&self) -> Result<u64> {
        self.with_session(|s| Ok(s.ticks()))
    }

    /// Close the session. The device can be initialized again afterwards.
    pub fn close(&self) -> Result<()> {
        let session = self.session.lock().take();
        match session {
            Some(mut session) => {
                session.close();
                info!("Audio device closed");
                Ok(())
            }
            None => Err(BridgeError::NotInitialized),
        }
    }
}

impl Default for AudioDevice {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
