//! DSBridge demo player
//!
//! Opens an output device, plays a looping test tone through a legacy-style
//! voice for a few seconds and closes the device again.
//!
//! Usage: `dsbridge [config.json] [seconds]`

use anyhow::{Context, Result};
use dsbridge_audio::{AudioDevice, Voice, VoiceDesc};
use dsbridge_core::{SessionConfig, WaveFormat};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const TONE_HZ: f32 = 440.0;

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("DSBridge starting...");

    let mut args = std::env::args().skip(1);
    let config = match args.next().map(PathBuf::from) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            SessionConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SessionConfig::default(),
    };
    let seconds: u64 = match args.next() {
        Some(s) => s.parse().context("seconds must be a whole number")?,
        None => 3,
    };

    let device = AudioDevice::new(config);
    open_output(&device)?;
    info!(format = ?device.mix_format()?, "Output ready");

    let voice = device.create_voice(VoiceDesc::with_duration_ms(WaveFormat::PCM_44K_STEREO_16, 1000))?;
    fill_tone(&voice)?;
    voice.set_volume(0.8)?;
    voice.play(true);
    info!(voice = %voice.id(), seconds, "Playing test tone");

    std::thread::sleep(Duration::from_secs(seconds));

    voice.stop();
    let ticks = device.ticks()?;
    device.close()?;
    info!(ticks, "DSBridge finished");
    Ok(())
}

#[cfg(feature = "cpal")]
fn open_output(device: &AudioDevice) -> Result<()> {
    device.initialize(dsbridge_audio::CpalEndpoint::new())?;
    Ok(())
}

#[cfg(not(feature = "cpal"))]
fn open_output(device: &AudioDevice) -> Result<()> {
    let endpoint = dsbridge_audio::LoopbackEndpoint::default()
        .with_clock(Duration::from_millis(10))
        .without_capture();
    let monitor = endpoint.monitor();
    device.initialize(endpoint)?;
    info!(running = monitor.is_running(), "Using loopback output (build with --features cpal for sound)");
    Ok(())
}

/// Write one buffer's worth of a sine tone into `voice`.
fn fill_tone(voice: &Voice) -> Result<()> {
    let format = *voice.format();
    let frames = voice.buffer().size() / format.block_align();
    let mut pcm = Vec::with_capacity(frames * format.block_align());
    for i in 0..frames {
        let t = i as f32 / format.sample_rate as f32;
        let sample = ((t * TONE_HZ * std::f32::consts::TAU).sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..format.channels {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
    let written = voice.write(&pcm)?;
    info!(written, capacity = voice.buffer().size(), "Loaded tone");
    Ok(())
}
