//! End-to-end device session tests over the loopback device.

use dsbridge_audio::{
    AudioDevice, CursorKind, LoopbackEndpoint, LoopbackMonitor, SessionState, Voice, VoiceDesc,
};
use dsbridge_core::{BridgeError, SessionConfig, WaveFormat};
use std::sync::Arc;
use std::time::Duration;

const HEADROOM: usize = 800; // 48 kHz / 60
const TIMEOUT: Duration = Duration::from_secs(5);

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Device running on a manually clocked loopback, past its first (silent) tick.
fn running_device() -> (AudioDevice, LoopbackMonitor) {
    let device = AudioDevice::new(SessionConfig::default());
    let endpoint = LoopbackEndpoint::default();
    let monitor = endpoint.monitor();
    device.initialize(endpoint).unwrap();
    assert!(monitor.wait_for_frames(HEADROOM as u64, TIMEOUT));
    monitor.take_captured();
    (device, monitor)
}

/// Looping 16-bit stereo voice whose whole arena holds `value`.
fn constant_voice(device: &AudioDevice, value: i16) -> Arc<Voice> {
    let format = WaveFormat::pcm(2, 48_000, 16);
    let voice = device
        .create_voice(VoiceDesc::new(format, 4 * HEADROOM * format.block_align()))
        .unwrap();
    let capacity = voice.buffer().size();
    let pcm: Vec<u8> = std::iter::repeat(value.to_le_bytes())
        .take(capacity / 2)
        .flatten()
        .collect();

    let region = voice.lock(0, capacity).unwrap();
    voice.write_region(&region, &pcm).unwrap();
    voice.unlock(&region).unwrap();
    voice
        .buffer()
        .set_cursor(CursorKind::Write, capacity - format.block_align(), false)
        .unwrap();
    voice.play(true);
    voice
}

/// Let the device play one headroom's worth and capture the next tick.
fn next_tick(monitor: &LoopbackMonitor) -> Vec<f32> {
    let target = monitor.committed_frames() + HEADROOM as u64;
    monitor.consume(HEADROOM as u32);
    assert!(monitor.wait_for_frames(target, TIMEOUT));
    floats(&monitor.take_captured())
}

#[test]
fn playing_voice_reaches_device() {
    let (device, monitor) = running_device();
    let voice = constant_voice(&device, 8192);

    let samples = next_tick(&monitor);
    assert_eq!(samples.len(), HEADROOM * 2);
    assert!(samples.iter().all(|&s| s == 0.25));

    // sliding window: both cursors moved by one tick of source bytes
    let (read, _) = voice.positions();
    assert_eq!(read, HEADROOM * 4);
    device.close().unwrap();
}

#[test]
fn hard_left_pan_silences_right_channel() {
    let (device, monitor) = running_device();
    let voice = constant_voice(&device, 8192);
    voice.set_pan(-1.0).unwrap();

    let samples = next_tick(&monitor);
    for frame in samples.chunks_exact(2) {
        assert_eq!(frame, &[0.25, 0.0]);
    }
}

#[test]
fn two_voices_are_averaged() {
    let (device, monitor) = running_device();
    constant_voice(&device, 16384);
    constant_voice(&device, 0);

    let samples = next_tick(&monitor);
    assert!(samples.iter().all(|&s| s == 0.25));
}

#[test]
fn stopped_voice_commits_silence() {
    let (device, monitor) = running_device();
    let voice = constant_voice(&device, 8192);
    voice.stop();
    let silent_before = monitor.silent_frames();

    let samples = next_tick(&monitor);
    assert!(samples.iter().all(|&s| s == 0.0));
    assert_eq!(monitor.silent_frames(), silent_before + HEADROOM as u64);
    assert_eq!(voice.positions().0, 0);
}

#[test]
fn unsupported_voice_degrades_to_silence() {
    let (device, monitor) = running_device();
    let format = WaveFormat::pcm(2, 48_000, 24);
    let voice = device
        .create_voice(VoiceDesc::new(format, format.block_align() * 4096))
        .unwrap();
    voice.play(true);

    let samples = next_tick(&monitor);
    assert!(samples.iter().all(|&s| s == 0.0));
    assert_eq!(device.state(), SessionState::Running);
}

#[test]
fn lifecycle_misuse_is_reported() {
    let device = AudioDevice::default();
    assert!(matches!(device.voices(), Err(BridgeError::NotInitialized)));
    assert!(matches!(device.ticks(), Err(BridgeError::NotInitialized)));

    device.initialize(LoopbackEndpoint::default()).unwrap();
    assert!(matches!(
        device.initialize(LoopbackEndpoint::default()),
        Err(BridgeError::AlreadyInitialized)
    ));
    assert_eq!(
        device.mix_format().unwrap(),
        WaveFormat::ieee_float(2, 48_000)
    );

    device.close().unwrap();
    assert!(matches!(device.close(), Err(BridgeError::NotInitialized)));
}

#[test]
fn failed_initialization_leaves_device_closed() {
    let device = AudioDevice::default();
    let endpoint = LoopbackEndpoint::default().failing(BridgeError::NoDevice("unplugged".into()));
    assert!(matches!(device.initialize(endpoint), Err(BridgeError::NoDevice(_))));
    assert!(!device.is_initialized());
    assert!(device.initialize(LoopbackEndpoint::default()).is_ok());
}

#[test]
fn close_releases_hardware() {
    let (device, monitor) = running_device();
    constant_voice(&device, 8192);
    device.close().unwrap();
    assert!(monitor.is_released());
    assert!(!monitor.is_running());
    assert_eq!(device.state(), SessionState::Uninitialized);
}
