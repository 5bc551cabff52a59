//! Benchmarks for the mixer and ring buffer hot paths.
//!
//! Run with: cargo bench -p dsbridge-audio

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dsbridge_audio::{Frequency, Mixer, RingBuffer, Voice, VoiceDesc};
use dsbridge_core::WaveFormat;
use std::sync::Arc;

const FRAMES: usize = 800; // one 48 kHz tick at 60 Hz

fn looping_voice(format: WaveFormat) -> Arc<Voice> {
    let voice = Voice::new(VoiceDesc::with_duration_ms(format, 500)).unwrap();
    let fill = vec![0x40u8; voice.buffer().size()];
    voice.write(&fill).unwrap();
    voice.play(true);
    Arc::new(voice)
}

fn bench_mix_voice_count(c: &mut Criterion) {
    let target = WaveFormat::ieee_float(2, 48_000);
    let mut group = c.benchmark_group("mix_voices");

    for count in [1usize, 4, 16] {
        let voices: Vec<Arc<Voice>> = (0..count)
            .map(|_| looping_voice(WaveFormat::pcm(2, 48_000, 16)))
            .collect();
        let mut mixer = Mixer::new(FRAMES);

        group.bench_with_input(BenchmarkId::from_parameter(count), &voices, |bencher, voices| {
            bencher.iter(|| {
                let out = mixer.mix(black_box(voices), &target, FRAMES).unwrap();
                black_box(out.len());
            });
        });
    }
    group.finish();
}

fn bench_mix_resampled(c: &mut Criterion) {
    let target = WaveFormat::ieee_float(2, 48_000);
    let voices = vec![
        looping_voice(WaveFormat::pcm(1, 22_050, 8)),
        looping_voice(WaveFormat::pcm(2, 44_100, 16)),
    ];
    voices[1].set_frequency(Frequency::Hz(32_000)).unwrap();
    let mut mixer = Mixer::new(FRAMES);

    c.bench_function("mix_resampled_mixed_formats", |bencher| {
        bencher.iter(|| {
            let out = mixer.mix(black_box(&voices), &target, FRAMES).unwrap();
            black_box(out.len());
        });
    });
}

fn bench_ring_buffer_lease(c: &mut Criterion) {
    let ring = RingBuffer::new(64 * 1024).unwrap();
    let data = vec![0x7Fu8; 4096];

    c.bench_function("ring_lock_write_unlock_wrapped", |bencher| {
        bencher.iter(|| {
            let region = ring.lock(black_box(62 * 1024), black_box(4096)).unwrap();
            ring.write_region(&region, &data).unwrap();
            ring.unlock(&region).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_mix_voice_count,
    bench_mix_resampled,
    bench_ring_buffer_lease,
);
criterion_main!(benches);
