use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use runlen_core::{ChunkData, EncodePipeline, EncoderConfig, MergeMode, encode};

const INPUT_LEN: usize = 8 * 1024 * 1024;

fn runny_input(len: usize) -> Vec<u8> {
    let mut state = 0x1234_5678_9ABC_DEF0u64;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let run = 1 + (state >> 54) as usize;
        out.extend(std::iter::repeat_n((state >> 32) as u8 & 0x0F, run.min(len - out.len())));
    }
    out
}

fn bench_codec(c: &mut Criterion) {
    let runny = runny_input(INPUT_LEN);
    let noisy: Vec<u8> = (0..INPUT_LEN).map(|i| (i * 31 % 251) as u8).collect();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(INPUT_LEN as u64));
    group.bench_function("runny_8mb", |b| b.iter(|| encode(black_box(&runny))));
    group.bench_function("noisy_8mb", |b| b.iter(|| encode(black_box(&noisy))));
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let source = ChunkData::from(runny_input(INPUT_LEN));
    let mut out = Vec::with_capacity(INPUT_LEN);

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Bytes(INPUT_LEN as u64));
    for workers in [1usize, 2, 4, 8] {
        for merge_mode in [MergeMode::Lookback, MergeMode::Canonical] {
            let config = EncoderConfig::new(64 * 1024, workers).with_merge_mode(merge_mode);
            let pipeline = EncodePipeline::new(config).expect("valid config");
            group.bench_function(format!("workers_{workers}_{merge_mode:?}"), |b| {
                b.iter(|| {
                    out.clear();
                    pipeline
                        .encode_sources(black_box(std::slice::from_ref(&source)), &mut out)
                        .expect("encode")
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_codec, bench_pipeline);
criterion_main!(benches);
