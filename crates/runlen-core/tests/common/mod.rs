#![allow(dead_code)]

use runlen_core::{ChunkData, EncodePipeline, EncoderConfig, MergeMode, runs};

/// Decodes a run stream back into the bytes it represents.
pub fn expand(encoded: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for run in runs(encoded) {
        let run = run.expect("well-formed run stream");
        out.extend(std::iter::repeat_n(run.symbol, usize::from(run.count)));
    }
    out
}

/// Deterministic input with runs of varying length over a small alphabet.
pub fn runny_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let symbol = b'a' + ((state >> 60) as u8 % 4);
        let run = 1 + ((state >> 40) as usize % 600);
        out.extend(std::iter::repeat_n(symbol, run.min(len - out.len())));
    }
    out
}

pub fn encode_with(
    sources: &[Vec<u8>],
    chunk_size: usize,
    workers: usize,
    merge_mode: MergeMode,
) -> Vec<u8> {
    let config = EncoderConfig::new(chunk_size, workers).with_merge_mode(merge_mode);
    let pipeline = EncodePipeline::new(config).expect("valid config");
    let sources: Vec<ChunkData> = sources.iter().cloned().map(ChunkData::from).collect();
    let mut out = Vec::new();
    pipeline
        .encode_sources(&sources, &mut out)
        .expect("encode sources");
    out
}
