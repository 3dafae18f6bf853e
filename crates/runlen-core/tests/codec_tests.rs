mod common;

use common::expand;
use proptest::prelude::*;
use runlen_core::{RunEncoder, encode, runs};

#[test]
fn decodes_back_to_input() {
    let input = b"aaaaaaaaaabbbcddddddddddddddde".repeat(30);
    assert_eq!(expand(&encode(&input)), input);
}

#[test]
fn single_symbol_run_needs_ceil_n_over_255_pairs() {
    for len in [1usize, 254, 255, 256, 510, 511, 10_000] {
        assert_single_symbol_runs(len);
    }
}

fn assert_single_symbol_runs(len: usize) {
    let encoded = encode(&vec![b'z'; len]);
    let pairs: Vec<_> = runs(&encoded)
        .collect::<Result<_, _>>()
        .expect("valid stream");

    assert_eq!(pairs.len(), len.div_ceil(255), "len {len}");
    assert!(pairs.iter().all(|run| run.symbol == b'z'), "len {len}");
    assert_eq!(
        pairs.iter().map(|run| usize::from(run.count)).sum::<usize>(),
        len,
        "len {len}"
    );
    if let Some((_, full)) = pairs.split_last() {
        assert!(full.iter().all(|run| run.count == 255), "len {len}");
    }
}

#[test]
fn streaming_encoder_matches_one_shot() {
    let input = common::runny_bytes(5_000, 7);
    let mut encoder = RunEncoder::new();
    let mut out = Vec::new();
    for piece in input.chunks(37) {
        encoder.feed_slice(piece, &mut out);
    }
    if let Some(run) = encoder.finish() {
        out.extend_from_slice(&run.to_wire());
    }
    assert_eq!(out, encode(&input));
}

proptest! {
    #[test]
    fn any_single_symbol_run_splits_into_full_pairs(len in 1usize..5_000) {
        assert_single_symbol_runs(len);
    }

    #[test]
    fn encode_then_expand_is_identity(input in proptest::collection::vec(0u8..4, 0..2048)) {
        prop_assert_eq!(expand(&encode(&input)), input);
    }

    #[test]
    fn adjacent_pairs_never_leave_room_to_merge(
        input in proptest::collection::vec(0u8..3, 0..2048),
    ) {
        let encoded = encode(&input);
        let pairs: Vec<_> = runs(&encoded).collect::<Result<_, _>>().expect("valid stream");
        for window in pairs.windows(2) {
            if window[0].symbol == window[1].symbol {
                prop_assert_eq!(window[0].count, 255);
            }
        }
    }
}
