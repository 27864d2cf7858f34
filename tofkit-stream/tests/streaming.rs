#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
use approx::assert_relative_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tofkit_stream::{Accumulator, AccumulatorSpec, Key, Pipeline, StreamError, StreamProcessor};

const A: Key = Key::new("A");
const B: Key = Key::new("B");
const D: Key = Key::new("D");
const E: Key = Key::new("E");
const X: Key = Key::new("X");
const T: Key = Key::new("T");
const T_E: Key = Key::new("TE");
const UNUSED: Key = Key::new("Unused");

struct Counters {
    static_calls: Arc<AtomicUsize>,
    chunk_calls: Arc<AtomicUsize>,
}

/// `B = 10 A` is static, `X = D * B` depends on the chunk, `T = X + B`, `TE = X + E`.
fn pipeline() -> (Pipeline<f64>, Counters) {
    let counters = Counters {
        static_calls: Arc::new(AtomicUsize::new(0)),
        chunk_calls: Arc::new(AtomicUsize::new(0)),
    };
    let mut p = Pipeline::new();
    p.set(A, 2.0);
    let calls = Arc::clone(&counters.static_calls);
    p.insert(B, vec![A], move |v| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(v[0] * 10.0)
    });
    let calls = Arc::clone(&counters.chunk_calls);
    p.insert(X, vec![D, B], move |v| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(v[0] * v[1])
    });
    p.insert(T, vec![X, B], |v| Ok(v[0] + v[1]));
    p.insert(T_E, vec![X, E], |v| Ok(v[0] + v[1]));
    p.insert(UNUSED, vec![D], |v| Ok(*v[0]));
    (p, counters)
}

fn chunk(pairs: &[(Key, f64)]) -> HashMap<Key, f64> {
    pairs.iter().copied().collect()
}

#[test]
fn test_eternal_accumulation() {
    let (base, _) = pipeline();
    let mut processor = StreamProcessor::with_eternal(&base, &[D], &[T], &[X]).unwrap();
    let first = processor.add_chunk(chunk(&[(D, 1.0)])).unwrap();
    assert_relative_eq!(first[&T], 40.0);
    let second = processor.add_chunk(chunk(&[(D, 2.0)])).unwrap();
    assert_relative_eq!(second[&T], 80.0);
}

#[test]
fn test_static_nodes_are_computed_once() {
    let (base, counters) = pipeline();
    let mut processor = StreamProcessor::with_eternal(&base, &[D], &[T], &[X]).unwrap();
    assert_eq!(counters.static_calls.load(Ordering::SeqCst), 1);
    for d in [1.0, 2.0, 3.0, 4.0] {
        processor.accumulate(chunk(&[(D, d)])).unwrap();
    }
    let out = processor.finalize().unwrap();
    assert_relative_eq!(out[&T], 220.0);
    assert_eq!(counters.static_calls.load(Ordering::SeqCst), 1);
    assert_eq!(counters.chunk_calls.load(Ordering::SeqCst), 4);
    // finalizing again does not touch the chunk path
    processor.finalize().unwrap();
    assert_eq!(counters.chunk_calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_rolling_accumulation() {
    let (base, _) = pipeline();
    let mut processor = StreamProcessor::new(
        &base,
        &[D],
        &[T],
        [(X, AccumulatorSpec::Instance(Accumulator::rolling(2)))],
        false,
    )
    .unwrap();
    for d in [1.0, 2.0, 3.0] {
        processor.accumulate(chunk(&[(D, d)])).unwrap();
    }
    assert_relative_eq!(processor.finalize().unwrap()[&T], 120.0);
}

#[test]
fn test_accumulator_factory_reads_base_pipeline() {
    let (base, _) = pipeline();
    let factory = AccumulatorSpec::factory(vec![A], |v: &[&f64]| {
        Ok(Accumulator::rolling(*v[0] as usize))
    });
    let mut processor = StreamProcessor::new(&base, &[D], &[T], [(X, factory)], false).unwrap();
    for d in [1.0, 2.0, 3.0] {
        processor.accumulate(chunk(&[(D, d)])).unwrap();
    }
    // window of A = 2 chunks: 40 + 60
    assert_relative_eq!(processor.finalize().unwrap()[&T], 120.0);
}

#[test]
fn test_unneeded_accumulators_are_dropped() {
    let (base, _) = pipeline();
    let processor = StreamProcessor::with_eternal(&base, &[D], &[T], &[X, UNUSED]).unwrap();
    assert_eq!(processor.accumulators().len(), 1);
    assert_eq!(
        processor.accumulator_dependencies()[&X].iter().collect::<Vec<_>>(),
        vec![&D]
    );
}

#[test]
fn test_non_dynamic_keys_are_rejected() {
    let (base, _) = pipeline();
    let mut processor = StreamProcessor::with_eternal(&base, &[D], &[T], &[X]).unwrap();
    let err = processor.accumulate(chunk(&[(D, 1.0), (A, 3.0)])).unwrap_err();
    assert!(matches!(err, StreamError::NonDynamicKeys(keys) if keys == vec![A]));
}

#[test]
fn test_partial_dependencies_are_rejected() {
    let mut base = Pipeline::new();
    base.insert(X, vec![D, E], |v: &[&f64]| Ok(v[0] + v[1]));
    base.insert(T, vec![X], |v| Ok(*v[0]));
    let mut processor = StreamProcessor::with_eternal(&base, &[D, E], &[T], &[X]).unwrap();
    let err = processor.accumulate(chunk(&[(D, 1.0)])).unwrap_err();
    assert!(
        matches!(err, StreamError::MissingDynamicKeys { accumulator, ref missing } if accumulator == X && *missing == vec![E])
    );
    processor.accumulate(chunk(&[(D, 1.0), (E, 2.0)])).unwrap();
    assert_relative_eq!(processor.finalize().unwrap()[&T], 3.0);
}

#[test]
fn test_chunks_unrelated_to_an_accumulator_leave_it_untouched() {
    const F: Key = Key::new("F");
    const Y: Key = Key::new("Y");
    const SUM: Key = Key::new("Sum");
    let mut base = Pipeline::new();
    base.insert(X, vec![D], |v: &[&f64]| Ok(*v[0]));
    base.insert(Y, vec![F], |v| Ok(*v[0]));
    base.insert(SUM, vec![X, Y], |v| Ok(v[0] + v[1]));
    let mut processor = StreamProcessor::with_eternal(&base, &[D, F], &[SUM], &[X, Y]).unwrap();
    processor.accumulate(chunk(&[(D, 1.0), (F, 10.0)])).unwrap();
    processor.accumulate(chunk(&[(D, 2.0)])).unwrap();
    assert_relative_eq!(processor.finalize().unwrap()[&SUM], 13.0);
}

#[test]
fn test_bypass_forwards_dynamic_values() {
    let (base, _) = pipeline();
    let accumulators = || [(X, AccumulatorSpec::Instance(Accumulator::eternal()))];

    let mut strict = StreamProcessor::new(&base, &[D, E], &[T_E], accumulators(), false).unwrap();
    strict.accumulate(chunk(&[(D, 1.0), (E, 5.0)])).unwrap();
    assert!(matches!(strict.finalize(), Err(StreamError::Unset(key)) if key == E));

    let mut bypass = StreamProcessor::new(&base, &[D, E], &[T_E], accumulators(), true).unwrap();
    bypass.accumulate(chunk(&[(D, 1.0), (E, 5.0)])).unwrap();
    bypass.accumulate(chunk(&[(D, 1.0), (E, 7.0)])).unwrap();
    // accumulated X plus the latest E
    assert_relative_eq!(bypass.finalize().unwrap()[&T_E], 47.0);
}

#[test]
fn test_finalize_before_any_chunk_fails() {
    let (base, _) = pipeline();
    let mut processor = StreamProcessor::with_eternal(&base, &[D], &[T], &[X]).unwrap();
    assert!(matches!(processor.finalize(), Err(StreamError::Unset(key)) if key == D));
    processor.add_chunk(chunk(&[(D, 1.0)])).unwrap();
    processor.clear();
    assert!(processor.finalize().is_err());
}
