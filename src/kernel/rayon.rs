//! Rayon-parallel sample accumulation (feature-gated).
//!
//! Workers only read the shared image data and each chunk writes to its own
//! accumulator; the partial accumulators are reduced after all chunks finish.

use super::{Accumulator, SAMPLE_CHUNK};
use rayon::prelude::*;

/// Chunk-parallel accumulation on the global rayon pool.
pub fn accumulate_par<T, A, I, F>(items: &[T], init: I, f: F) -> A
where
    T: Sync,
    A: Accumulator,
    I: Fn() -> A + Sync + Send,
    F: Fn(&mut A, &T) + Sync + Send,
{
    items
        .par_chunks(SAMPLE_CHUNK)
        .map(|chunk| {
            let mut partial = init();
            for item in chunk {
                f(&mut partial, item);
            }
            partial
        })
        .reduce(&init, |mut a, b| {
            a.merge(b);
            a
        })
}

/// Sets the size of the global worker pool.
///
/// Fails if the pool was already initialized by an earlier call.
pub fn configure_threads(threads: usize) -> Result<(), String> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|err| err.to_string())
}
