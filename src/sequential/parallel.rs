//! Data-parallel helpers for layer-wide loops.
//!
//! Every element is written by exactly one task. Small layers stay on the calling thread,
//! where spawning work on the pool costs more than the arithmetic.

use rayon::prelude::*;

/// Minimum number of elements before a loop is split across the rayon pool.
pub(crate) const PARALLEL_MIN_LEN: usize = 512;

/// Same, for loops whose items are whole examples rather than single numbers.
pub(crate) const PARALLEL_MIN_ITEMS: usize = 8;

/// `out[i] = f(i)` for every index.
pub(crate) fn fill<F>(out: &mut [f64], f: F)
where
    F: Fn(usize) -> f64 + Sync + Send,
{
    if out.len() >= PARALLEL_MIN_LEN {
        out.par_iter_mut().enumerate().for_each(|(i, o)| *o = f(i));
    } else {
        out.iter_mut().enumerate().for_each(|(i, o)| *o = f(i));
    }
}

/// Calls `f(row_index, row)` for every row of a row-major buffer with `cols` columns.
pub(crate) fn for_each_row<F>(data: &mut [f64], cols: usize, f: F)
where
    F: Fn(usize, &mut [f64]) + Sync + Send,
{
    if cols == 0 {
        return;
    }
    if data.len() >= PARALLEL_MIN_LEN {
        data.par_chunks_mut(cols)
            .enumerate()
            .for_each(|(i, row)| f(i, row));
    } else {
        data.chunks_mut(cols).enumerate().for_each(|(i, row)| f(i, row));
    }
}

/// Number of items satisfying `predicate`.
pub(crate) fn count<T, F>(items: &[T], predicate: F) -> usize
where
    T: Sync,
    F: Fn(usize, &T) -> bool + Sync + Send,
{
    if items.len() >= PARALLEL_MIN_ITEMS {
        items
            .par_iter()
            .enumerate()
            .filter(|(i, item)| predicate(*i, *item))
            .count()
    } else {
        items
            .iter()
            .enumerate()
            .filter(|(i, item)| predicate(*i, *item))
            .count()
    }
}
