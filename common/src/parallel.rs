//! Row-band helpers for splitting image work across rayon threads.

/// Multiplier for number of bands relative to worker threads.
/// Bands finish at different speeds, so a few extra keep threads busy.
const BANDS_PER_THREAD: usize = 2;

/// Rows per band for `height` rows on `threads` workers, rounded up to a
/// multiple of `align` (at least `align`).
///
/// `threads == 0` means rayon's current thread count.
pub fn rows_per_band(height: usize, threads: usize, align: usize) -> usize {
    assert!(align > 0, "align must be > 0");
    let threads = if threads == 0 {
        rayon::current_num_threads()
    } else {
        threads
    };
    let bands = (threads * BANDS_PER_THREAD).max(1);
    let rows = height.div_ceil(bands).max(1);
    rows.div_ceil(align) * align
}
