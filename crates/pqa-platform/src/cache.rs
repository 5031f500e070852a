// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Cache Write-Back and Store Fences
// ─────────────────────────────────────────────────────────────────────
//! Explicit residency control for bandwidth-bound kernels.
//!
//! Only whole cache lines are flushed. The trailing partial line of a
//! block is never flushed because the next block or a neighbouring
//! worker may still be writing it. The leading partial line is flushed
//! only when the caller says the bytes before the block are its own.

#[cfg(not(target_arch = "x86_64"))]
use std::sync::atomic::{fence, Ordering};

pub const CACHE_LINE_BYTES: usize = 64;

/// Write back and evict the cache lines covering `block`.
///
/// `flush_left` allows flushing the line that straddles the start of the
/// block. Pass `false` for the first block of a subtask's range.
pub fn flush_block<T>(block: &[T], flush_left: bool) {
    let start = block.as_ptr() as usize;
    let end = start + std::mem::size_of_val(block);
    if start == end {
        return;
    }
    let mut line = first_line(start, flush_left);
    while line + CACHE_LINE_BYTES <= end {
        flush_line(line);
        line += CACHE_LINE_BYTES;
    }
}

fn first_line(start: usize, flush_left: bool) -> usize {
    if flush_left {
        start & !(CACHE_LINE_BYTES - 1)
    } else {
        (start + CACHE_LINE_BYTES - 1) & !(CACHE_LINE_BYTES - 1)
    }
}

#[cfg(target_arch = "x86_64")]
fn flush_line(addr: usize) {
    // SAFETY: `addr` is the start of a cache line that overlaps `block`,
    // so it is mapped; clflush neither reads nor writes program data.
    unsafe { std::arch::x86_64::_mm_clflush(addr as *const u8) }
}

#[cfg(not(target_arch = "x86_64"))]
fn flush_line(_addr: usize) {}

/// Order this thread's prior stores, flushes included, before any later
/// ones, so a block is published before the next one or the completion
/// signal.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn store_fence() {
    // SAFETY: sfence only orders stores; SSE is part of the x86_64 baseline.
    unsafe { std::arch::x86_64::_mm_sfence() }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn store_fence() {
    fence(Ordering::Release);
}

/// Number of whole lines `flush_block` would flush.
#[cfg(test)]
fn flushed_lines<T>(block: &[T], flush_left: bool) -> usize {
    let start = block.as_ptr() as usize;
    let end = start + std::mem::size_of_val(block);
    if start == end {
        return 0;
    }
    let first = first_line(start, flush_left);
    if first + CACHE_LINE_BYTES > end {
        0
    } else {
        (end - first) / CACHE_LINE_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(64))]
    struct Aligned([u8; 256]);

    #[test]
    fn test_aligned_block_flushes_whole_lines() {
        let buf = Aligned([0; 256]);
        assert_eq!(flushed_lines(&buf.0[..], false), 4);
        assert_eq!(flushed_lines(&buf.0[..], true), 4);
        flush_block(&buf.0[..], true);
        assert_eq!(buf.0[255], 0);
    }

    #[test]
    fn test_leading_line_only_with_flush_left() {
        let buf = Aligned([7; 256]);
        let block = &buf.0[32..160];
        // [32, 160): line 0 straddles the start, line 2 the end.
        assert_eq!(flushed_lines(block, false), 1);
        assert_eq!(flushed_lines(block, true), 2);
        flush_block(block, false);
        flush_block(block, true);
        assert!(block.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_empty_block() {
        let buf = Aligned([0; 256]);
        assert_eq!(flushed_lines(&buf.0[..0], true), 0);
        flush_block(&buf.0[..0], true);
    }

    #[test]
    fn test_flushed_block_visible_after_fence() {
        let mut buf = Aligned([0; 256]);
        for (i, b) in buf.0.iter_mut().enumerate() {
            *b = i as u8;
        }
        flush_block(&buf.0[..], true);
        store_fence();
        let buf = &buf;
        std::thread::scope(|s| {
            s.spawn(|| {
                assert!(buf.0.iter().enumerate().all(|(i, &b)| b == i as u8));
            });
        });
    }
}
