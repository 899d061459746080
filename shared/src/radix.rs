//! Digit extraction and the work-efficient (Blelloch) block scan used by the radix sort.
//!
//! The count table is laid out `[digit][slice]`, so one exclusive scan over the flattened
//! table yields, for every `(digit, slice)`, the first output position of that slice's keys
//! carrying that digit. Scatter then walks each slice in order, which keeps the sort stable.

use crate::{div_ceil, PathTracerConfig};

/// Elements scanned by one workgroup.
pub const SCAN_BLOCK: usize = PathTracerConfig::SCAN_BLOCK_SIZE as usize;
/// Lanes per scan workgroup; each lane owns two elements.
pub const SCAN_LANES: u32 = PathTracerConfig::SORT_WORKGROUP_SIZE;

/// 4-bit digit of `key` examined by pass `pass`.
pub fn digit(key: u32, pass: u32) -> u32 {
    (key >> (pass * PathTracerConfig::RADIX_BITS)) & (PathTracerConfig::RADIX - 1)
}

/// Flattened index of `(digit, slice)` in the count table.
pub fn count_slot(digit: u32, slice: u32, slices: u32) -> usize {
    (digit * slices + slice) as usize
}

/// Number of W-key slices covering `len` keys.
pub fn slice_count(len: u32) -> u32 {
    div_ceil(len, PathTracerConfig::SORT_WORKGROUP_SIZE)
}

/// Up-sweep work of `lane` at `stride`; lanes that are not multiples of `stride` idle.
pub fn up_sweep_step(pref: &mut [u32; SCAN_BLOCK], lane: u32, stride: u32) {
    if lane & (stride - 1) == 0 {
        let b = (2 * (lane + stride) - 1) as usize;
        let a = (2 * lane + stride - 1) as usize;
        pref[b] = pref[b].wrapping_add(pref[a]);
    }
}

/// Down-sweep work of `lane` at `stride`.
pub fn down_sweep_step(pref: &mut [u32; SCAN_BLOCK], lane: u32, stride: u32) {
    if lane & (stride - 1) == 0 {
        let b = (2 * (lane + stride) - 1) as usize;
        let a = (2 * lane + stride - 1) as usize;
        let t = pref[a];
        pref[a] = pref[b];
        pref[b] = t.wrapping_add(pref[b]);
    }
}

/// Exclusive scan of one block, every lane stepped in turn between the points where the
/// kernel places its workgroup barriers. Returns the block total.
pub fn scan_block(pref: &mut [u32; SCAN_BLOCK]) -> u32 {
    let mut stride = 1;
    while stride <= SCAN_LANES {
        let mut lane = 0;
        while lane < SCAN_LANES {
            up_sweep_step(pref, lane, stride);
            lane += 1;
        }
        stride <<= 1;
    }

    let total = pref[SCAN_BLOCK - 1];
    pref[SCAN_BLOCK - 1] = 0;

    let mut stride = SCAN_LANES;
    while stride > 0 {
        let mut lane = 0;
        while lane < SCAN_LANES {
            down_sweep_step(pref, lane, stride);
            lane += 1;
        }
        stride >>= 1;
    }

    total
}

/// Lengths of the recursive scan levels for a table of `len` entries.
///
/// Level 0 is the table itself; every level longer than one block is followed by the level
/// holding its per-block totals. Depth is `log_{2W}(len)`.
#[derive(Copy, Clone, Debug)]
pub struct ScanLevels {
    next: u32,
    done: bool,
}

impl ScanLevels {
    pub fn new(len: u32) -> Self {
        Self { next: len, done: len == 0 }
    }
}

impl Iterator for ScanLevels {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.done {
            return None;
        }
        let len = self.next;
        if len as usize > SCAN_BLOCK {
            self.next = div_ceil(len, SCAN_BLOCK as u32);
        } else {
            self.done = true;
        }
        Some(len)
    }
}
