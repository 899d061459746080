//! Block-wise bounding box reduction.
//!
//! One thread folds `block_size` consecutive inputs sequentially; the host repeats the pass
//! on the partial boxes until a single box remains.

use crate::{div_ceil, Aabb};
use glam::{vec3, Vec3};

/// Read point `index` from a tightly packed `xyz` float array.
pub fn load_point(positions: &[f32], index: u32) -> Vec3 {
    let base = 3 * index as usize;
    vec3(positions[base], positions[base + 1], positions[base + 2])
}

/// Bounds of points `[block * block_size, (block + 1) * block_size)`, clamped to `point_count`.
pub fn reduce_points_block(positions: &[f32], point_count: u32, block: u32, block_size: u32) -> Aabb {
    let start = block * block_size;
    let end = point_count.min(start + block_size);

    let first = load_point(positions, start);
    let mut lo = first;
    let mut hi = first;
    let mut i = start + 1;
    while i < end {
        let p = load_point(positions, i);
        lo = lo.min(p);
        hi = hi.max(p);
        i += 1;
    }

    Aabb::from_vecs(lo, hi)
}

/// Union of boxes `[block * block_size, (block + 1) * block_size)`, clamped to `len`.
pub fn reduce_bounds_block(bounds: &[Aabb], len: u32, block: u32, block_size: u32) -> Aabb {
    let start = block * block_size;
    let end = len.min(start + block_size);

    let mut acc = bounds[start as usize];
    let mut i = start + 1;
    while i < end {
        acc = acc.union(&bounds[i as usize]);
        i += 1;
    }

    acc
}

/// Output lengths of the successive reduction passes over `len` inputs.
///
/// Yields `ceil(len / block)`, then keeps dividing until a pass produces exactly one box.
/// An empty input yields nothing.
#[derive(Copy, Clone, Debug)]
pub struct ReductionLevels {
    remaining: u32,
    block_size: u32,
    done: bool,
}

impl ReductionLevels {
    pub fn new(len: u32, block_size: u32) -> Self {
        Self {
            remaining: len,
            block_size: if block_size < 2 { 2 } else { block_size },
            done: len == 0,
        }
    }
}

impl Iterator for ReductionLevels {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.done {
            return None;
        }
        let out = div_ceil(self.remaining, self.block_size);
        self.remaining = out;
        self.done = out <= 1;
        Some(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reduction_levels() {
        assert_eq!(ReductionLevels::new(0, 128).count(), 0);
        assert_eq!(ReductionLevels::new(1, 128).collect::<Vec<_>>(), vec![1]);
        assert_eq!(ReductionLevels::new(128, 128).collect::<Vec<_>>(), vec![1]);
        assert_eq!(ReductionLevels::new(129, 128).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(
            ReductionLevels::new(100_000, 16).collect::<Vec<_>>(),
            vec![6250, 391, 25, 2, 1]
        );
    }

    #[test]
    fn test_reduce_points_block_clamps_tail() {
        let positions = [0.0, 0.0, 0.0, 5.0, -1.0, 2.0, -3.0, 4.0, 1.0];
        let full = reduce_points_block(&positions, 3, 0, 128);
        assert_eq!(full.min, [-3.0, -1.0, 0.0]);
        assert_eq!(full.max, [5.0, 4.0, 2.0]);

        let tail = reduce_points_block(&positions, 3, 1, 2);
        assert_eq!(tail.min, [-3.0, 4.0, 1.0]);
        assert_eq!(tail.max, [-3.0, 4.0, 1.0]);
    }

    #[test]
    fn test_reduce_bounds_block() {
        let boxes = [
            Aabb::new([0.0; 3], [1.0; 3]),
            Aabb::new([-1.0, 0.5, 0.5], [0.5, 3.0, 0.5]),
            Aabb::new([9.0; 3], [10.0; 3]),
        ];
        let merged = reduce_bounds_block(&boxes, 3, 0, 2);
        assert_eq!(merged.min, [-1.0, 0.0, 0.0]);
        assert_eq!(merged.max, [1.0, 3.0, 1.0]);
        assert_eq!(reduce_bounds_block(&boxes, 3, 1, 2), boxes[2]);
    }
}
