//! Binary radix tree construction over sorted Morton codes (Karras 2012).
//!
//! Every internal node is built independently from the sorted key array. Duplicate codes
//! are made distinct by extending each key with its sorted index, so equal-code runs split
//! on index bits and `determine_range`/`find_split` always agree on the tree shape.

use crate::reduce::load_point;
use crate::{Aabb, BvhNode};

/// Count of leading zero bits. `leading_zeros` is not available to every shader backend.
pub fn leading_zeros(x: u32) -> u32 {
    if x == 0 {
        return 32;
    }
    let mut n = 0;
    let mut v = x;
    if v & 0xFFFF_0000 == 0 {
        n += 16;
        v <<= 16;
    }
    if v & 0xFF00_0000 == 0 {
        n += 8;
        v <<= 8;
    }
    if v & 0xF000_0000 == 0 {
        n += 4;
        v <<= 4;
    }
    if v & 0xC000_0000 == 0 {
        n += 2;
        v <<= 2;
    }
    if v & 0x8000_0000 == 0 {
        n += 1;
    }
    n
}

/// Common prefix length of keys `i` and `j`, or `-1` when `j` falls outside `[0, len)`.
pub fn delta(codes: &[u32], len: u32, i: i32, j: i32) -> i32 {
    if j < 0 || j >= len as i32 {
        return -1;
    }
    let ci = codes[i as usize];
    let cj = codes[j as usize];
    if ci == cj {
        32 + leading_zeros(i as u32 ^ j as u32) as i32
    } else {
        leading_zeros(ci ^ cj) as i32
    }
}

/// Leaf range `[first, last]` covered by internal node `node`.
pub fn determine_range(codes: &[u32], len: u32, node: u32) -> (u32, u32) {
    if node == 0 {
        return (0, len - 1);
    }

    let i = node as i32;
    let dir = if delta(codes, len, i, i + 1) - delta(codes, len, i, i - 1) >= 0 {
        1
    } else {
        -1
    };

    // the other end shares strictly more prefix with i than the neighbour behind it
    let delta_min = delta(codes, len, i, i - dir);
    let mut max_len = 2;
    while delta(codes, len, i, i + max_len * dir) > delta_min {
        max_len *= 2;
    }

    let mut extent = 0;
    let mut step = max_len / 2;
    while step >= 1 {
        if delta(codes, len, i, i + (extent + step) * dir) > delta_min {
            extent += step;
        }
        step /= 2;
    }

    let j = i + extent * dir;
    if i < j {
        (i as u32, j as u32)
    } else {
        (j as u32, i as u32)
    }
}

/// Last index of the left half of `[first, last]`: the highest position still sharing more
/// than the range-wide prefix with `first`.
pub fn find_split(codes: &[u32], len: u32, first: u32, last: u32) -> u32 {
    let first = first as i32;
    let last = last as i32;
    let common = delta(codes, len, first, last);

    let mut split = first;
    let mut step = last - first;
    loop {
        step = (step + 1) >> 1;
        let candidate = split + step;
        if candidate < last && delta(codes, len, first, candidate) > common {
            split = candidate;
        }
        if step <= 1 {
            break;
        }
    }

    split as u32
}

/// Child links of internal node `node`. `parent` is left at [`BvhNode::NO_PARENT`]; the
/// parent pointer of each internal child is the caller's to write.
pub fn build_node(codes: &[u32], sorted_ids: &[u32], len: u32, node: u32) -> BvhNode {
    let (first, last) = determine_range(codes, len, node);
    let split = find_split(codes, len, first, last);

    let left_is_leaf = first == split;
    let right_is_leaf = last == split + 1;

    BvhNode {
        left_is_leaf: left_is_leaf as u32,
        right_is_leaf: right_is_leaf as u32,
        left: if left_is_leaf { sorted_ids[split as usize] } else { split },
        right: if right_is_leaf {
            sorted_ids[split as usize + 1]
        } else {
            split + 1
        },
        parent: BvhNode::NO_PARENT,
    }
}

/// Bounds of triangle `triangle`.
pub fn leaf_bounds(positions: &[f32], indices: &[u32], triangle: u32) -> Aabb {
    let base = 3 * triangle as usize;
    Aabb::from_triangle(
        load_point(positions, indices[base]),
        load_point(positions, indices[base + 1]),
        load_point(positions, indices[base + 2]),
    )
}

/// Bounds of one child slot: the triangle box for a leaf, the stored box otherwise.
pub fn child_bounds(is_leaf: bool, child: u32, node_bounds: &[Aabb], positions: &[f32], indices: &[u32]) -> Aabb {
    if is_leaf {
        leaf_bounds(positions, indices, child)
    } else {
        node_bounds[child as usize]
    }
}

/// Union of both child slots of `node`.
pub fn node_bounds(node: &BvhNode, bounds: &[Aabb], positions: &[f32], indices: &[u32]) -> Aabb {
    child_bounds(node.left_leaf(), node.left, bounds, positions, indices).union(&child_bounds(
        node.right_leaf(),
        node.right,
        bounds,
        positions,
        indices,
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    fn build_all(codes: &[u32]) -> Vec<BvhNode> {
        let ids: Vec<u32> = (0..codes.len() as u32).collect();
        let leaves = codes.len() as u32;
        let mut nodes: Vec<BvhNode> = (0..leaves - 1)
            .map(|i| build_node(codes, &ids, leaves, i))
            .collect();
        for i in 0..nodes.len() {
            let node = nodes[i];
            if !node.left_leaf() {
                nodes[node.left as usize].parent = i as u32;
            }
            if !node.right_leaf() {
                nodes[node.right as usize].parent = i as u32;
            }
        }
        nodes
    }

    fn assert_well_formed(nodes: &[BvhNode], leaves: usize) {
        assert_eq!(nodes.len(), leaves - 1);
        let mut leaf_seen = vec![0; leaves];
        let mut internal_seen = vec![0; nodes.len()];
        for node in nodes {
            for (is_leaf, child) in [(node.left_leaf(), node.left), (node.right_leaf(), node.right)] {
                if is_leaf {
                    leaf_seen[child as usize] += 1;
                } else {
                    internal_seen[child as usize] += 1;
                }
            }
        }
        assert!(leaf_seen.iter().all(|&c| c == 1), "leaves {:?}", leaf_seen);
        assert_eq!(internal_seen[0], 0);
        assert!(internal_seen[1..].iter().all(|&c| c == 1), "internal {:?}", internal_seen);
        assert_eq!(nodes[0].parent, BvhNode::NO_PARENT);
    }

    #[test]
    fn test_leading_zeros_matches_core() {
        for x in [0u32, 1, 2, 3, 0x80, 0xFFFF, 0x1_0000, 0x00F0_0000, 0x4000_0000, u32::MAX] {
            assert_eq!(leading_zeros(x), x.leading_zeros(), "x = {:#x}", x);
        }
        for shift in 0..32 {
            assert_eq!(leading_zeros(1 << shift), 31 - shift);
        }
    }

    #[test]
    fn test_delta_out_of_range_and_duplicates() {
        let codes = [3, 3, 8];
        assert_eq!(delta(&codes, 3, 0, -1), -1);
        assert_eq!(delta(&codes, 3, 2, 3), -1);
        // equal codes fall through to the index bits
        assert_eq!(delta(&codes, 3, 0, 1), 32 + 31);
        assert_eq!(delta(&codes, 3, 1, 2), leading_zeros(3 ^ 8) as i32);
    }

    #[test]
    fn test_karras_reference_tree() {
        let codes = [0b00001, 0b00010, 0b00100, 0b00101, 0b10011, 0b11000, 0b11001, 0b11110];
        let nodes = build_all(&codes);
        assert_well_formed(&nodes, codes.len());

        assert_eq!(determine_range(&codes, 8, 3), (0, 3));
        assert_eq!(find_split(&codes, 8, 0, 7), 3);

        let link = |n: &BvhNode| (n.left_leaf(), n.left, n.right_leaf(), n.right);
        assert_eq!(link(&nodes[0]), (false, 3, false, 4));
        assert_eq!(link(&nodes[3]), (false, 1, false, 2));
        assert_eq!(link(&nodes[1]), (true, 0, true, 1));
        assert_eq!(link(&nodes[2]), (true, 2, true, 3));
        assert_eq!(link(&nodes[4]), (true, 4, false, 5));
        assert_eq!(link(&nodes[5]), (false, 6, true, 7));
        assert_eq!(link(&nodes[6]), (true, 5, true, 6));
        assert_eq!(nodes[6].parent, 5);
        assert_eq!(nodes[5].parent, 4);
    }

    #[test]
    fn test_leaf_slots_hold_original_ids() {
        let codes = [1, 9];
        let sorted_ids = [41, 7];
        let root = build_node(&codes, &sorted_ids, 2, 0);
        assert!(root.is_leaf_parent());
        assert_eq!((root.left, root.right), (41, 7));
    }

    #[test]
    fn test_all_duplicate_codes() {
        for leaves in 2..=70 {
            let codes = vec![0x1234_5678; leaves];
            assert_well_formed(&build_all(&codes), leaves);
        }
    }

    #[test]
    fn test_duplicate_plateaus_between_distinct_codes() {
        let codes = [0, 0, 0, 5, 5, 9, 9, 9, 9, 9, 12, 40, 40, 40, 41];
        assert_well_formed(&build_all(&codes), codes.len());

        let mut mixed = Vec::new();
        for i in 0..200u32 {
            mixed.push((i / 7) * 3);
        }
        assert_well_formed(&build_all(&mixed), mixed.len());
    }

    #[test]
    fn test_node_bounds_mixes_leaf_and_internal() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 5.0, 5.0, 5.0];
        let indices = [0, 1, 2, 1, 2, 3];
        let stored = [Aabb::EMPTY, Aabb::new([-2.0; 3], [-1.0; 3])];
        let node = BvhNode {
            left_is_leaf: 0,
            right_is_leaf: 1,
            left: 1,
            right: 1,
            parent: BvhNode::NO_PARENT,
        };
        let merged = node_bounds(&node, &stored, &positions, &indices);
        assert_eq!(merged.min, [-2.0; 3]);
        assert_eq!(merged.max, [5.0; 3]);
        assert_eq!(leaf_bounds(&positions, &indices, 0), Aabb::new([0.0; 3], [1.0, 1.0, 0.0]));
    }

    #[test]
    fn test_two_leaves() {
        let nodes = build_all(&[7, 7]);
        assert_well_formed(&nodes, 2);
        assert!(nodes[0].is_leaf_parent());
    }
}
