use crate::{ACQUIRE_RELEASE, DEVICE};
use pathtracer_shared::glam::Vec4;
use pathtracer_shared::karras::{build_node, node_bounds};
use pathtracer_shared::lines::{box_lines, node_level, LINE_VERTICES};
use pathtracer_shared::morton::triangle_morton_code;
use pathtracer_shared::{Aabb, BuildParams, BvhNode, MortonParams};
use spirv_std::glam::UVec3;
use spirv_std::spirv;

#[spirv(compute(threads(128)))]
pub fn morton_codes_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] positions: &[f32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] indices: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 2)] scene_bounds: &[Aabb],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] codes: &mut [u32],
    #[spirv(push_constant)] params: &MortonParams,
) {
    let triangle = id.x;
    if triangle >= params.triangle_count {
        return;
    }
    codes[triangle as usize] = triangle_morton_code(positions, indices, &scene_bounds[0], triangle);
}

/// One thread per internal node. Each thread writes its own child links and the parent
/// field of its internal children, never a whole record another thread also touches.
#[spirv(compute(threads(64)))]
pub fn build_nodes_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] codes: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] sorted_ids: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 2)] nodes: &mut [BvhNode],
    #[spirv(push_constant)] params: &BuildParams,
) {
    let index = id.x;
    if index >= params.node_count() {
        return;
    }

    let built = build_node(codes, sorted_ids, params.leaf_count, index);
    let node = &mut nodes[index as usize];
    node.left_is_leaf = built.left_is_leaf;
    node.right_is_leaf = built.right_is_leaf;
    node.left = built.left;
    node.right = built.right;

    if index == 0 {
        nodes[0].parent = BvhNode::NO_PARENT;
    }
    if !built.left_leaf() {
        nodes[built.left as usize].parent = index;
    }
    if !built.right_leaf() {
        nodes[built.right as usize].parent = index;
    }
}

/// Bottom-up bounds. Walks start at nodes whose children are both leaves; at a node with
/// two internal children the first arriving walk stops and the second merges both boxes.
#[spirv(compute(threads(64)))]
pub fn refit_bounds_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] positions: &[f32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] indices: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 2)] nodes: &[BvhNode],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] bounds: &mut [Aabb],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] arrivals: &mut [u32],
    #[spirv(push_constant)] params: &BuildParams,
) {
    let index = id.x;
    if index >= params.node_count() {
        return;
    }
    let node = nodes[index as usize];
    if !node.is_leaf_parent() {
        return;
    }

    bounds[index as usize] = node_bounds(&node, bounds, positions, indices);

    let mut current = index;
    while current != 0 {
        let parent = nodes[current as usize].parent;
        let parent_node = nodes[parent as usize];

        if !parent_node.left_leaf() && !parent_node.right_leaf() {
            let previous =
                unsafe { spirv_std::arch::atomic_i_add::<u32, DEVICE, ACQUIRE_RELEASE>(&mut arrivals[parent as usize], 1) };
            if previous == 0 {
                return;
            }
        }

        bounds[parent as usize] = node_bounds(&parent_node, bounds, positions, indices);
        current = parent;
    }
}

/// Debug: 24 line-list vertices and the tree depth of every internal node.
#[spirv(compute(threads(64)))]
pub fn bvh_lines_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] nodes: &[BvhNode],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] bounds: &[Aabb],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 2)] vertices: &mut [Vec4],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] levels: &mut [u32],
    #[spirv(push_constant)] params: &BuildParams,
) {
    let index = id.x;
    if index >= params.node_count() {
        return;
    }

    let level = node_level(nodes, index);
    let lines = box_lines(&bounds[index as usize]);
    let base = LINE_VERTICES * index as usize;
    let mut k = 0;
    while k < LINE_VERTICES {
        vertices[base + k] = lines[k];
        levels[base + k] = level;
        k += 1;
    }
}
