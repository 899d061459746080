use pathtracer_shared::reduce::{reduce_bounds_block, reduce_points_block};
use pathtracer_shared::{Aabb, ReduceParams};
use spirv_std::glam::UVec3;
use spirv_std::spirv;

/// First level: fold raw vertex positions into one box per block.
#[spirv(compute(threads(64)))]
pub fn reduce_points_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] positions: &[f32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] output: &mut [Aabb],
    #[spirv(push_constant)] params: &ReduceParams,
) {
    let block = id.x;
    if block >= params.output_len {
        return;
    }
    output[block as usize] = reduce_points_block(positions, params.input_len, block, params.block_size);
}

/// Later levels: fold the previous level's boxes.
#[spirv(compute(threads(64)))]
pub fn reduce_bounds_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] input: &[Aabb],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] output: &mut [Aabb],
    #[spirv(push_constant)] params: &ReduceParams,
) {
    let block = id.x;
    if block >= params.output_len {
        return;
    }
    output[block as usize] = reduce_bounds_block(input, params.input_len, block, params.block_size);
}
