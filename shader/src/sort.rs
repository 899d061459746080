//! 4-bit LSD radix sort: count, recursive exclusive scan, stable scatter.

use crate::{barrier, ACQUIRE_RELEASE, DEVICE};
use pathtracer_shared::radix::{count_slot, digit, down_sweep_step, up_sweep_step, SCAN_BLOCK, SCAN_LANES};
use pathtracer_shared::{PathTracerConfig, ScanParams, SortParams};
use spirv_std::glam::UVec3;
use spirv_std::spirv;

/// Histogram of the current digit per W-key slice, one workgroup per slice.
#[spirv(compute(threads(128)))]
pub fn radix_count_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(workgroup_id)] workgroup: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] keys: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] counts: &mut [u32],
    #[spirv(push_constant)] params: &SortParams,
) {
    let i = id.x;
    if i >= params.len {
        return;
    }
    let d = digit(keys[i as usize], params.pass_index);
    let slot = count_slot(d, workgroup.x, params.slices);
    unsafe {
        spirv_std::arch::atomic_i_add::<u32, DEVICE, ACQUIRE_RELEASE>(&mut counts[slot], 1);
    }
}

/// Work-efficient exclusive scan of one 2W block in place. With `write_sums` set, the block
/// total goes to `sums[block]` for the next level.
#[spirv(compute(threads(128)))]
pub fn radix_scan_cs(
    #[spirv(local_invocation_id)] local: UVec3,
    #[spirv(workgroup_id)] workgroup: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] data: &mut [u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] sums: &mut [u32],
    #[spirv(workgroup)] pref: &mut [u32; SCAN_BLOCK],
    #[spirv(push_constant)] params: &ScanParams,
) {
    let lane = local.x;
    let base = workgroup.x * SCAN_BLOCK as u32;
    let even = base + 2 * lane;
    let odd = even + 1;

    pref[(2 * lane) as usize] = if even < params.len { data[even as usize] } else { 0 };
    pref[(2 * lane + 1) as usize] = if odd < params.len { data[odd as usize] } else { 0 };

    let mut stride = 1;
    while stride <= SCAN_LANES {
        barrier();
        up_sweep_step(pref, lane, stride);
        stride <<= 1;
    }
    barrier();

    if lane == 0 {
        if params.write_sums != 0 {
            sums[workgroup.x as usize] = pref[SCAN_BLOCK - 1];
        }
        pref[SCAN_BLOCK - 1] = 0;
    }

    let mut stride = SCAN_LANES;
    while stride > 0 {
        barrier();
        down_sweep_step(pref, lane, stride);
        stride >>= 1;
    }
    barrier();

    if even < params.len {
        data[even as usize] = pref[(2 * lane) as usize];
    }
    if odd < params.len {
        data[odd as usize] = pref[(2 * lane + 1) as usize];
    }
}

/// Adds the scanned total of every preceding block; dispatched with one workgroup per block
/// after the first.
#[spirv(compute(threads(128)))]
pub fn radix_add_sums_cs(
    #[spirv(local_invocation_id)] local: UVec3,
    #[spirv(workgroup_id)] workgroup: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] data: &mut [u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] sums: &[u32],
    #[spirv(push_constant)] params: &ScanParams,
) {
    let block = workgroup.x + 1;
    let offset = sums[block as usize];
    let even = block * SCAN_BLOCK as u32 + 2 * local.x;
    let odd = even + 1;
    if even < params.len {
        data[even as usize] += offset;
    }
    if odd < params.len {
        data[odd as usize] += offset;
    }
}

/// One thread per slice moves its keys, in input order, to the scanned digit offsets. The
/// consumed counts are zeroed for the next pass. Pass 0 has no id input and emits `i`.
#[spirv(compute(threads(128)))]
pub fn radix_scatter_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] keys_in: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] ids_in: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 2)] keys_out: &mut [u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] ids_out: &mut [u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] counts: &mut [u32],
    #[spirv(push_constant)] params: &SortParams,
) {
    let slice = id.x;
    if slice >= params.slices {
        return;
    }

    let mut offsets = [0u32; PathTracerConfig::RADIX as usize];
    let mut d = 0;
    while d < PathTracerConfig::RADIX {
        let slot = count_slot(d, slice, params.slices);
        offsets[d as usize] = counts[slot];
        counts[slot] = 0;
        d += 1;
    }

    let start = slice * PathTracerConfig::SORT_WORKGROUP_SIZE;
    let end = params.len.min(start + PathTracerConfig::SORT_WORKGROUP_SIZE);
    let mut i = start;
    while i < end {
        let key = keys_in[i as usize];
        let d = digit(key, params.pass_index) as usize;
        let position = offsets[d] as usize;
        keys_out[position] = key;
        ids_out[position] = if params.pass_index == 0 { i } else { ids_in[i as usize] };
        offsets[d] += 1;
        i += 1;
    }
}
