use crate::{ACQUIRE_RELEASE, DEVICE};
use pathtracer_shared::glam::Vec4;
use pathtracer_shared::trace::{accumulate, trace_pixel, SceneView, TraversalStats};
use pathtracer_shared::{Aabb, BvhNode, CameraUniform, DebugCounters, SceneObject, TraceParams};
use spirv_std::glam::{UVec2, UVec3};
use spirv_std::{spirv, Image};

type OutputImage = Image!(2D, format = rgba8, sampled = false);
type DepthImage = Image!(2D, format = r32f, sampled = false);

struct Targets<'a> {
    cumulative: &'a mut [Vec4],
    output: &'a OutputImage,
    depth: &'a DepthImage,
}

fn shade<const DEBUG: bool>(
    id: UVec3,
    scene: &SceneView<'_>,
    camera: &CameraUniform,
    params: &TraceParams,
    targets: Targets<'_>,
    stats: &mut TraversalStats,
) -> bool {
    let x = id.x;
    let y = id.y;
    if x >= params.width || y >= params.height {
        return false;
    }

    let sample = trace_pixel::<DEBUG>(
        scene,
        camera,
        x,
        y,
        params.width,
        params.height,
        params.frame,
        params.bounces,
        stats,
    );

    let pixel = (y * params.width + x) as usize;
    let (sum, mean) = accumulate(targets.cumulative[pixel], sample.radiance, params.frame);
    targets.cumulative[pixel] = sum;
    unsafe {
        targets.output.write(UVec2::new(x, y), spirv_std::glam::Vec4::from_array(mean.to_array()));
        targets
            .depth
            .write(UVec2::new(x, y), spirv_std::glam::Vec4::new(sample.depth, 0.0, 0.0, 0.0));
    }
    true
}

#[allow(clippy::too_many_arguments)]
#[spirv(compute(threads(16, 16)))]
pub fn path_trace_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] positions: &[f32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] normals: &[f32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 2)] indices: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] triangle_to_object: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] objects: &[SceneObject],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 5)] nodes: &[BvhNode],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 6)] node_bounds: &[Aabb],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 7)] camera: &CameraUniform,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 8)] cumulative: &mut [Vec4],
    #[spirv(descriptor_set = 0, binding = 9)] output: &OutputImage,
    #[spirv(descriptor_set = 0, binding = 10)] depth: &DepthImage,
    #[spirv(push_constant)] params: &TraceParams,
) {
    let scene = SceneView {
        positions,
        normals,
        indices,
        triangle_to_object,
        objects,
        nodes,
        node_bounds,
        node_count: params.node_count,
        triangle_count: params.triangle_count,
    };
    let mut stats = TraversalStats::default();
    shade::<false>(id, &scene, camera, params, Targets { cumulative, output, depth }, &mut stats);
}

/// Same as [`path_trace_cs`], additionally folding per-pixel traversal work into `counters`.
#[allow(clippy::too_many_arguments)]
#[spirv(compute(threads(16, 16)))]
pub fn path_trace_debug_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] positions: &[f32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] normals: &[f32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 2)] indices: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] triangle_to_object: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] objects: &[SceneObject],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 5)] nodes: &[BvhNode],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 6)] node_bounds: &[Aabb],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 7)] camera: &CameraUniform,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 8)] cumulative: &mut [Vec4],
    #[spirv(descriptor_set = 0, binding = 9)] output: &OutputImage,
    #[spirv(descriptor_set = 0, binding = 10)] depth: &DepthImage,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 11)] counters: &mut [u32],
    #[spirv(push_constant)] params: &TraceParams,
) {
    let scene = SceneView {
        positions,
        normals,
        indices,
        triangle_to_object,
        objects,
        nodes,
        node_bounds,
        node_count: params.node_count,
        triangle_count: params.triangle_count,
    };
    let mut stats = TraversalStats::default();
    if !shade::<true>(id, &scene, camera, params, Targets { cumulative, output, depth }, &mut stats) {
        return;
    }

    unsafe {
        spirv_std::arch::atomic_u_max::<u32, DEVICE, ACQUIRE_RELEASE>(
            &mut counters[DebugCounters::MAX_CHECKS],
            stats.checks,
        );
        spirv_std::arch::atomic_i_add::<u32, DEVICE, ACQUIRE_RELEASE>(
            &mut counters[DebugCounters::TOTAL_CHECKS],
            stats.checks,
        );
        spirv_std::arch::atomic_u_max::<u32, DEVICE, ACQUIRE_RELEASE>(
            &mut counters[DebugCounters::MAX_STACK_DEPTH],
            stats.max_stack_depth,
        );
    }
}
