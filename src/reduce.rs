//! Scene bounds by a multi-level block reduction over vertex positions.

use log::debug;
use pathtracer_shared::reduce::ReductionLevels;
use pathtracer_shared::{Aabb, PathTracerConfig, ReduceParams};

use crate::buffers::StorageBuffer;
use crate::compute::{workgroups, Binding, ComputeKernel};

struct Level {
    params: ReduceParams,
    bind_group: wgpu::BindGroup,
}

/// Encodes the reduction levels and leaves the scene box in [`SceneBounds::output`].
///
/// Levels alternate between two scratch buffers; the final one-element level is copied
/// into a dedicated buffer so later passes bind a stable resource.
pub struct SceneBounds {
    points_kernel: ComputeKernel,
    bounds_kernel: ComputeKernel,
    block_size: u32,
    ping: StorageBuffer<Aabb>,
    pong: StorageBuffer<Aabb>,
    levels: Vec<Level>,
    output: StorageBuffer<Aabb>,
}

impl SceneBounds {
    pub fn new(device: &wgpu::Device, module: &wgpu::ShaderModule, block_size: u32) -> Self {
        let points_kernel =
            ComputeKernel::new::<ReduceParams>(device, module, "reduce_points_cs", &[Binding::READ, Binding::WRITE]);
        let bounds_kernel =
            ComputeKernel::new::<ReduceParams>(device, module, "reduce_bounds_cs", &[Binding::READ, Binding::WRITE]);

        Self {
            points_kernel,
            bounds_kernel,
            block_size: block_size.max(2),
            ping: StorageBuffer::new(device, "Reduce Ping Buffer", 1),
            pong: StorageBuffer::new(device, "Reduce Pong Buffer", 1),
            levels: Vec::new(),
            output: StorageBuffer::from_slice(device, "Scene Bounds Buffer", &[Aabb::EMPTY]),
        }
    }

    /// Rebuilds the level plan for `point_count` vertices in `positions`.
    pub fn prepare(&mut self, device: &wgpu::Device, positions: &StorageBuffer<f32>, point_count: u32) {
        let plan = level_plan(point_count, self.block_size);
        debug!("Reduction of {} points in {} levels", point_count, plan.len());

        self.ping.ensure_capacity(device, plan.first().map_or(1, |p| p.output_len) as usize);
        self.pong.ensure_capacity(device, plan.get(1).map_or(1, |p| p.output_len) as usize);

        self.levels.clear();
        for (level, params) in plan.into_iter().enumerate() {
            let bind_group = if level == 0 {
                self.points_kernel.bind_group(device, &[positions.binding(), self.ping.binding()])
            } else if level % 2 == 1 {
                self.bounds_kernel.bind_group(device, &[self.ping.binding(), self.pong.binding()])
            } else {
                self.bounds_kernel.bind_group(device, &[self.pong.binding(), self.ping.binding()])
            };
            self.levels.push(Level { params, bind_group });
        }
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        if self.levels.is_empty() {
            return;
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Scene Bounds Pass"),
            });
            for (level, step) in self.levels.iter().enumerate() {
                let kernel = if level == 0 { &self.points_kernel } else { &self.bounds_kernel };
                let groups = workgroups(step.params.output_len, PathTracerConfig::REDUCE_WORKGROUP_SIZE);
                kernel.dispatch(&mut pass, &step.bind_group, &step.params, groups);
            }
        }

        let last = if self.levels.len() % 2 == 1 { &self.ping } else { &self.pong };
        let size = std::mem::size_of::<Aabb>() as u64;
        encoder.copy_buffer_to_buffer(last.buffer(), 0, self.output.buffer(), 0, size);
    }

    pub fn output(&self) -> &StorageBuffer<Aabb> {
        &self.output
    }
}

/// Host rendition of the same level plan, used by the CPU backend and the tests.
pub fn level_plan(point_count: u32, block_size: u32) -> Vec<ReduceParams> {
    let mut input_len = point_count;
    ReductionLevels::new(point_count, block_size)
        .map(|output_len| {
            let params = ReduceParams {
                input_len,
                output_len,
                block_size: block_size.max(2),
                _padding: 0,
            };
            input_len = output_len;
            params
        })
        .collect()
}
