//! GPU LBVH construction: scene bounds, Morton codes, radix sort, Karras build and refit.

use log::{debug, info};
use pathtracer_shared::glam::Vec4;
use pathtracer_shared::{Aabb, BuildParams, BvhNode, MortonParams, PathTracerConfig};

use crate::buffers::StorageBuffer;
use crate::compute::{workgroups, Binding, ComputeKernel};
use crate::reduce::SceneBounds;
use crate::scene::SceneBuffers;
use crate::sort::RadixSorter;

struct BuildGroups {
    morton: wgpu::BindGroup,
    build: wgpu::BindGroup,
    refit: wgpu::BindGroup,
    lines: Option<wgpu::BindGroup>,
}

/// Owns every buffer of the build and records the whole chain into one encoder.
///
/// `nodes` and `node_bounds` hold `triangle_count - 1` internal nodes after
/// [`LbvhBuilder::encode`]; scenes with fewer than two triangles have none.
pub struct LbvhBuilder {
    scene_bounds: SceneBounds,
    sorter: RadixSorter,
    morton_kernel: ComputeKernel,
    build_kernel: ComputeKernel,
    refit_kernel: ComputeKernel,
    lines_kernel: Option<ComputeKernel>,
    pub nodes: StorageBuffer<BvhNode>,
    pub node_bounds: StorageBuffer<Aabb>,
    arrivals: StorageBuffer<u32>,
    line_vertices: StorageBuffer<Vec4>,
    line_levels: StorageBuffer<u32>,
    groups: Option<BuildGroups>,
    triangle_count: u32,
}

impl LbvhBuilder {
    /// The line buffers double as vertex buffers of the overlay pass.
    const LINE_USAGE: wgpu::BufferUsages = StorageBuffer::<u32>::DEFAULT_USAGE.union(wgpu::BufferUsages::VERTEX);

    pub fn new(device: &wgpu::Device, module: &wgpu::ShaderModule, reduce_block_size: u32, debug: bool) -> Self {
        let morton_kernel = ComputeKernel::new::<MortonParams>(
            device,
            module,
            "morton_codes_cs",
            &[Binding::READ, Binding::READ, Binding::READ, Binding::WRITE],
        );
        let build_kernel = ComputeKernel::new::<BuildParams>(
            device,
            module,
            "build_nodes_cs",
            &[Binding::READ, Binding::READ, Binding::WRITE],
        );
        let refit_kernel = ComputeKernel::new::<BuildParams>(
            device,
            module,
            "refit_bounds_cs",
            &[Binding::READ, Binding::READ, Binding::READ, Binding::WRITE, Binding::WRITE],
        );
        let lines_kernel = debug.then(|| {
            ComputeKernel::new::<BuildParams>(
                device,
                module,
                "bvh_lines_cs",
                &[Binding::READ, Binding::READ, Binding::WRITE, Binding::WRITE],
            )
        });

        Self {
            scene_bounds: SceneBounds::new(device, module, reduce_block_size),
            sorter: RadixSorter::new(device, module),
            morton_kernel,
            build_kernel,
            refit_kernel,
            lines_kernel,
            nodes: StorageBuffer::new(device, "BVH Nodes Buffer", 1),
            node_bounds: StorageBuffer::new(device, "BVH Node Bounds Buffer", 1),
            arrivals: StorageBuffer::new(device, "BVH Refit Arrivals Buffer", 1),
            line_vertices: StorageBuffer::with_usage(device, "BVH Line Vertices Buffer", 1, Self::LINE_USAGE),
            line_levels: StorageBuffer::with_usage(device, "BVH Line Levels Buffer", 1, Self::LINE_USAGE),
            groups: None,
            triangle_count: 0,
        }
    }

    fn build_params(&self) -> BuildParams {
        BuildParams {
            leaf_count: self.triangle_count,
            _padding: [0; 3],
        }
    }

    pub fn node_count(&self) -> u32 {
        self.build_params().node_count()
    }

    /// Sizes every buffer for `scene` and rebuilds the bind groups.
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &SceneBuffers) {
        self.triangle_count = scene.triangle_count;
        let node_count = self.node_count() as usize;

        self.scene_bounds.prepare(device, &scene.positions, scene.vertex_count);
        self.sorter.prepare(device, queue, scene.triangle_count);
        self.nodes.ensure_capacity(device, node_count);
        self.node_bounds.ensure_capacity(device, node_count);
        self.arrivals.ensure_capacity(device, node_count);

        let line_count = node_count * PathTracerConfig::LINE_VERTICES_PER_NODE as usize;
        if self.lines_kernel.is_some() {
            self.line_vertices.ensure_capacity(device, line_count);
            self.line_levels.ensure_capacity(device, line_count);
        }

        let morton = self.morton_kernel.bind_group(
            device,
            &[
                scene.positions.binding(),
                scene.indices.binding(),
                self.scene_bounds.output().binding(),
                self.sorter.keys_a.binding(),
            ],
        );
        let build = self.build_kernel.bind_group(
            device,
            &[
                self.sorter.keys_a.binding(),
                self.sorter.ids_a.binding(),
                self.nodes.binding(),
            ],
        );
        let refit = self.refit_kernel.bind_group(
            device,
            &[
                scene.positions.binding(),
                scene.indices.binding(),
                self.nodes.binding(),
                self.node_bounds.binding(),
                self.arrivals.binding(),
            ],
        );
        let lines = self.lines_kernel.as_ref().map(|kernel| {
            kernel.bind_group(
                device,
                &[
                    self.nodes.binding(),
                    self.node_bounds.binding(),
                    self.line_vertices.binding(),
                    self.line_levels.binding(),
                ],
            )
        });

        self.groups = Some(BuildGroups {
            morton,
            build,
            refit,
            lines,
        });
        info!(
            "Prepared LBVH build for {} triangles ({} internal nodes)",
            self.triangle_count, node_count
        );
    }

    /// Records bounds → Morton → sort → build → refit.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(groups) = &self.groups else {
            return;
        };
        if self.triangle_count == 0 {
            return;
        }

        self.scene_bounds.encode(encoder);

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Morton Code Pass"),
            });
            let params = MortonParams {
                triangle_count: self.triangle_count,
                _padding: [0; 3],
            };
            let groups_x = workgroups(self.triangle_count, PathTracerConfig::MORTON_WORKGROUP_SIZE);
            self.morton_kernel.dispatch(&mut pass, &groups.morton, &params, groups_x);
        }

        self.sorter.encode(encoder);

        let node_count = self.node_count();
        if node_count == 0 {
            return;
        }
        self.arrivals.clear(encoder);

        let params = self.build_params();
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("BVH Build Pass"),
        });
        debug!("Dispatching build and refit over {} nodes", node_count);
        self.build_kernel.dispatch(
            &mut pass,
            &groups.build,
            &params,
            workgroups(node_count, PathTracerConfig::BUILD_WORKGROUP_SIZE),
        );
        self.refit_kernel.dispatch(
            &mut pass,
            &groups.refit,
            &params,
            workgroups(node_count, PathTracerConfig::REFIT_WORKGROUP_SIZE),
        );
    }

    /// Records the debug nodes-to-lines pass; returns false when it was not enabled.
    pub fn encode_lines(&self, encoder: &mut wgpu::CommandEncoder) -> bool {
        let (Some(kernel), Some(BuildGroups { lines: Some(lines), .. })) = (&self.lines_kernel, &self.groups) else {
            return false;
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("BVH Lines Pass"),
        });
        let params = self.build_params();
        kernel.dispatch(
            &mut pass,
            lines,
            &params,
            workgroups(params.node_count(), PathTracerConfig::BUILD_WORKGROUP_SIZE),
        );
        true
    }

    pub fn scene_bounds(&self) -> &StorageBuffer<Aabb> {
        self.scene_bounds.output()
    }

    pub fn sorter(&self) -> &RadixSorter {
        &self.sorter
    }

    pub fn line_vertices(&self) -> &StorageBuffer<Vec4> {
        &self.line_vertices
    }

    pub fn line_levels(&self) -> &StorageBuffer<u32> {
        &self.line_levels
    }

    /// Vertices the line pass writes for the current tree.
    pub fn line_vertex_count(&self) -> u32 {
        self.node_count() * PathTracerConfig::LINE_VERTICES_PER_NODE
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }
}
