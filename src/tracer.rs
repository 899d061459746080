use pathtracer_shared::glam::Vec4;
use pathtracer_shared::{CameraUniform, DebugCounters, PathTracerConfig, TraceParams};

use crate::buffers::StorageBuffer;
use crate::bvh::LbvhBuilder;
use crate::compute::{Binding, ComputeKernel};
use crate::scene::SceneBuffers;

/// Per-pixel path trace pass and the images it accumulates into
pub struct TracePass {
    kernel: ComputeKernel,
    debug: bool,
    pub camera: StorageBuffer<CameraUniform>,
    pub cumulative: StorageBuffer<Vec4>,
    pub counters: StorageBuffer<u32>,
    pub output: wgpu::Texture,
    output_view: wgpu::TextureView,
    /// View depth of every pixel's primary hit, read by the BVH overlay.
    pub depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    bind_group: Option<wgpu::BindGroup>,
    width: u32,
    height: u32,
}

impl TracePass {
    pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

    pub fn new(device: &wgpu::Device, module: &wgpu::ShaderModule, width: u32, height: u32, debug: bool) -> Self {
        let mut bindings = vec![Binding::READ; 8];
        bindings.push(Binding::WRITE);
        bindings.push(Binding::StorageTexture(Self::OUTPUT_FORMAT));
        bindings.push(Binding::StorageTexture(Self::DEPTH_FORMAT));
        if debug {
            bindings.push(Binding::WRITE);
        }
        let entry_point = if debug { "path_trace_debug_cs" } else { "path_trace_cs" };
        let kernel = ComputeKernel::new::<TraceParams>(device, module, entry_point, &bindings);

        let (output, output_view) = Self::create_target(device, "Path Trace Output Texture", Self::OUTPUT_FORMAT, width, height);
        let (depth, depth_view) = Self::create_target(device, "Path Trace Depth Texture", Self::DEPTH_FORMAT, width, height);
        let mut cumulative = StorageBuffer::new(device, "Cumulative Radiance Buffer", (width * height) as usize);
        cumulative.ensure_capacity(device, (width * height) as usize);
        let mut counters = StorageBuffer::new(device, "Debug Counters Buffer", DebugCounters::LEN);
        counters.ensure_capacity(device, DebugCounters::LEN);

        Self {
            kernel,
            debug,
            camera: StorageBuffer::from_slice(device, "Camera Buffer", &[CameraUniform::default()]),
            cumulative,
            counters,
            output,
            output_view,
            depth,
            depth_view,
            bind_group: None,
            width,
            height,
        }
    }

    fn create_target(
        device: &wgpu::Device,
        label: &'static str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    /// Reallocates the output and depth textures and the cumulative buffer. Bind groups must
    /// be rebuilt afterwards.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        let (output, output_view) = Self::create_target(device, "Path Trace Output Texture", Self::OUTPUT_FORMAT, width, height);
        self.output = output;
        self.output_view = output_view;
        let (depth, depth_view) = Self::create_target(device, "Path Trace Depth Texture", Self::DEPTH_FORMAT, width, height);
        self.depth = depth;
        self.depth_view = depth_view;
        self.cumulative.ensure_capacity(device, (width * height) as usize);
        self.bind_group = None;
    }

    /// Binds the scene arrays, the tree and the targets.
    pub fn rebind(&mut self, device: &wgpu::Device, scene: &SceneBuffers, bvh: &LbvhBuilder) {
        let mut resources = vec![
            scene.positions.binding(),
            scene.normals.binding(),
            scene.indices.binding(),
            scene.triangle_to_object.binding(),
            scene.objects.binding(),
            bvh.nodes.binding(),
            bvh.node_bounds.binding(),
            self.camera.binding(),
            self.cumulative.binding(),
            wgpu::BindingResource::TextureView(&self.output_view),
            wgpu::BindingResource::TextureView(&self.depth_view),
        ];
        if self.debug {
            resources.push(self.counters.binding());
        }
        self.bind_group = Some(self.kernel.bind_group(device, &resources));
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, params: &TraceParams) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        let (group_x, group_y) = PathTracerConfig::TRACE_WORKGROUP_SIZE;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Path Trace Pass"),
        });
        self.kernel.dispatch(
            &mut pass,
            bind_group,
            params,
            (
                pathtracer_shared::div_ceil(self.width, group_x),
                pathtracer_shared::div_ceil(self.height, group_y),
            ),
        );
    }

    pub fn output_view(&self) -> &wgpu::TextureView {
        &self.output_view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_bound(&self) -> bool {
        self.bind_group.is_some()
    }
}
