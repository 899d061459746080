use bytemuck::Pod;
use pathtracer_shared::div_ceil;

/// Resource kinds a compute entry point binds in descriptor set 0
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    Storage { read_only: bool },
    StorageTexture(wgpu::TextureFormat),
}

impl Binding {
    pub const READ: Binding = Binding::Storage { read_only: true };
    pub const WRITE: Binding = Binding::Storage { read_only: false };

    fn layout_entry(self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            Binding::Storage { read_only } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            Binding::StorageTexture(format) => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
        };

        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }
}

/// One compute entry point with its explicit bind group layout and push constant range
pub struct ComputeKernel {
    pub entry_point: &'static str,
    pub pipeline: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
}

impl ComputeKernel {
    /// Builds the pipeline for `entry_point`; binding `i` of set 0 has kind `bindings[i]`
    /// and the push constant block is a `P`.
    pub fn new<P: Pod>(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        entry_point: &'static str,
        bindings: &[Binding],
    ) -> Self {
        let entries: Vec<_> = bindings
            .iter()
            .enumerate()
            .map(|(i, binding)| binding.layout_entry(i as u32))
            .collect();

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(entry_point),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(entry_point),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::COMPUTE,
                range: 0..std::mem::size_of::<P>() as u32,
            }],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&pipeline_layout),
            module,
            entry_point,
        });

        Self {
            entry_point,
            pipeline,
            layout,
        }
    }

    /// Bind group whose entry `i` is `resources[i]`.
    pub fn bind_group(&self, device: &wgpu::Device, resources: &[wgpu::BindingResource<'_>]) -> wgpu::BindGroup {
        let entries: Vec<_> = resources
            .iter()
            .enumerate()
            .map(|(i, resource)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: resource.clone(),
            })
            .collect();

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.entry_point),
            layout: &self.layout,
            entries: &entries,
        })
    }

    /// Records one dispatch; an empty grid records nothing.
    pub fn dispatch<'a, P: Pod>(
        &'a self,
        pass: &mut wgpu::ComputePass<'a>,
        bind_group: &'a wgpu::BindGroup,
        params: &P,
        workgroups: (u32, u32),
    ) {
        if workgroups.0 == 0 || workgroups.1 == 0 {
            return;
        }
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_push_constants(0, bytemuck::bytes_of(params));
        pass.dispatch_workgroups(workgroups.0, workgroups.1, 1);
    }
}

/// Workgroups needed to cover `len` invocations in groups of `size`.
pub fn workgroups(len: u32, size: u32) -> (u32, u32) {
    (div_ceil(len, size), 1)
}
