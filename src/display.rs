use log::debug;
use pathtracer_shared::glam::Vec4;
use pathtracer_shared::LineOverlay;

use crate::buffers::StorageBuffer;
use crate::context::GpuContext;
use crate::error::{RenderError, Result};
use crate::renderer::Renderer;

/// Line-list pass drawing the BVH boxes over the displayed image
///
/// Fragments behind the traced primary hit of their pixel are discarded.
struct BvhOverlayPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    settings: StorageBuffer<LineOverlay>,
}

/// Resources one overlay draw borrows from the renderer
struct OverlayDraw<'r> {
    bind_group: wgpu::BindGroup,
    vertices: &'r wgpu::Buffer,
    levels: &'r wgpu::Buffer,
    vertex_count: u32,
}

impl BvhOverlayPass {
    fn new(context: &GpuContext, module: &wgpu::ShaderModule, format: wgpu::TextureFormat) -> Self {
        let device = &context.device;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BVH Overlay Bind Group Layout"),
            entries: &[
                // Binding 0: overlay settings and camera
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Binding 1: traced depth
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("BVH Overlay Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("BVH Overlay Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: "bvh_lines_vs",
                buffers: &[
                    // Slot 0: box corner
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vec4>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x4,
                            offset: 0,
                            shader_location: 0,
                        }],
                    },
                    // Slot 1: node depth level
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<u32>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Uint32,
                            offset: 0,
                            shader_location: 1,
                        }],
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: "bvh_lines_fs",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            layout,
            settings: StorageBuffer::from_slice(device, "BVH Overlay Settings Buffer", &[LineOverlay::default()]),
        }
    }

    /// Uploads the renderer's overlay settings; `None` while there is no tree to draw.
    fn prepare<'r>(&self, context: &GpuContext, renderer: &'r Renderer) -> Result<Option<OverlayDraw<'r>>> {
        let (vertices, levels, vertex_count) = renderer.bvh_line_buffers()?;
        if vertex_count == 0 {
            return Ok(None);
        }
        let overlay = renderer.line_overlay()?;
        context
            .queue
            .write_buffer(self.settings.buffer(), 0, bytemuck::bytes_of(&overlay));

        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BVH Overlay Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.settings.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(renderer.depth_view()?),
                },
            ],
        });

        Ok(Some(OverlayDraw {
            bind_group,
            vertices,
            levels,
            vertex_count,
        }))
    }

    fn draw<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>, draw: &'a OverlayDraw<'_>) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &draw.bind_group, &[]);
        render_pass.set_vertex_buffer(0, draw.vertices.slice(..));
        render_pass.set_vertex_buffer(1, draw.levels.slice(..));
        render_pass.draw(0..draw.vertex_count, 0..1);
    }
}

/// Window surface plus the fullscreen pass that shows the path traced image
///
/// With `debug` set the BVH overlay is drawn on top.
pub struct Presenter {
    surface: wgpu::Surface,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    overlay: Option<BvhOverlayPass>,
}

impl Presenter {
    pub fn new(context: &GpuContext, surface: wgpu::Surface, width: u32, height: u32, debug: bool) -> Self {
        let device = &context.device;
        let surface_caps = surface.get_capabilities(&context.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(device, &config);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Display Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Display Bind Group Layout"),
            entries: &[
                // Binding 0: path traced image
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                // Binding 1: sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Display Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let module = context.shader_module();
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Display Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "display_vs",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "display_fs",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let overlay = debug.then(|| BvhOverlayPass::new(context, &module, surface_format));

        Self {
            surface,
            config,
            pipeline,
            layout,
            sampler,
            overlay,
        }
    }

    /// Reconfigures the surface and resizes the renderer's targets to match.
    pub fn resize(&mut self, context: &GpuContext, renderer: &mut Renderer, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&context.device, &self.config);
        debug!("Surface reconfigured to {}x{}", width, height);
        renderer.resize(width, height)
    }

    /// Draws the renderer's current image to the next swapchain texture.
    pub fn present(&mut self, context: &GpuContext, renderer: &Renderer) -> Result<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&context.device, &self.config);
                return Ok(());
            }
            Err(e) => return Err(RenderError::Surface(e)),
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Display Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(renderer.output_view()?),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let overlay = match &self.overlay {
            Some(pass) => pass.prepare(context, renderer)?,
            None => None,
        };

        let mut encoder = context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Display Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Display Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);

            if let (Some(pass), Some(draw)) = (&self.overlay, &overlay) {
                pass.draw(&mut render_pass, draw);
            }
        }

        context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}
