use std::sync::Arc;

use log::{debug, info, trace};
use pathtracer_shared::glam::Vec4;
use pathtracer_shared::{Aabb, BvhNode, CameraUniform, DebugCounters, LineOverlay, TraceParams};

use crate::buffers::{map_staging, read_buffer};
use crate::bvh::LbvhBuilder;
use crate::config::RenderConfig;
use crate::context::GpuContext;
use crate::debug::{BvhLines, DebugStats, TimestampQueries};
use crate::error::{RenderError, Result};
use crate::scene::{Scene, SceneBuffers};
use crate::tracer::TracePass;

/// Progressive accumulation bookkeeping
///
/// The frame counter restarts at 1 whenever the camera differs from the previous frame's
/// or something invalidated the accumulated image (new geometry, new size).
#[derive(Clone, Debug)]
pub struct ProgressiveState {
    frame: u32,
    last_camera: Option<CameraUniform>,
    reset_pending: bool,
}

impl Default for ProgressiveState {
    fn default() -> Self {
        Self {
            frame: 0,
            last_camera: None,
            reset_pending: true,
        }
    }
}

impl ProgressiveState {
    /// Forces the next frame to start a new accumulation.
    pub fn trigger_reset(&mut self) {
        self.reset_pending = true;
    }

    /// Frame number for a render with `camera` and whether the sums must be cleared first.
    pub fn advance(&mut self, camera: &CameraUniform) -> (u32, bool) {
        let camera_changed = self.last_camera.as_ref() != Some(camera);
        let reset = camera_changed || self.reset_pending;

        self.frame = if reset { 1 } else { self.frame + 1 };
        self.last_camera = Some(*camera);
        self.reset_pending = false;
        (self.frame, reset)
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }
}

struct GpuState {
    context: Arc<GpuContext>,
    scene: SceneBuffers,
    builder: LbvhBuilder,
    tracer: TracePass,
    timestamps: Option<TimestampQueries>,
    progressive: ProgressiveState,
    geometry_dirty: bool,
}

/// GPU path tracer: builds the LBVH for the current scene and accumulates frames
///
/// Created without a device; every pass entry point returns
/// [`RenderError::NotInitialized`] until [`Renderer::init`] or
/// [`Renderer::init_with_context`] attaches one.
pub struct Renderer {
    config: RenderConfig,
    gpu: Option<GpuState>,
    overlay: LineOverlay,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            gpu: None,
            overlay: LineOverlay::default(),
        }
    }

    /// Requests a headless device matching the config.
    pub async fn init(&mut self) -> Result<()> {
        let context = GpuContext::new(&self.config).await?;
        self.init_with_context(Arc::new(context))
    }

    /// Compiles every pipeline on `context` and allocates the size dependent targets.
    pub fn init_with_context(&mut self, context: Arc<GpuContext>) -> Result<()> {
        let device = &context.device;
        let module = context.shader_module();

        let scene = SceneBuffers::empty(device);
        let builder = LbvhBuilder::new(device, &module, self.config.reduce_block_size, self.config.debug);
        let mut tracer = TracePass::new(device, &module, self.config.width, self.config.height, self.config.debug);
        tracer.rebind(device, &scene, &builder);

        let timestamps = (self.config.debug && context.has_timestamps())
            .then(|| TimestampQueries::new(device, &context.queue));

        info!(
            "Renderer initialized at {}x{}, {} bounces, debug {}",
            self.config.width, self.config.height, self.config.bounces, self.config.debug
        );

        self.gpu = Some(GpuState {
            context,
            scene,
            builder,
            tracer,
            timestamps,
            progressive: ProgressiveState::default(),
            geometry_dirty: false,
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    fn gpu(&self) -> Result<&GpuState> {
        self.gpu.as_ref().ok_or(RenderError::NotInitialized)
    }

    fn gpu_mut(&mut self) -> Result<&mut GpuState> {
        self.gpu.as_mut().ok_or(RenderError::NotInitialized)
    }

    fn debug_gpu(&self) -> Result<&GpuState> {
        let gpu = self.gpu()?;
        self.require_debug()?;
        Ok(gpu)
    }

    fn require_debug(&self) -> Result<()> {
        if !self.config.debug {
            return Err(RenderError::DebugDisabled);
        }
        Ok(())
    }

    /// Uploads `scene` and schedules a BVH rebuild for the next render.
    pub fn set_scene(&mut self, scene: &Scene) -> Result<()> {
        scene.validate()?;
        let gpu = self.gpu_mut()?;
        let device = &gpu.context.device;

        gpu.scene.upload(device, &gpu.context.queue, scene);
        gpu.builder.prepare(device, &gpu.context.queue, &gpu.scene);
        gpu.tracer.rebind(device, &gpu.scene, &gpu.builder);
        gpu.geometry_dirty = true;
        gpu.progressive.trigger_reset();
        Ok(())
    }

    /// Reallocates the output image and the cumulative buffer; accumulation restarts.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        let gpu = self.gpu.as_mut().ok_or(RenderError::NotInitialized)?;
        if gpu.tracer.size() != (width, height) {
            let device = &gpu.context.device;
            gpu.tracer.resize(device, width, height);
            gpu.tracer.rebind(device, &gpu.scene, &gpu.builder);
            gpu.progressive.trigger_reset();
            debug!("Resized render targets to {}x{}", width, height);
        }
        self.config.width = width;
        self.config.height = height;
        Ok(())
    }

    /// Traces one frame from `camera`, rebuilding the BVH first if the scene changed.
    ///
    /// Returns the progressive frame number the image now averages over.
    pub fn render(&mut self, camera: &CameraUniform) -> Result<u32> {
        let bounces = self.config.bounces;
        let debug_enabled = self.config.debug;
        let gpu = self.gpu_mut()?;
        let device = &gpu.context.device;
        let queue = &gpu.context.queue;

        let (frame, reset) = gpu.progressive.advance(camera);
        queue.write_buffer(gpu.tracer.camera.buffer(), 0, bytemuck::bytes_of(camera));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        if gpu.geometry_dirty {
            if let Some(timestamps) = &gpu.timestamps {
                timestamps.write(&mut encoder, TimestampQueries::BVH_BEGIN);
            }
            gpu.builder.encode(&mut encoder);
            if let Some(timestamps) = &gpu.timestamps {
                timestamps.write(&mut encoder, TimestampQueries::BVH_END);
                timestamps.resolve_bvh(&mut encoder);
            }
            if debug_enabled {
                gpu.builder.encode_lines(&mut encoder);
            }
            gpu.geometry_dirty = false;
            info!(
                "Encoded LBVH rebuild: {} triangles, {} nodes",
                gpu.scene.triangle_count,
                gpu.builder.node_count()
            );
        }

        if reset {
            gpu.tracer.cumulative.clear(&mut encoder);
            debug!("Accumulation reset");
        }
        if debug_enabled {
            gpu.tracer.counters.clear(&mut encoder);
        }

        let (width, height) = gpu.tracer.size();
        let params = TraceParams {
            width,
            height,
            frame,
            bounces,
            node_count: gpu.builder.node_count(),
            triangle_count: gpu.scene.triangle_count,
            _padding: [0; 2],
        };

        if let Some(timestamps) = &gpu.timestamps {
            timestamps.write(&mut encoder, TimestampQueries::TRACE_BEGIN);
        }
        gpu.tracer.encode(&mut encoder, &params);
        if let Some(timestamps) = &gpu.timestamps {
            timestamps.write(&mut encoder, TimestampQueries::TRACE_END);
            timestamps.resolve_trace(&mut encoder);
        }

        queue.submit(std::iter::once(encoder.finish()));
        trace!("Frame {} submitted ({}x{})", frame, width, height);

        if debug_enabled {
            self.overlay = self.overlay.with_camera(camera, width, height);
        }
        Ok(frame)
    }

    pub fn frame(&self) -> Result<u32> {
        Ok(self.gpu()?.progressive.frame())
    }

    /// Discards the accumulated image on the next render.
    pub fn reset_accumulation(&mut self) -> Result<()> {
        self.gpu_mut()?.progressive.trigger_reset();
        Ok(())
    }

    /// Sampled view of the displayed image for presentation.
    pub fn output_view(&self) -> Result<&wgpu::TextureView> {
        Ok(self.gpu()?.tracer.output_view())
    }

    /// View depth of each pixel's primary hit, sampled by the BVH overlay.
    pub fn depth_view(&self) -> Result<&wgpu::TextureView> {
        Ok(self.gpu()?.tracer.depth_view())
    }

    pub fn context(&self) -> Result<&Arc<GpuContext>> {
        Ok(&self.gpu()?.context)
    }

    /// Mean radiance per pixel after the current frame, before 8 bit quantization.
    pub fn read_radiance(&self) -> Result<Vec<Vec4>> {
        let gpu = self.gpu()?;
        let frame = gpu.progressive.frame().max(1) as f32;
        let sums = gpu.tracer.cumulative.read(&gpu.context.device, &gpu.context.queue)?;
        Ok(sums
            .into_iter()
            .map(|sum| (sum.truncate() / frame).extend(1.0))
            .collect())
    }

    /// Tightly packed rows of `texture`, which has the size of the render targets.
    fn read_texture(&self, texture: &wgpu::Texture, bytes_per_pixel: u32) -> Result<Vec<u8>> {
        let gpu = self.gpu()?;
        let device = &gpu.context.device;
        let (width, height) = gpu.tracer.size();

        let unpadded = bytes_per_pixel * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = (unpadded + align - 1) / align * align;

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture Readback Buffer"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Texture Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.context.queue.submit(std::iter::once(encoder.finish()));

        let bytes: Vec<u8> = map_staging(device, &staging)?;
        Ok(bytes
            .chunks_exact(padded as usize)
            .flat_map(|row| &row[..unpadded as usize])
            .copied()
            .collect())
    }

    /// Displayed image as 8 bit RGBA.
    pub fn read_image(&self) -> Result<image::RgbaImage> {
        let gpu = self.gpu()?;
        let (width, height) = gpu.tracer.size();
        let pixels = self.read_texture(&gpu.tracer.output, 4)?;

        image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            RenderError::Image(image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            )))
        })
    }

    /// Traversal counters and pass timings of the last frame.
    pub fn debug_stats(&self) -> Result<DebugStats> {
        let gpu = self.debug_gpu()?;
        let device = &gpu.context.device;
        let queue = &gpu.context.queue;

        let counters: Vec<u32> = read_buffer(device, queue, gpu.tracer.counters.buffer(), DebugCounters::LEN)?;
        let mut stats = DebugStats::from_counters(&counters, self.config.pixel_count());
        if let Some(timestamps) = &gpu.timestamps {
            let (bvh_ms, trace_ms) = timestamps.read_ms(device, queue)?;
            stats.bvh_ms = bvh_ms;
            stats.trace_ms = trace_ms;
        }
        trace!("Debug stats: {:?}", stats);
        Ok(stats)
    }

    /// Runs the nodes-to-lines pass over the current tree.
    pub fn bvh_lines(&self) -> Result<BvhLines> {
        let gpu = self.debug_gpu()?;
        let device = &gpu.context.device;
        let queue = &gpu.context.queue;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("BVH Lines Encoder"),
        });
        if !gpu.builder.encode_lines(&mut encoder) {
            return Ok(BvhLines::default());
        }
        queue.submit(std::iter::once(encoder.finish()));

        Ok(BvhLines {
            vertices: gpu.builder.line_vertices().read(device, queue)?,
            levels: gpu.builder.line_levels().read(device, queue)?,
        })
    }

    /// Primary hit depth per pixel, row 0 at the top; misses hold
    /// [`PathTracerConfig::INFINITY`](pathtracer_shared::PathTracerConfig::INFINITY).
    pub fn read_depth(&self) -> Result<Vec<f32>> {
        let gpu = self.gpu()?;
        let bytes = self.read_texture(&gpu.tracer.depth, 4)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Vertex and level buffers of the overlay lines with their live vertex count.
    pub fn bvh_line_buffers(&self) -> Result<(&wgpu::Buffer, &wgpu::Buffer, u32)> {
        let gpu = self.debug_gpu()?;
        let builder = &gpu.builder;
        Ok((
            builder.line_vertices().buffer(),
            builder.line_levels().buffer(),
            builder.line_vertex_count(),
        ))
    }

    /// Overlay settings, seen from the camera of the last rendered frame.
    pub fn line_overlay(&self) -> Result<LineOverlay> {
        self.require_debug()?;
        Ok(self.overlay)
    }

    /// Tree depth the overlay draws; the root is level 0.
    pub fn set_bvh_level(&mut self, level: u32) -> Result<()> {
        self.require_debug()?;
        self.overlay.level = level;
        Ok(())
    }

    /// Also draw every box above the selected level.
    pub fn set_bvh_show_parents(&mut self, show_parents: bool) -> Result<()> {
        self.require_debug()?;
        self.overlay.show_parents = show_parents as u32;
        Ok(())
    }

    /// Straight RGBA line colour, blended over the image.
    pub fn set_bvh_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.require_debug()?;
        self.overlay.color = Vec4::from_array(color);
        Ok(())
    }

    pub fn read_nodes(&self) -> Result<Vec<BvhNode>> {
        let gpu = self.gpu()?;
        gpu.builder.nodes.read(&gpu.context.device, &gpu.context.queue)
    }

    pub fn read_node_bounds(&self) -> Result<Vec<Aabb>> {
        let gpu = self.gpu()?;
        gpu.builder.node_bounds.read(&gpu.context.device, &gpu.context.queue)
    }

    pub fn read_scene_bounds(&self) -> Result<Aabb> {
        let gpu = self.gpu()?;
        let bounds = gpu.builder.scene_bounds().read(&gpu.context.device, &gpu.context.queue)?;
        Ok(bounds.first().copied().unwrap_or(Aabb::EMPTY))
    }

    /// Sorted Morton codes and the original triangle index of each.
    pub fn read_sorted(&self) -> Result<(Vec<u32>, Vec<u32>)> {
        let gpu = self.gpu()?;
        let sorter = gpu.builder.sorter();
        let keys = sorter.keys_a.read(&gpu.context.device, &gpu.context.queue)?;
        let ids = sorter.ids_a.read(&gpu.context.device, &gpu.context.queue)?;
        Ok((keys, ids))
    }

    /// Drops every GPU resource; the renderer reports `NotInitialized` afterwards.
    pub fn release(&mut self) {
        if self.gpu.take().is_some() {
            info!("Renderer released");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pathtracer_shared::glam::{vec3, Vec3};

    #[test]
    fn test_progressive_counts_and_resets() {
        let camera = CameraUniform::default();
        let mut progressive = ProgressiveState::default();
        assert_eq!(progressive.advance(&camera), (1, true));
        assert_eq!(progressive.advance(&camera), (2, false));
        assert_eq!(progressive.advance(&camera), (3, false));

        let moved = CameraUniform::look_at(vec3(0.0, 0.0, 4.0), Vec3::ZERO, Vec3::Y, 45.0, 0.01, 1000.0);
        assert_eq!(progressive.advance(&moved), (1, true));
        assert_eq!(progressive.advance(&moved), (2, false));

        progressive.trigger_reset();
        assert_eq!(progressive.advance(&moved), (1, true));
        assert_eq!(progressive.frame(), 1);
    }

    #[test]
    fn test_uninitialized_renderer_errors() {
        let mut renderer = Renderer::new(RenderConfig::default());
        assert!(matches!(renderer.render(&CameraUniform::default()), Err(RenderError::NotInitialized)));
        assert!(matches!(renderer.set_scene(&Scene::cornell_box()), Err(RenderError::NotInitialized)));
        assert!(matches!(renderer.resize(4, 4), Err(RenderError::NotInitialized)));
        assert!(matches!(renderer.read_nodes(), Err(RenderError::NotInitialized)));
        assert!(matches!(renderer.debug_stats(), Err(RenderError::NotInitialized)));
        renderer.release();
        assert!(!renderer.is_initialized());
    }

    #[test]
    fn test_overlay_settings_require_debug() {
        let mut plain = Renderer::new(RenderConfig::default());
        assert!(matches!(plain.set_bvh_level(2), Err(RenderError::DebugDisabled)));
        assert!(matches!(plain.set_bvh_show_parents(false), Err(RenderError::DebugDisabled)));
        assert!(matches!(plain.set_bvh_color([1.0; 4]), Err(RenderError::DebugDisabled)));
        assert!(matches!(plain.line_overlay(), Err(RenderError::DebugDisabled)));

        let mut debug = Renderer::new(RenderConfig::default().with_debug(true));
        assert_eq!(debug.line_overlay().unwrap(), LineOverlay::default());
        debug.set_bvh_level(3).unwrap();
        debug.set_bvh_show_parents(false).unwrap();
        debug.set_bvh_color([1.0, 0.0, 0.0, 0.5]).unwrap();

        let overlay = debug.line_overlay().unwrap();
        assert_eq!(overlay.level, 3);
        assert_eq!(overlay.color, Vec4::new(1.0, 0.0, 0.0, 0.5));
        assert!(overlay.shows(3));
        assert!(!overlay.shows(2));
        assert!(matches!(debug.bvh_line_buffers(), Err(RenderError::NotInitialized)));
    }
}
