use log::{info, warn};
use pathtracer_shared::PathTracerConfig;

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};

/// Adapter, device and queue shared by the renderer and the presenter
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub features: wgpu::Features,
}

impl GpuContext {
    /// Features every kernel depends on.
    pub const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::PUSH_CONSTANTS;

    fn create_instance() -> wgpu::Instance {
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    /// Headless context for offline rendering and tests.
    pub async fn new(config: &RenderConfig) -> Result<Self> {
        Self::request(Self::create_instance(), None, config).await
    }

    /// Context whose adapter can present to `window`.
    pub async fn with_window(window: &winit::window::Window, config: &RenderConfig) -> Result<(Self, wgpu::Surface)> {
        let instance = Self::create_instance();
        let surface = unsafe { instance.create_surface(window) }?;
        let context = Self::request(instance, Some(&surface), config).await?;
        Ok((context, surface))
    }

    async fn request(
        instance: wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface>,
        config: &RenderConfig,
    ) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let info = adapter.get_info();
        info!("Using adapter {} ({:?}, {:?})", info.name, info.device_type, info.backend);

        let available = adapter.features();
        if !available.contains(Self::REQUIRED_FEATURES) {
            return Err(RenderError::MissingFeatures(Self::REQUIRED_FEATURES - available));
        }

        let mut features = Self::REQUIRED_FEATURES;
        if config.debug {
            if available.contains(wgpu::Features::TIMESTAMP_QUERY) {
                features |= wgpu::Features::TIMESTAMP_QUERY;
            } else {
                warn!("Adapter has no timestamp queries; pass timings will be reported as zero");
            }
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Path Tracer Device"),
                    features,
                    limits: wgpu::Limits {
                        max_push_constant_size: PathTracerConfig::MAX_PUSH_CONSTANT_SIZE,
                        max_storage_buffers_per_shader_stage: PathTracerConfig::MAX_STORAGE_BUFFERS_PER_STAGE,
                        ..Default::default()
                    },
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            features,
        })
    }

    pub fn has_timestamps(&self) -> bool {
        self.features.contains(wgpu::Features::TIMESTAMP_QUERY)
    }

    /// Compiled shader crate, one module holding every entry point.
    pub fn shader_module(&self) -> wgpu::ShaderModule {
        let shader_binary = include_bytes!(env!("shader.spv"));
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shader Module"),
            source: wgpu::util::make_spirv(shader_binary),
        })
    }
}
