use thiserror::Error;

/// Everything the renderer surfaces to its caller.
///
/// Precondition violations (`NotInitialized`, `DebugDisabled`) are reported immediately and
/// never retried. Adapter and feature problems only occur during initialization.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer used before a GPU device was attached")]
    NotInitialized,

    #[error("debug instrumentation was not enabled when the renderer was created")]
    DebugDisabled,

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("adapter lacks required features: {0:?}")]
    MissingFeatures(wgpu::Features),

    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("buffer mapping callback dropped before completion")]
    MapChannelClosed,

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("invalid scene: {0}")]
    Scene(String),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
