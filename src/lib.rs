//! LBVH path tracer on `wgpu` compute.
//!
//! After each `set_scene` the next frame reduces the scene bounds, encodes Morton codes,
//! radix sorts them, builds a Karras radix tree and refits its boxes. Every frame then path
//! traces the image progressively against that tree. [`cpu`] runs the same passes on the
//! rayon thread pool.

pub mod buffers;
pub mod bvh;
pub mod compute;
pub mod config;
pub mod context;
pub mod cpu;
pub mod debug;
pub mod display;
pub mod error;
pub mod gltf_loader;
pub mod input;
pub mod reduce;
pub mod renderer;
pub mod scene;
pub mod sort;
pub mod tracer;

pub use config::RenderConfig;
pub use context::GpuContext;
pub use cpu::{CpuBvh, CpuRenderer};
pub use debug::{BvhLines, DebugStats};
pub use error::{RenderError, Result};
pub use gltf_loader::load_gltf;
pub use renderer::Renderer;
pub use scene::{Scene, SceneBuilder};

pub use pathtracer_shared;
