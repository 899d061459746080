#![cfg_attr(target_arch = "spirv", no_std)]

//! GPU-visible records and the per-thread building blocks of the LBVH path tracer.
//!
//! Everything in this crate compiles both for the host and for `spirv-unknown-*`, so the
//! compute shaders and the CPU reference backend run identical code for reduction, Morton
//! encoding, radix scans, tree construction and path tracing.

pub use bytemuck;
pub use glam;

use bytemuck::{Pod, Zeroable};
use glam::{vec3, Vec3};

pub mod aabb;
pub mod brdf;
pub mod camera;
pub mod karras;
pub mod lines;
pub mod morton;
pub mod radix;
pub mod ray;
pub mod reduce;
pub mod rng;
pub mod trace;

pub use aabb::Aabb;
pub use camera::CameraUniform;
pub use lines::LineOverlay;

/// Configuration constants for the path tracer
pub struct PathTracerConfig;

impl PathTracerConfig {
    /// Elements folded sequentially by one reduction thread.
    pub const REDUCE_BLOCK_SIZE: u32 = 128;
    pub const REDUCE_WORKGROUP_SIZE: u32 = 64;
    pub const MORTON_WORKGROUP_SIZE: u32 = 128;

    /// Keys per count/scatter slice (W). The scan block is 2W.
    pub const SORT_WORKGROUP_SIZE: u32 = 128;
    pub const SCAN_BLOCK_SIZE: u32 = 2 * Self::SORT_WORKGROUP_SIZE;
    pub const RADIX_BITS: u32 = 4;
    pub const RADIX: u32 = 1 << Self::RADIX_BITS;
    pub const RADIX_PASSES: u32 = 32 / Self::RADIX_BITS;

    pub const BUILD_WORKGROUP_SIZE: u32 = 64;
    pub const REFIT_WORKGROUP_SIZE: u32 = 64;
    pub const TRACE_WORKGROUP_SIZE: (u32, u32) = (16, 16);

    pub const TRAVERSAL_STACK_SIZE: usize = 64;
    pub const EPSILON: f32 = 0.001;
    pub const INFINITY: f32 = 1e30;
    pub const FIREFLY_CLAMP: f32 = 50.0;
    /// Lower bound for `roughness²`; a perfectly smooth lobe divides by zero.
    pub const MIN_ALPHA: f32 = 1e-3;
    pub const DEFAULT_BOUNCES: u32 = 2;

    pub const LINE_VERTICES_PER_NODE: u32 = 24;

    // GPU configuration constants
    pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;
    pub const MAX_STORAGE_BUFFERS_PER_STAGE: u32 = 10;
}

/// Internal node of the binary radix tree: 20 bytes, five words.
///
/// `left`/`right` hold the original primitive index when the matching `*_is_leaf` flag is
/// set, otherwise an internal node index. `parent` of the root is [`BvhNode::NO_PARENT`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BvhNode {
    pub left_is_leaf: u32,
    pub right_is_leaf: u32,
    pub left: u32,
    pub right: u32,
    pub parent: u32,
}

impl BvhNode {
    pub const NO_PARENT: u32 = u32::MAX;

    pub fn left_leaf(&self) -> bool {
        self.left_is_leaf != 0
    }

    pub fn right_leaf(&self) -> bool {
        self.right_is_leaf != 0
    }

    /// Both children are primitives; refit walks start here.
    pub fn is_leaf_parent(&self) -> bool {
        self.left_leaf() && self.right_leaf()
    }
}

/// Surface description used by the BRDF
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Material {
    pub color: [f32; 3],
    pub roughness: f32,
    /// Emitted rgb in `xyz`, intensity multiplier in `w`.
    pub emission: [f32; 4],
    pub metalness: f32,
    pub _padding: [f32; 3],
}

impl Material {
    pub fn diffuse(color: [f32; 3]) -> Self {
        Self {
            color,
            roughness: 1.0,
            emission: [0.0; 4],
            metalness: 0.0,
            _padding: [0.0; 3],
        }
    }

    pub fn emissive(color: [f32; 3], intensity: f32) -> Self {
        Self {
            color,
            roughness: 1.0,
            emission: [color[0], color[1], color[2], intensity],
            metalness: 0.0,
            _padding: [0.0; 3],
        }
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_metalness(mut self, metalness: f32) -> Self {
        self.metalness = metalness;
        self
    }

    pub fn color(&self) -> Vec3 {
        Vec3::from_array(self.color)
    }

    /// Emitted radiance, `rgb * intensity`.
    pub fn radiance(&self) -> Vec3 {
        vec3(self.emission[0], self.emission[1], self.emission[2]) * self.emission[3]
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::diffuse([0.8, 0.8, 0.8])
    }
}

/// One mesh instance: a contiguous triangle range sharing a material
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SceneObject {
    pub start: u32,
    pub length: u32,
    pub _padding: [u32; 2],
    pub material: Material,
}

impl SceneObject {
    pub fn new(start: u32, length: u32, material: Material) -> Self {
        Self {
            start,
            length,
            _padding: [0; 2],
            material,
        }
    }
}

/// Layout of the debug counter buffer written by the instrumented trace kernel.
pub struct DebugCounters;

impl DebugCounters {
    pub const MAX_CHECKS: usize = 0;
    pub const TOTAL_CHECKS: usize = 1;
    pub const MAX_STACK_DEPTH: usize = 2;
    pub const LEN: usize = 3;
}

/// Push constants of the two reduction kernels
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct ReduceParams {
    pub input_len: u32,
    pub output_len: u32,
    pub block_size: u32,
    pub _padding: u32,
}

/// Push constants of the Morton code kernel
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct MortonParams {
    pub triangle_count: u32,
    pub _padding: [u32; 3],
}

/// Push constants shared by the count and scatter kernels of one digit pass
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct SortParams {
    pub len: u32,
    pub pass_index: u32,
    /// Number of W-key slices, i.e. the row length of the `[digit][slice]` count table.
    pub slices: u32,
    pub _padding: u32,
}

/// Push constants of one scan level
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct ScanParams {
    pub len: u32,
    pub write_sums: u32,
    pub _padding: [u32; 2],
}

/// Push constants of the tree build, refit and line kernels
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct BuildParams {
    pub leaf_count: u32,
    pub _padding: [u32; 3],
}

impl BuildParams {
    pub fn node_count(&self) -> u32 {
        self.leaf_count.saturating_sub(1)
    }
}

/// Push constants of the path trace kernel
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TraceParams {
    pub width: u32,
    pub height: u32,
    /// 1-based progressive frame counter.
    pub frame: u32,
    pub bounces: u32,
    pub node_count: u32,
    pub triangle_count: u32,
    pub _padding: [u32; 2],
}

/// Ceiling division used for dispatch sizes and level lengths.
pub const fn div_ceil(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}
