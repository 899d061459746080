//! Instrumentation read-backs: traversal counters, pass timings and BVH line geometry.

use pathtracer_shared::glam::Vec4;
use pathtracer_shared::lines::level_visible;
use pathtracer_shared::{DebugCounters, PathTracerConfig};

use crate::buffers::read_buffer;
use crate::error::Result;

/// Work and timing summary of the last frame
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DebugStats {
    /// Most node and triangle tests performed by a single pixel.
    pub max_checks: u32,
    pub total_checks: u32,
    /// `total_checks` over the pixel count, rounded up.
    pub average_checks: u32,
    pub max_stack_depth: u32,
    /// Duration of the last BVH build, zero without timestamp support.
    pub bvh_ms: f64,
    pub trace_ms: f64,
}

impl DebugStats {
    pub fn from_counters(counters: &[u32], pixel_count: usize) -> Self {
        let total_checks = counters[DebugCounters::TOTAL_CHECKS];
        let pixels = pixel_count.max(1) as u64;
        Self {
            max_checks: counters[DebugCounters::MAX_CHECKS],
            total_checks,
            average_checks: ((total_checks as u64 + pixels - 1) / pixels) as u32,
            max_stack_depth: counters[DebugCounters::MAX_STACK_DEPTH],
            bvh_ms: 0.0,
            trace_ms: 0.0,
        }
    }
}

/// Timestamp pairs bracketing the build (queries 0, 1) and the trace (queries 2, 3).
///
/// The pairs resolve into separate 256 byte aligned slots, so a frame that skips the
/// build keeps the last build timing.
pub struct TimestampQueries {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    period: f32,
}

impl TimestampQueries {
    pub const BVH_BEGIN: u32 = 0;
    pub const BVH_END: u32 = 1;
    pub const TRACE_BEGIN: u32 = 2;
    pub const TRACE_END: u32 = 3;
    const SLOT: u64 = wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT;

    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Pass Timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: 4,
        });
        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Timestamp Resolve Buffer"),
            size: 2 * Self::SLOT,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            query_set,
            resolve,
            period: queue.get_timestamp_period(),
        }
    }

    pub fn write(&self, encoder: &mut wgpu::CommandEncoder, index: u32) {
        encoder.write_timestamp(&self.query_set, index);
    }

    pub fn resolve_bvh(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, Self::BVH_BEGIN..Self::BVH_END + 1, &self.resolve, 0);
    }

    pub fn resolve_trace(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, Self::TRACE_BEGIN..Self::TRACE_END + 1, &self.resolve, Self::SLOT);
    }

    /// `(bvh_ms, trace_ms)` of the most recent resolves.
    pub fn read_ms(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<(f64, f64)> {
        let ticks: Vec<u64> = read_buffer(device, queue, &self.resolve, (2 * Self::SLOT / 8) as usize)?;
        let trace_base = (Self::SLOT / 8) as usize;
        let to_ms = |begin: u64, end: u64| end.saturating_sub(begin) as f64 * self.period as f64 / 1e6;
        Ok((to_ms(ticks[0], ticks[1]), to_ms(ticks[trace_base], ticks[trace_base + 1])))
    }
}

/// Line-list geometry of every internal node box with the node depth per vertex
#[derive(Clone, Debug, Default)]
pub struct BvhLines {
    pub vertices: Vec<Vec4>,
    pub levels: Vec<u32>,
}

impl BvhLines {
    pub fn node_count(&self) -> usize {
        self.vertices.len() / PathTracerConfig::LINE_VERTICES_PER_NODE as usize
    }

    /// Segments of the boxes at `level`, plus every shallower box when `include_parents`.
    pub fn segments(&self, level: u32, include_parents: bool) -> Vec<[Vec4; 2]> {
        self.vertices
            .chunks_exact(2)
            .zip(self.levels.chunks_exact(2))
            .filter(|(_, l)| level_visible(l[0], level, include_parents))
            .map(|(v, _)| [v[0], v[1]])
            .collect()
    }

    pub fn max_level(&self) -> u32 {
        self.levels.iter().copied().max().unwrap_or(0)
    }
}
