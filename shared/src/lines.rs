//! Line-list geometry of the tree's boxes for debug overlays.

use crate::{Aabb, BvhNode, CameraUniform, PathTracerConfig};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Vertices written per node: 12 edges, two endpoints each.
pub const LINE_VERTICES: usize = PathTracerConfig::LINE_VERTICES_PER_NODE as usize;

/// Number of parent links between `node` and the root.
pub fn node_level(nodes: &[BvhNode], node: u32) -> u32 {
    let mut level = 0;
    let mut current = node;
    while current != 0 {
        current = nodes[current as usize].parent;
        level += 1;
    }
    level
}

/// Whether a box at depth `level` is drawn when the overlay targets `target`: only that level,
/// or that level and every shallower one with `show_parents`.
pub fn level_visible(level: u32, target: u32, show_parents: bool) -> bool {
    if show_parents {
        level <= target
    } else {
        level == target
    }
}

/// Settings and camera of the BVH line overlay, read by both overlay shader stages
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct LineOverlay {
    pub view: Mat4,
    pub projection: Mat4,
    pub color: Vec4,
    pub level: u32,
    pub show_parents: u32,
    /// Size of the traced depth image the fragments compare against.
    pub width: u32,
    pub height: u32,
}

impl LineOverlay {
    pub const DEFAULT_COLOR: [f32; 4] = [0.25, 0.9, 0.25, 0.3];
    pub const DEFAULT_LEVEL: u32 = 5;

    /// Same overlay seen from `camera` over a `width` by `height` image.
    pub fn with_camera(self, camera: &CameraUniform, width: u32, height: u32) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(width, height),
            width,
            height,
            ..self
        }
    }

    pub fn shows(&self, level: u32) -> bool {
        level_visible(level, self.level, self.show_parents != 0)
    }

    /// Depth image texel under the fragment at `(x, y)`, clamped to the image.
    pub fn texel(&self, x: f32, y: f32) -> (u32, u32) {
        let max_x = if self.width > 0 { self.width - 1 } else { 0 };
        let max_y = if self.height > 0 { self.height - 1 } else { 0 };
        ((x.max(0.0) as u32).min(max_x), (y.max(0.0) as u32).min(max_y))
    }
}

impl Default for LineOverlay {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            color: Vec4::from_array(Self::DEFAULT_COLOR),
            level: Self::DEFAULT_LEVEL,
            show_parents: 1,
            width: 0,
            height: 0,
        }
    }
}

fn swap_axis(a: &mut [f32; 4], b: &mut [f32; 4], axis: usize) {
    let t = a[axis];
    a[axis] = b[axis];
    b[axis] = t;
}

/// The three edges leaving corner `lo`, written at `out[*cursor..]`.
fn corner_edges(lo: &mut [f32; 4], hi: &mut [f32; 4], out: &mut [Vec4; LINE_VERTICES], cursor: &mut usize) {
    let mut axis = 0;
    while axis < 3 {
        out[*cursor] = Vec4::from_array(*lo);
        *cursor += 1;
        swap_axis(lo, hi, axis);
        out[*cursor] = Vec4::from_array(*lo);
        *cursor += 1;
        swap_axis(lo, hi, axis);
        axis += 1;
    }
}

/// Endpoints of the 12 box edges, walking the four corners that together touch every edge once.
pub fn box_lines(aabb: &Aabb) -> [Vec4; LINE_VERTICES] {
    let mut lo = [aabb.min[0], aabb.min[1], aabb.min[2], 1.0];
    let mut hi = [aabb.max[0], aabb.max[1], aabb.max[2], 1.0];
    let mut out = [Vec4::ZERO; LINE_VERTICES];
    let mut cursor = 0;

    corner_edges(&mut lo, &mut hi, &mut out, &mut cursor);

    swap_axis(&mut lo, &mut hi, 0);
    swap_axis(&mut lo, &mut hi, 2);
    corner_edges(&mut lo, &mut hi, &mut out, &mut cursor);

    swap_axis(&mut lo, &mut hi, 1);
    swap_axis(&mut lo, &mut hi, 2);
    corner_edges(&mut lo, &mut hi, &mut out, &mut cursor);

    swap_axis(&mut lo, &mut hi, 0);
    swap_axis(&mut lo, &mut hi, 2);
    corner_edges(&mut lo, &mut hi, &mut out, &mut cursor);

    out
}
