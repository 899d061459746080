use pathtracer_shared::LineOverlay;
use spirv_std::glam::{vec2, vec4, UVec2, Vec2, Vec4};
use spirv_std::{spirv, Image, Sampler};

/// Fullscreen triangle; `uv` spans the visible part in `[0, 1]` with v pointing down.
#[spirv(vertex)]
pub fn display_vs(
    #[spirv(vertex_index)] vertex_index: i32,
    #[spirv(position)] out_pos: &mut Vec4,
    uv: &mut Vec2,
) {
    let x = if vertex_index == 1 { 3.0 } else { -1.0 };
    let y = if vertex_index == 2 { 3.0 } else { -1.0 };

    *out_pos = vec4(x, y, 0.0, 1.0);
    *uv = vec2((x + 1.0) * 0.5, 1.0 - (y + 1.0) * 0.5);
}

#[spirv(fragment)]
pub fn display_fs(
    uv: Vec2,
    #[spirv(descriptor_set = 0, binding = 0)] texture: &Image!(2D, type = f32, sampled),
    #[spirv(descriptor_set = 0, binding = 1)] sampler: &Sampler,
    output: &mut Vec4,
) {
    *output = texture.sample(*sampler, uv);
}

/// BVH overlay vertex: world space box corner with the depth level of its node.
#[spirv(vertex)]
pub fn bvh_lines_vs(
    position: Vec4,
    level: u32,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] overlay: &LineOverlay,
    #[spirv(position)] out_pos: &mut Vec4,
    #[spirv(flat)] out_level: &mut u32,
    out_depth: &mut f32,
) {
    let view_position = overlay.view * pathtracer_shared::glam::Vec4::from_array(position.to_array());
    let clip = overlay.projection * view_position;
    *out_pos = Vec4::from_array(clip.to_array());
    *out_level = level;
    *out_depth = -view_position.z;
}

/// Keeps fragments of the selected levels that lie in front of the traced surface.
#[spirv(fragment)]
pub fn bvh_lines_fs(
    #[spirv(frag_coord)] frag_coord: Vec4,
    #[spirv(flat)] level: u32,
    depth: f32,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] overlay: &LineOverlay,
    #[spirv(descriptor_set = 0, binding = 1)] traced_depth: &Image!(2D, type = f32, sampled),
    output: &mut Vec4,
) {
    if !overlay.shows(level) {
        spirv_std::arch::kill();
    }
    let (x, y) = overlay.texel(frag_coord.x, frag_coord.y);
    let surface: Vec4 = traced_depth.fetch(UVec2::new(x, y));
    if surface.x < depth {
        spirv_std::arch::kill();
    }
    *output = Vec4::from_array(overlay.color.to_array());
}
