//! 30-bit Morton codes over a normalized centroid.

use crate::reduce::load_point;
use crate::Aabb;
use glam::Vec3;

/// Spread the low 10 bits of `v` so two zero bits separate each original bit.
pub fn expand_bits(v: u32) -> u32 {
    let mut v = v;
    v = v.wrapping_mul(0x0001_0001) & 0xFF00_00FF;
    v = v.wrapping_mul(0x0000_0101) & 0x0F00_F00F;
    v = v.wrapping_mul(0x0000_0011) & 0xC30C_30C3;
    v = v.wrapping_mul(0x0000_0005) & 0x4924_9249;
    v
}

/// Interleave a point in the unit cube into a 30-bit key, `x` taking the top bit of each triple.
pub fn morton3d(p: Vec3) -> u32 {
    let x = (p.x * 1024.0).max(0.0).min(1023.0);
    let y = (p.y * 1024.0).max(0.0).min(1023.0);
    let z = (p.z * 1024.0).max(0.0).min(1023.0);
    let xx = expand_bits(x as u32);
    let yy = expand_bits(y as u32);
    let zz = expand_bits(z as u32);
    (xx << 2) | (yy << 1) | zz
}

/// Centroid of triangle `triangle` from the shared position/index arrays.
pub fn triangle_centroid(positions: &[f32], indices: &[u32], triangle: u32) -> Vec3 {
    let base = 3 * triangle as usize;
    let a = load_point(positions, indices[base]);
    let b = load_point(positions, indices[base + 1]);
    let c = load_point(positions, indices[base + 2]);
    (a + b + c) / 3.0
}

/// Morton code of a triangle centroid relative to the scene bounds.
pub fn triangle_morton_code(positions: &[f32], indices: &[u32], scene: &Aabb, triangle: u32) -> u32 {
    morton3d(scene.normalize_point(triangle_centroid(positions, indices, triangle)))
}

#[cfg(test)]
mod test {
    use super::*;
    use glam::vec3;

    #[test]
    fn test_expand_bits() {
        assert_eq!(expand_bits(0), 0);
        assert_eq!(expand_bits(1), 1);
        assert_eq!(expand_bits(0b11), 0b1001);
        assert_eq!(expand_bits(0b101), 0b1_000_001);
        assert_eq!(expand_bits(1023), 0x0924_9249);
    }

    #[test]
    fn test_morton_interleave_order() {
        assert_eq!(morton3d(Vec3::ZERO), 0);
        assert_eq!(morton3d(vec3(1.0, 1.0, 1.0)), (1 << 30) - 1);
        // a unit step on x lands above y, which lands above z
        let step = 1.0 / 1024.0;
        assert_eq!(morton3d(vec3(step, 0.0, 0.0)), 0b100);
        assert_eq!(morton3d(vec3(0.0, step, 0.0)), 0b010);
        assert_eq!(morton3d(vec3(0.0, 0.0, step)), 0b001);
    }

    #[test]
    fn test_morton_clamps_outside_unit_cube() {
        assert_eq!(morton3d(vec3(-3.0, -0.1, -100.0)), 0);
        assert_eq!(morton3d(vec3(7.0, 2.0, 1.5)), morton3d(Vec3::ONE));
    }

    #[test]
    fn test_triangle_morton_code_uses_scene_bounds() {
        let positions = [0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 3.0, 0.0];
        let indices = [0, 1, 2];
        assert_eq!(triangle_centroid(&positions, &indices, 0), vec3(1.0, 1.0, 0.0));

        let scene = Aabb::new([0.0; 3], [2.0, 2.0, 0.0]);
        let code = triangle_morton_code(&positions, &indices, &scene, 0);
        assert_eq!(code, morton3d(vec3(0.5, 0.5, 0.0)));
    }
}
