use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Axis aligned bounding box, padded to the 16 byte vec3 stride of storage buffers
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Aabb {
    pub min: [f32; 3],
    pub _padding0: f32,
    pub max: [f32; 3],
    pub _padding1: f32,
}

impl Aabb {
    /// Identity of [`Aabb::union`]: inverted extremes.
    pub const EMPTY: Aabb = Aabb {
        min: [f32::MAX; 3],
        _padding0: 0.0,
        max: [f32::MIN; 3],
        _padding1: 0.0,
    };

    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min,
            _padding0: 0.0,
            max,
            _padding1: 0.0,
        }
    }

    pub fn from_vecs(min: Vec3, max: Vec3) -> Self {
        Self::new(min.to_array(), max.to_array())
    }

    pub fn from_point(point: Vec3) -> Self {
        Self::from_vecs(point, point)
    }

    pub fn from_triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self::from_vecs(a.min(b).min(c), a.max(b).max(c))
    }

    pub fn min_vec(&self) -> Vec3 {
        Vec3::from_array(self.min)
    }

    pub fn max_vec(&self) -> Vec3 {
        Vec3::from_array(self.max)
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Self::from_vecs(
            self.min_vec().min(other.min_vec()),
            self.max_vec().max(other.max_vec()),
        )
    }

    pub fn grow(&self, point: Vec3) -> Aabb {
        Self::from_vecs(self.min_vec().min(point), self.max_vec().max(point))
    }

    pub fn center(&self) -> Vec3 {
        (self.min_vec() + self.max_vec()) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max_vec() - self.min_vec()
    }

    /// True once populated: `min <= max` on every axis.
    pub fn is_valid(&self) -> bool {
        self.min[0] <= self.max[0] && self.min[1] <= self.max[1] && self.min[2] <= self.max[2]
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min[0] <= other.min[0]
            && self.min[1] <= other.min[1]
            && self.min[2] <= other.min[2]
            && self.max[0] >= other.max[0]
            && self.max[1] >= other.max[1]
            && self.max[2] >= other.max[2]
    }

    /// Position of `point` inside the box scaled to `[0, 1]` per axis.
    ///
    /// Flat axes map to 0 instead of dividing by a zero extent.
    pub fn normalize_point(&self, point: Vec3) -> Vec3 {
        let relative = point - self.min_vec();
        let extent = self.extent();
        let axis = |r: f32, e: f32| if e > 0.0 { r / e } else { 0.0 };
        Vec3::new(
            axis(relative.x, extent.x),
            axis(relative.y, extent.y),
            axis(relative.z, extent.z),
        )
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use glam::vec3;

    #[test]
    fn test_aabb_union() {
        let aabb1 = Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let aabb2 = Aabb::new([0.5, 0.5, 0.5], [2.0, 2.0, 2.0]);

        let union = aabb1.union(&aabb2);
        assert_eq!(union.min, [0.0, 0.0, 0.0]);
        assert_eq!(union.max, [2.0, 2.0, 2.0]);
        assert_eq!(Aabb::EMPTY.union(&aabb1), aabb1);
    }

    #[test]
    fn test_triangle_bounding_box() {
        let bbox = Aabb::from_triangle(vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.5, 1.0, -2.0));
        assert_eq!(bbox.min, [0.0, 0.0, -2.0]);
        assert_eq!(bbox.max, [1.0, 1.0, 0.0]);
        assert!(bbox.is_valid());
        assert!(!Aabb::EMPTY.is_valid());
    }

    #[test]
    fn test_aabb_contains() {
        let outer = Aabb::new([-1.0; 3], [1.0; 3]);
        let inner = Aabb::new([-0.5, 0.0, 0.0], [1.0, 0.5, 0.5]);
        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_normalize_flat_axis() {
        let flat = Aabb::new([0.0, 2.0, -4.0], [4.0, 2.0, 4.0]);
        let p = flat.normalize_point(vec3(1.0, 2.0, 0.0));
        assert_eq!(p, vec3(0.25, 0.0, 0.5));
    }
}
