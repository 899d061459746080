use crate::{Aabb, PathTracerConfig};
use glam::Vec3;

#[cfg(target_arch = "spirv")]
use spirv_std::num_traits::Float;

/// Ray with its precomputed reciprocal direction for slab tests
#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub direction_inverse: Vec3,
}

impl Ray {
    /// The origin is nudged along `direction` by [`PathTracerConfig::EPSILON`] so bounce rays
    /// do not re-hit the surface they leave.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin: origin + direction * PathTracerConfig::EPSILON,
            direction,
            direction_inverse: Vec3::ONE / direction,
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Closest hit found so far. `distance < 0` means no hit.
#[derive(Copy, Clone, Debug)]
pub struct Intersection {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub triangle: u32,
}

impl Intersection {
    pub fn miss() -> Self {
        Self {
            point: Vec3::ZERO,
            normal: Vec3::ZERO,
            distance: -1.0,
            triangle: 0,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.distance >= 0.0
    }

    /// Would a hit at `distance` be nearer than this one?
    pub fn accepts(&self, distance: f32) -> bool {
        !self.is_hit() || distance < self.distance
    }
}

/// Triangle vertices with per-vertex normals
#[derive(Copy, Clone, Debug)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
    pub normal_a: Vec3,
    pub normal_b: Vec3,
    pub normal_c: Vec3,
}

impl Triangle {
    /// Flat triangle with the geometric normal on every vertex.
    pub fn flat(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let n = (b - a).cross(c - a).normalize();
        Self {
            a,
            b,
            c,
            normal_a: n,
            normal_b: n,
            normal_c: n,
        }
    }

    /// Barycentric weights `(u, v, w)` of `point` for vertices `(a, b, c)`.
    pub fn barycentric(&self, point: Vec3) -> Vec3 {
        let v0 = self.b - self.a;
        let v1 = self.c - self.a;
        let v2 = point - self.a;
        let d00 = v0.dot(v0);
        let d01 = v0.dot(v1);
        let d11 = v1.dot(v1);
        let d20 = v2.dot(v0);
        let d21 = v2.dot(v1);
        let den = d00 * d11 - d01 * d01;
        let v = (d11 * d20 - d01 * d21) / den;
        let w = (d00 * d21 - d01 * d20) / den;
        Vec3::new(1.0 - v - w, v, w)
    }
}

/// Distance along the ray to the plane `dot(p, normal) = offset`, `-1` if parallel or behind.
pub fn ray_plane_distance(ray: &Ray, normal: Vec3, offset: f32) -> f32 {
    let den = ray.direction.dot(normal);
    if den == 0.0 {
        return -1.0;
    }
    let t = (offset - ray.origin.dot(normal)) / den;
    if t < 0.0 {
        return -1.0;
    }
    t
}

/// Slab test returning the entry distance, or `-1` when the ray misses the box or the box
/// lies entirely behind the origin. An origin inside the box enters at `0`.
pub fn ray_aabb_distance(ray: &Ray, aabb: &Aabb) -> f32 {
    let t1 = (aabb.min_vec() - ray.origin) * ray.direction_inverse;
    let t2 = (aabb.max_vec() - ray.origin) * ray.direction_inverse;

    let mut tmin = -PathTracerConfig::INFINITY;
    let mut tmax = PathTracerConfig::INFINITY;

    tmin = tmin.max(t1.x.min(t2.x));
    tmin = tmin.max(t1.y.min(t2.y));
    tmin = tmin.max(t1.z.min(t2.z));

    tmax = tmax.min(t1.x.max(t2.x));
    tmax = tmax.min(t1.y.max(t2.y));
    tmax = tmax.min(t1.z.max(t2.z));

    if tmin > tmax || tmax < 0.0 {
        return -1.0;
    }
    tmin.max(0.0)
}

/// Plane then barycentric containment test of `triangle` against `ray`.
///
/// Returns a miss when the plane hit is behind the ray, not nearer than `closest`, or outside
/// the triangle. The hit normal interpolates the vertex normals.
pub fn ray_triangle(ray: &Ray, triangle: &Triangle, index: u32, closest: &Intersection) -> Intersection {
    let normal = (triangle.b - triangle.a).cross(triangle.c - triangle.a).normalize();
    let distance = ray_plane_distance(ray, normal, triangle.a.dot(normal));

    if distance < 0.0 || (closest.is_hit() && closest.distance < distance) {
        return Intersection::miss();
    }

    let point = ray.at(distance);
    let bary = triangle.barycentric(point);
    if bary.x < 0.0 || bary.x > 1.0 || bary.y < 0.0 || bary.y > 1.0 || bary.z < 0.0 || bary.z > 1.0 {
        return Intersection::miss();
    }

    let shading_normal = (triangle.normal_a * bary.x + triangle.normal_b * bary.y + triangle.normal_c * bary.z)
        .normalize();

    Intersection {
        point,
        normal: shading_normal,
        distance,
        triangle: index,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use glam::vec3;

    fn unit_triangle() -> Triangle {
        Triangle::flat(vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0))
    }

    #[test]
    fn test_ray_hits_triangle_interior() {
        let ray = Ray::new(vec3(0.25, 0.25, 2.0), vec3(0.0, 0.0, -1.0));
        let hit = ray_triangle(&ray, &unit_triangle(), 3, &Intersection::miss());
        assert!(hit.is_hit());
        assert_eq!(hit.triangle, 3);
        assert!((hit.distance - (2.0 - PathTracerConfig::EPSILON)).abs() < 1e-5);
        assert!((hit.normal - vec3(0.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_ray_misses_outside_and_behind() {
        let outside = Ray::new(vec3(0.8, 0.8, 1.0), vec3(0.0, 0.0, -1.0));
        assert!(!ray_triangle(&outside, &unit_triangle(), 0, &Intersection::miss()).is_hit());

        let behind = Ray::new(vec3(0.25, 0.25, 1.0), vec3(0.0, 0.0, 1.0));
        assert!(!ray_triangle(&behind, &unit_triangle(), 0, &Intersection::miss()).is_hit());

        let parallel = Ray::new(vec3(0.25, 0.25, 1.0), vec3(1.0, 0.0, 0.0));
        assert!(!ray_triangle(&parallel, &unit_triangle(), 0, &Intersection::miss()).is_hit());
    }

    #[test]
    fn test_closer_hit_rejects_farther_triangle() {
        let ray = Ray::new(vec3(0.25, 0.25, 5.0), vec3(0.0, 0.0, -1.0));
        let mut closest = Intersection::miss();
        closest.distance = 1.0;
        assert!(!ray_triangle(&ray, &unit_triangle(), 0, &closest).is_hit());
        assert!(closest.accepts(0.5));
        assert!(!closest.accepts(2.0));
    }

    #[test]
    fn test_barycentric_corners() {
        let tri = unit_triangle();
        assert_eq!(tri.barycentric(tri.a), vec3(1.0, 0.0, 0.0));
        assert_eq!(tri.barycentric(tri.b), vec3(0.0, 1.0, 0.0));
        assert_eq!(tri.barycentric(tri.c), vec3(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_slab_distance() {
        let aabb = Aabb::new([-1.0; 3], [1.0; 3]);
        let ray = Ray::new(vec3(0.0, 0.0, -5.0), vec3(0.0, 0.0, 1.0));
        let t = ray_aabb_distance(&ray, &aabb);
        assert!((t - (4.0 - PathTracerConfig::EPSILON)).abs() < 1e-5);

        let away = Ray::new(vec3(0.0, 3.0, -5.0), vec3(0.0, 0.0, 1.0));
        assert_eq!(ray_aabb_distance(&away, &aabb), -1.0);

        let inside = Ray::new(Vec3::ZERO, vec3(1.0, 0.0, 0.0));
        assert_eq!(ray_aabb_distance(&inside, &aabb), 0.0);
    }

    #[test]
    fn test_slab_rejects_box_behind_origin() {
        let aabb = Aabb::new([-1.0; 3], [1.0; 3]);
        let behind = Ray::new(vec3(0.0, 0.0, 5.0), vec3(0.0, 0.0, 1.0));
        assert!(ray_aabb_distance(&behind, &aabb) < 0.0);

        // entry about one unit behind the origin, exit in front
        let straddling = Ray::new(vec3(0.0, 0.0, 1.0 + PathTracerConfig::EPSILON), vec3(0.0, 0.0, -1.0));
        let aabb = Aabb::new([-1.0, -1.0, -1.0], [1.0, 1.0, 2.0]);
        assert_eq!(ray_aabb_distance(&straddling, &aabb), 0.0);
    }
}
