//! Stack based LBVH traversal and the per-pixel path integrator.

use crate::brdf::{brdf, sample_brdf};
use crate::ray::{ray_aabb_distance, ray_triangle, Intersection, Ray, Triangle};
use crate::reduce::load_point;
use crate::rng::Rng;
use crate::{Aabb, BvhNode, CameraUniform, Material, PathTracerConfig, SceneObject};
use glam::{Vec3, Vec4};

/// Read-only view of the scene buffers a trace needs.
///
/// `node_count` and `triangle_count` are the live lengths; the slices may be longer.
pub struct SceneView<'a> {
    pub positions: &'a [f32],
    pub normals: &'a [f32],
    pub indices: &'a [u32],
    pub triangle_to_object: &'a [u32],
    pub objects: &'a [SceneObject],
    pub nodes: &'a [BvhNode],
    pub node_bounds: &'a [Aabb],
    pub node_count: u32,
    pub triangle_count: u32,
}

/// Per-ray work counters recorded by the instrumented trace
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Node box tests plus leaf triangle tests.
    pub checks: u32,
    pub max_stack_depth: u32,
}

impl<'a> SceneView<'a> {
    pub fn triangle(&self, index: u32) -> Triangle {
        let base = 3 * index as usize;
        let a = self.indices[base];
        let b = self.indices[base + 1];
        let c = self.indices[base + 2];
        Triangle {
            a: load_point(self.positions, a),
            b: load_point(self.positions, b),
            c: load_point(self.positions, c),
            normal_a: load_point(self.normals, a),
            normal_b: load_point(self.normals, b),
            normal_c: load_point(self.normals, c),
        }
    }

    pub fn material(&self, triangle: u32) -> Material {
        self.objects[self.triangle_to_object[triangle as usize] as usize].material
    }

    fn test_leaf<const DEBUG: bool>(
        &self,
        ray: &Ray,
        triangle: u32,
        closest: &mut Intersection,
        stats: &mut TraversalStats,
    ) {
        if DEBUG {
            stats.checks += 1;
        }
        let hit = ray_triangle(ray, &self.triangle(triangle), triangle, closest);
        if hit.is_hit() && closest.accepts(hit.distance) {
            *closest = hit;
        }
    }

    /// Closest hit along `ray`.
    ///
    /// Depth-first from the root with a fixed stack of [`PathTracerConfig::TRAVERSAL_STACK_SIZE`]
    /// entries; pushes beyond capacity are dropped. A child box is only descended while its
    /// entry distance is nearer than the best hit so far.
    pub fn intersect<const DEBUG: bool>(&self, ray: &Ray, stats: &mut TraversalStats) -> Intersection {
        let mut closest = Intersection::miss();

        if self.node_count == 0 {
            if self.triangle_count == 1 {
                self.test_leaf::<DEBUG>(ray, 0, &mut closest, stats);
            }
            return closest;
        }

        let mut stack = [0u32; PathTracerConfig::TRAVERSAL_STACK_SIZE];
        let mut top = 1usize;

        while top > 0 {
            if DEBUG && top as u32 > stats.max_stack_depth {
                stats.max_stack_depth = top as u32;
            }

            top -= 1;
            let index = stack[top] as usize;
            let node = self.nodes[index];

            if DEBUG {
                stats.checks += 1;
            }
            let t = ray_aabb_distance(ray, &self.node_bounds[index]);
            if t < 0.0 || !closest.accepts(t) {
                continue;
            }

            if node.left_leaf() {
                self.test_leaf::<DEBUG>(ray, node.left, &mut closest, stats);
            } else if top < PathTracerConfig::TRAVERSAL_STACK_SIZE {
                stack[top] = node.left;
                top += 1;
            }

            if node.right_leaf() {
                self.test_leaf::<DEBUG>(ray, node.right, &mut closest, stats);
            } else if top < PathTracerConfig::TRAVERSAL_STACK_SIZE {
                stack[top] = node.right;
                top += 1;
            }
        }

        closest
    }
}

/// One pixel's contribution to a progressive frame
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PixelSample {
    pub radiance: Vec3,
    /// View depth of the primary hit, [`PathTracerConfig::INFINITY`] on a miss.
    pub depth: f32,
}

/// Radiance estimate through pixel `(x, y)` for one progressive frame.
///
/// Emission at the primary hit plus `bounces` BRDF sampled bounces, clamped to
/// [`PathTracerConfig::FIREFLY_CLAMP`] per channel. Hits outside `[near, far]` are black but
/// still report their depth.
#[allow(clippy::too_many_arguments)]
pub fn trace_pixel<const DEBUG: bool>(
    scene: &SceneView<'_>,
    camera: &CameraUniform,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    frame: u32,
    bounces: u32,
    stats: &mut TraversalStats,
) -> PixelSample {
    let mut rng = Rng::for_pixel(frame, y * width + x);

    let ray = camera.primary_ray(x, y, width, height);
    let hit = scene.intersect::<DEBUG>(&ray, stats);
    if !hit.is_hit() {
        return PixelSample {
            radiance: Vec3::ZERO,
            depth: PathTracerConfig::INFINITY,
        };
    }
    let depth = camera.depth(hit.point);
    if depth < camera.near || depth > camera.far {
        return PixelSample {
            radiance: Vec3::ZERO,
            depth,
        };
    }

    let mut material = scene.material(hit.triangle);
    let mut color = material.radiance();
    let mut factor = Vec3::ONE;
    let mut last_hit = hit;
    let mut last_direction = ray.direction;

    let mut bounce = 0;
    while bounce < bounces {
        let sample = sample_brdf(&material, last_hit.normal, &mut rng);
        if sample.pdf <= 0.0 {
            break;
        }
        let bounce_ray = Ray::new(last_hit.point, sample.direction);
        let bounce_hit = scene.intersect::<DEBUG>(&bounce_ray, stats);
        if !bounce_hit.is_hit() {
            break;
        }

        let bounce_material = scene.material(bounce_hit.triangle);
        let cos_theta = last_hit.normal.dot(sample.direction).max(0.0);
        factor *= brdf(&material, last_hit.normal, -sample.direction, -last_direction) * cos_theta / sample.pdf;
        color += factor * bounce_material.radiance();

        last_hit = bounce_hit;
        last_direction = bounce_ray.direction;
        material = bounce_material;
        bounce += 1;
    }

    PixelSample {
        radiance: color.min(Vec3::splat(PathTracerConfig::FIREFLY_CLAMP)),
        depth,
    }
}

/// Add `color` to a pixel's running sum and return the new sum with the displayed mean.
pub fn accumulate(sum: Vec4, color: Vec3, frame: u32) -> (Vec4, Vec4) {
    let total = sum + color.extend(0.0);
    let mean = total.truncate() / frame as f32;
    (total, mean.extend(1.0))
}

#[cfg(test)]
mod test {
    use super::*;
    use glam::vec3;

    /// Two parallel unit quads facing +z at z = 0 and z = -1, wrapped in a hand built tree.
    struct Fixture {
        positions: Vec<f32>,
        normals: Vec<f32>,
        indices: Vec<u32>,
        triangle_to_object: Vec<u32>,
        objects: Vec<SceneObject>,
        nodes: Vec<BvhNode>,
        node_bounds: Vec<Aabb>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut positions = Vec::new();
            let mut normals = Vec::new();
            for z in [0.0f32, -1.0] {
                for (x, y) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                    positions.extend_from_slice(&[x, y, z]);
                    normals.extend_from_slice(&[0.0, 0.0, 1.0]);
                }
            }
            let indices = vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7];
            let objects = vec![
                SceneObject::new(0, 2, Material::emissive([1.0; 3], 2.0)),
                SceneObject::new(2, 2, Material::emissive([1.0; 3], 7.0)),
            ];
            let near = Aabb::new([-1.0, -1.0, 0.0], [1.0, 1.0, 0.0]);
            let far = Aabb::new([-1.0, -1.0, -1.0], [1.0, 1.0, -1.0]);
            let leaf_pair = |l, r| BvhNode {
                left_is_leaf: 1,
                right_is_leaf: 1,
                left: l,
                right: r,
                parent: 0,
            };
            let nodes = vec![
                BvhNode {
                    left_is_leaf: 0,
                    right_is_leaf: 1,
                    left: 1,
                    right: 3,
                    parent: BvhNode::NO_PARENT,
                },
                BvhNode {
                    left_is_leaf: 0,
                    right_is_leaf: 1,
                    left: 2,
                    right: 2,
                    parent: 0,
                },
                leaf_pair(0, 1),
            ];
            let node_bounds = vec![near.union(&far), near.union(&far), near];
            Self {
                positions,
                normals,
                indices,
                triangle_to_object: vec![0, 0, 1, 1],
                objects,
                nodes,
                node_bounds,
            }
        }

        fn view(&self) -> SceneView<'_> {
            SceneView {
                positions: &self.positions,
                normals: &self.normals,
                indices: &self.indices,
                triangle_to_object: &self.triangle_to_object,
                objects: &self.objects,
                nodes: &self.nodes,
                node_bounds: &self.node_bounds,
                node_count: self.nodes.len() as u32,
                triangle_count: 4,
            }
        }
    }

    #[test]
    fn test_intersect_returns_nearest_triangle() {
        let fixture = Fixture::new();
        let ray = Ray::new(vec3(0.2, 0.3, 5.0), vec3(0.0, 0.0, -1.0));
        let mut stats = TraversalStats::default();
        let hit = fixture.view().intersect::<true>(&ray, &mut stats);
        assert!(hit.is_hit());
        assert!(hit.triangle < 2);
        assert!(hit.point.z.abs() < 1e-5);
        assert!(stats.checks >= 3);
        assert!(stats.max_stack_depth >= 1);

        let below = Ray::new(vec3(0.2, 0.3, -0.5), vec3(0.0, 0.0, -1.0));
        let hit = fixture.view().intersect::<false>(&below, &mut stats);
        assert!(hit.triangle >= 2);
    }

    #[test]
    fn test_untracked_intersect_leaves_stats() {
        let fixture = Fixture::new();
        let ray = Ray::new(vec3(0.0, 0.0, 5.0), vec3(0.0, 0.0, -1.0));
        let mut stats = TraversalStats::default();
        fixture.view().intersect::<false>(&ray, &mut stats);
        assert_eq!(stats, TraversalStats::default());
    }

    #[test]
    fn test_empty_and_single_triangle_scenes() {
        let fixture = Fixture::new();
        let mut view = fixture.view();
        let ray = Ray::new(vec3(0.5, -0.5, 5.0), vec3(0.0, 0.0, -1.0));
        let mut stats = TraversalStats::default();

        view.node_count = 0;
        view.triangle_count = 0;
        assert!(!view.intersect::<true>(&ray, &mut stats).is_hit());

        view.triangle_count = 1;
        let hit = view.intersect::<true>(&ray, &mut stats);
        assert!(hit.is_hit());
        assert_eq!(hit.triangle, 0);
    }

    #[test]
    fn test_trace_pixel_sees_emission_and_clips_depth() {
        let fixture = Fixture::new();
        let mut stats = TraversalStats::default();
        let camera = CameraUniform::look_at(vec3(0.3, 0.2, 3.0), vec3(0.3, 0.2, 0.0), Vec3::Y, 30.0, 0.1, 10.0);
        let sample = trace_pixel::<false>(&fixture.view(), &camera, 2, 2, 5, 5, 1, 0, &mut stats);
        assert_eq!(sample.radiance, Vec3::splat(2.0));
        assert!((sample.depth - 3.0).abs() < 1e-3);

        let clipped = CameraUniform { far: 1.0, ..camera };
        let sample = trace_pixel::<false>(&fixture.view(), &clipped, 2, 2, 5, 5, 1, 0, &mut stats);
        assert_eq!(sample.radiance, Vec3::ZERO);
        assert!((sample.depth - 3.0).abs() < 1e-3);

        let away = CameraUniform::look_at(vec3(0.0, 0.0, 3.0), vec3(0.0, 0.0, 6.0), Vec3::Y, 30.0, 0.1, 10.0);
        let sample = trace_pixel::<false>(&fixture.view(), &away, 2, 2, 5, 5, 1, 0, &mut stats);
        assert_eq!(sample.depth, PathTracerConfig::INFINITY);
    }

    /// Spine of `levels` internal nodes; node `2k` holds the leaf pair node `2k + 1` on the
    /// left and the next spine node on the right, so every level leaves one entry on the
    /// traversal stack. The last spine node ends in triangle `2 * levels`.
    fn spine_tree(levels: u32) -> (Vec<BvhNode>, Vec<Aabb>) {
        let mut nodes = Vec::new();
        for k in 0..levels {
            let spine = 2 * k;
            let last = k + 1 == levels;
            nodes.push(BvhNode {
                left_is_leaf: 0,
                right_is_leaf: last as u32,
                left: spine + 1,
                right: if last { 2 * levels } else { spine + 2 },
                parent: if k == 0 { BvhNode::NO_PARENT } else { spine - 2 },
            });
            nodes.push(BvhNode {
                left_is_leaf: 1,
                right_is_leaf: 1,
                left: 2 * k,
                right: 2 * k + 1,
                parent: spine,
            });
        }
        let everything = Aabb::new([-1.0, -1.0, -2.0], [1.0, 1.0, 2.0]);
        let bounds = vec![everything; nodes.len()];
        (nodes, bounds)
    }

    #[test]
    fn test_traversal_deeper_than_stack_finds_reachable_hit() {
        let levels = 80;
        let (nodes, node_bounds) = spine_tree(levels);
        let triangle_count = 2 * levels + 1;

        // triangle t faces +z at z = -t / 100; the deepest one sits nearest the camera
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        for t in 0..triangle_count {
            let z = if t == 2 * levels { 1.0 } else { -(t as f32) * 0.01 };
            for (x, y) in [(-1.0, -1.0), (1.0, -1.0), (0.0, 1.0)] {
                positions.extend_from_slice(&[x, y, z]);
                normals.extend_from_slice(&[0.0, 0.0, 1.0]);
            }
        }
        let indices: Vec<u32> = (0..3 * triangle_count).collect();
        let triangle_to_object = vec![0; triangle_count as usize];
        let objects = vec![SceneObject::new(0, triangle_count, Material::default())];

        let view = SceneView {
            positions: &positions,
            normals: &normals,
            indices: &indices,
            triangle_to_object: &triangle_to_object,
            objects: &objects,
            nodes: &nodes,
            node_bounds: &node_bounds,
            node_count: nodes.len() as u32,
            triangle_count,
        };

        let ray = Ray::new(vec3(0.0, 0.0, 5.0), vec3(0.0, 0.0, -1.0));
        let mut stats = TraversalStats::default();
        let hit = view.intersect::<true>(&ray, &mut stats);

        assert_eq!(stats.max_stack_depth as usize, PathTracerConfig::TRAVERSAL_STACK_SIZE);
        assert!(hit.is_hit());
        // the spine below the stack capacity is never visited
        assert_eq!(hit.triangle, 0);
        assert!(hit.point.z.abs() < 1e-5);
    }

    #[test]
    fn test_accumulate_divides_by_frame() {
        let (sum, shown) = accumulate(Vec4::new(1.0, 2.0, 3.0, 0.0), vec3(1.0, 0.0, 3.0), 2);
        assert_eq!(sum, Vec4::new(2.0, 2.0, 6.0, 0.0));
        assert_eq!(shown, Vec4::new(1.0, 1.0, 3.0, 1.0));
    }
}
