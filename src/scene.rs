use std::f32::consts::PI;

use log::info;
use pathtracer_shared::glam::{vec3, Vec3};
use pathtracer_shared::trace::SceneView;
use pathtracer_shared::{Aabb, BvhNode, CameraUniform, Material, SceneObject};

use crate::buffers::StorageBuffer;
use crate::error::{RenderError, Result};

/// Flattened triangle soup with one material per object
///
/// `positions` and `normals` are packed `xyz` triples indexed by `indices`; object `k` owns
/// the triangles `objects[k].start .. start + length`.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    pub objects: Vec<SceneObject>,
    pub triangle_to_object: Vec<u32>,
    /// Camera shipped with the scene file, if any.
    pub camera: Option<CameraUniform>,
}

impl Scene {
    pub fn vertex_count(&self) -> u32 {
        (self.positions.len() / 3) as u32
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Rejects inconsistent buffers before they reach a kernel.
    pub fn validate(&self) -> Result<()> {
        if self.positions.len() % 3 != 0 {
            return Err(RenderError::Scene(format!(
                "position array length {} is not a multiple of 3",
                self.positions.len()
            )));
        }
        if self.normals.len() != self.positions.len() {
            return Err(RenderError::Scene(format!(
                "{} normal components for {} position components",
                self.normals.len(),
                self.positions.len()
            )));
        }
        if self.indices.len() % 3 != 0 {
            return Err(RenderError::Scene(format!(
                "index array length {} is not a multiple of 3",
                self.indices.len()
            )));
        }

        let vertex_count = self.vertex_count();
        if let Some((slot, index)) = self.indices.iter().enumerate().find(|(_, &i)| i >= vertex_count) {
            return Err(RenderError::Scene(format!(
                "index {} at slot {} out of range for {} vertices",
                index, slot, vertex_count
            )));
        }

        if self.triangle_to_object.len() != self.triangle_count() as usize {
            return Err(RenderError::Scene(format!(
                "{} triangle-to-object entries for {} triangles",
                self.triangle_to_object.len(),
                self.triangle_count()
            )));
        }
        let object_count = self.objects.len() as u32;
        if let Some(object) = self.triangle_to_object.iter().find(|&&o| o >= object_count) {
            return Err(RenderError::Scene(format!(
                "triangle refers to object {} of {}",
                object, object_count
            )));
        }
        Ok(())
    }

    /// Box over every vertex.
    pub fn bounds(&self) -> Aabb {
        self.positions
            .chunks_exact(3)
            .fold(Aabb::EMPTY, |acc, p| acc.grow(vec3(p[0], p[1], p[2])))
    }

    /// Trace view over this scene and a built tree.
    pub fn view<'a>(&'a self, nodes: &'a [BvhNode], node_bounds: &'a [Aabb]) -> SceneView<'a> {
        SceneView {
            positions: &self.positions,
            normals: &self.normals,
            indices: &self.indices,
            triangle_to_object: &self.triangle_to_object,
            objects: &self.objects,
            nodes,
            node_bounds,
            node_count: nodes.len() as u32,
            triangle_count: self.triangle_count(),
        }
    }

    /// Cornell style box: red and green side walls, a ceiling light panel, a diffuse block
    /// and a rough metal sphere.
    pub fn cornell_box() -> Self {
        let white = Material::diffuse([0.73, 0.73, 0.73]);
        let red = Material::diffuse([0.65, 0.05, 0.05]);
        let green = Material::diffuse([0.12, 0.45, 0.15]);

        let mut builder = SceneBuilder::new();
        builder.add_quad(vec3(-1.0, 0.0, -1.0), vec3(0.0, 0.0, 2.0), vec3(2.0, 0.0, 0.0), white);
        builder.add_quad(vec3(-1.0, 2.0, -1.0), vec3(2.0, 0.0, 0.0), vec3(0.0, 0.0, 2.0), white);
        builder.add_quad(vec3(-1.0, 0.0, -1.0), vec3(2.0, 0.0, 0.0), vec3(0.0, 2.0, 0.0), white);
        builder.add_quad(vec3(-1.0, 0.0, -1.0), vec3(0.0, 2.0, 0.0), vec3(0.0, 0.0, 2.0), red);
        builder.add_quad(vec3(1.0, 0.0, -1.0), vec3(0.0, 0.0, 2.0), vec3(0.0, 2.0, 0.0), green);
        builder.add_quad(
            vec3(-0.3, 1.98, -0.3),
            vec3(0.6, 0.0, 0.0),
            vec3(0.0, 0.0, 0.6),
            Material::emissive([1.0, 0.9, 0.8], 15.0),
        );
        builder.add_box(vec3(-0.7, 0.0, -0.6), vec3(-0.1, 1.2, 0.0), white);
        builder.add_uv_sphere(
            vec3(0.45, 0.4, 0.2),
            0.4,
            24,
            32,
            Material::diffuse([0.9, 0.9, 0.9]).with_roughness(0.2).with_metalness(1.0),
        );

        let mut scene = builder.build();
        scene.camera = Some(CameraUniform::look_at(
            vec3(0.0, 1.0, 3.8),
            vec3(0.0, 1.0, 0.0),
            Vec3::Y,
            40.0,
            0.01,
            1000.0,
        ));
        scene
    }
}

/// Incremental scene assembly; every `add_*` call creates one object.
#[derive(Default)]
pub struct SceneBuilder {
    scene: Scene,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an indexed mesh; `indices` are relative to `positions`. Returns the object id.
    pub fn add_mesh(&mut self, positions: &[Vec3], normals: &[Vec3], indices: &[u32], material: Material) -> u32 {
        let base = self.scene.vertex_count();
        let start = self.scene.triangle_count();
        let object = self.scene.objects.len() as u32;

        for (p, n) in positions.iter().zip(normals) {
            self.scene.positions.extend_from_slice(&p.to_array());
            self.scene.normals.extend_from_slice(&n.to_array());
        }
        self.scene.indices.extend(indices.iter().map(|i| base + i));

        let length = (indices.len() / 3) as u32;
        self.scene
            .triangle_to_object
            .extend(std::iter::repeat(object).take(length as usize));
        self.scene.objects.push(SceneObject::new(start, length, material));
        object
    }

    /// Single flat shaded triangle.
    pub fn add_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3, material: Material) -> u32 {
        let n = (b - a).cross(c - a).normalize();
        self.add_mesh(&[a, b, c], &[n; 3], &[0, 1, 2], material)
    }

    /// Parallelogram `corner + s * u + t * v`, facing `u x v`.
    pub fn add_quad(&mut self, corner: Vec3, u: Vec3, v: Vec3, material: Material) -> u32 {
        let n = u.cross(v).normalize();
        self.add_mesh(&[corner, corner + u, corner + u + v, corner + v], &[n; 4], &[0, 1, 2, 0, 2, 3], material)
    }

    /// Axis aligned box with outward faces as a single object.
    pub fn add_box(&mut self, min: Vec3, max: Vec3, material: Material) -> u32 {
        let size = max - min;
        let (dx, dy, dz) = (vec3(size.x, 0.0, 0.0), vec3(0.0, size.y, 0.0), vec3(0.0, 0.0, size.z));
        let faces = [
            (min, dx, dz),
            (min + dy, dz, dx),
            (min, dy, dx),
            (min + dz, dx, dy),
            (min, dz, dy),
            (min + dx, dy, dz),
        ];

        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (corner, u, v) in faces {
            let base = positions.len() as u32;
            let n = u.cross(v).normalize();
            positions.extend_from_slice(&[corner, corner + u, corner + u + v, corner + v]);
            normals.extend_from_slice(&[n; 4]);
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        self.add_mesh(&positions, &normals, &indices, material)
    }

    /// Latitude/longitude sphere with smooth normals; the pole caps skip their degenerate
    /// halves.
    pub fn add_uv_sphere(&mut self, center: Vec3, radius: f32, rings: u32, segments: u32, material: Material) -> u32 {
        let rings = rings.max(2);
        let segments = segments.max(3);

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        for r in 0..=rings {
            let theta = PI * r as f32 / rings as f32;
            for s in 0..=segments {
                let phi = 2.0 * PI * s as f32 / segments as f32;
                let n = vec3(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                positions.push(center + n * radius);
                normals.push(n);
            }
        }

        let mut indices = Vec::new();
        let row = segments + 1;
        for r in 0..rings {
            for s in 0..segments {
                let i0 = r * row + s;
                let i1 = i0 + row;
                if r != 0 {
                    indices.extend_from_slice(&[i0, i1, i0 + 1]);
                }
                if r != rings - 1 {
                    indices.extend_from_slice(&[i0 + 1, i1, i1 + 1]);
                }
            }
        }
        self.add_mesh(&positions, &normals, &indices, material)
    }

    pub fn build(self) -> Scene {
        info!(
            "Built scene: {} objects, {} triangles, {} vertices",
            self.scene.objects.len(),
            self.scene.triangle_count(),
            self.scene.vertex_count()
        );
        self.scene
    }
}

/// Device copies of the scene arrays
pub struct SceneBuffers {
    pub positions: StorageBuffer<f32>,
    pub normals: StorageBuffer<f32>,
    pub indices: StorageBuffer<u32>,
    pub triangle_to_object: StorageBuffer<u32>,
    pub objects: StorageBuffer<SceneObject>,
    pub vertex_count: u32,
    pub triangle_count: u32,
}

impl SceneBuffers {
    /// One-element placeholders so bind groups exist before any scene is set.
    pub fn empty(device: &wgpu::Device) -> Self {
        Self {
            positions: StorageBuffer::new(device, "Scene Positions Buffer", 1),
            normals: StorageBuffer::new(device, "Scene Normals Buffer", 1),
            indices: StorageBuffer::new(device, "Scene Index Buffer", 1),
            triangle_to_object: StorageBuffer::new(device, "Triangle To Object Buffer", 1),
            objects: StorageBuffer::new(device, "Scene Objects Buffer", 1),
            vertex_count: 0,
            triangle_count: 0,
        }
    }

    /// Uploads `scene`, growing buffers as needed. Returns true if any buffer was replaced.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &Scene) -> bool {
        let mut resized = self.positions.write(device, queue, &scene.positions);
        resized |= self.normals.write(device, queue, &scene.normals);
        resized |= self.indices.write(device, queue, &scene.indices);
        resized |= self.triangle_to_object.write(device, queue, &scene.triangle_to_object);
        resized |= self.objects.write(device, queue, &scene.objects);
        self.vertex_count = scene.vertex_count();
        self.triangle_count = scene.triangle_count();

        info!(
            "Uploaded scene: {} triangles, {} vertices, {} objects",
            self.triangle_count,
            self.vertex_count,
            scene.objects.len()
        );
        resized
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_builder_offsets_indices() {
        let mut builder = SceneBuilder::new();
        let first = builder.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, Material::default());
        let second = builder.add_quad(Vec3::Z, Vec3::X, Vec3::Y, Material::emissive([1.0; 3], 2.0));
        let scene = builder.build();

        assert_eq!((first, second), (0, 1));
        assert_eq!(scene.triangle_count(), 3);
        assert_eq!(scene.indices, vec![0, 1, 2, 3, 4, 5, 3, 5, 6]);
        assert_eq!(scene.triangle_to_object, vec![0, 1, 1]);
        assert_eq!(scene.objects[1].start, 1);
        assert_eq!(scene.objects[1].length, 2);
        scene.validate().unwrap();
    }

    #[test]
    fn test_quad_faces_u_cross_v() {
        let mut builder = SceneBuilder::new();
        builder.add_quad(Vec3::ZERO, Vec3::X, Vec3::Z, Material::default());
        let scene = builder.build();
        assert_eq!(&scene.normals[0..3], &[0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_validate_rejects_bad_index() {
        let mut scene = Scene::cornell_box();
        scene.validate().unwrap();
        let vertex_count = scene.vertex_count();
        scene.indices[4] = vertex_count;
        assert!(matches!(scene.validate(), Err(RenderError::Scene(_))));
    }

    #[test]
    fn test_validate_rejects_normal_mismatch() {
        let mut scene = Scene::cornell_box();
        scene.normals.pop();
        assert!(matches!(scene.validate(), Err(RenderError::Scene(_))));
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let mut builder = SceneBuilder::new();
        let center = vec3(1.0, 2.0, 3.0);
        builder.add_uv_sphere(center, 0.5, 6, 8, Material::default());
        let scene = builder.build();

        // Two caps of 8 triangles plus 4 full bands of 16.
        assert_eq!(scene.triangle_count(), 2 * 8 + 4 * 16);
        for p in scene.positions.chunks_exact(3) {
            let d = vec3(p[0], p[1], p[2]).distance(center);
            assert!((d - 0.5).abs() < 1e-5);
        }
        let bounds = scene.bounds();
        assert!((bounds.max_vec() - (center + Vec3::splat(0.5))).abs().max_element() < 1e-5);
    }

    #[test]
    fn test_box_normals_point_outward() {
        let mut builder = SceneBuilder::new();
        builder.add_box(Vec3::ZERO, Vec3::ONE, Material::default());
        let scene = builder.build();
        let center = Vec3::splat(0.5);
        for (p, n) in scene.positions.chunks_exact(3).zip(scene.normals.chunks_exact(3)) {
            let p = vec3(p[0], p[1], p[2]);
            let n = vec3(n[0], n[1], n[2]);
            assert!((p - center).dot(n) > 0.0);
        }
    }
}
