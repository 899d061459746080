use std::path::Path;

use gltf::{Document, Node, Primitive};
use log::{info, warn};
use pathtracer_shared::glam::{Mat3, Mat4, Vec3};
use pathtracer_shared::{CameraUniform, Material};

use crate::error::{RenderError, Result};
use crate::scene::{Scene, SceneBuilder};

/// glTF/GLB importer flattening the default scene into a [`Scene`]
pub struct GltfLoader {
    document: Document,
    buffers: Vec<gltf::buffer::Data>,
}

impl GltfLoader {
    /// Load a glTF or GLB file from path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (document, buffers, _images) = gltf::import(path)?;
        Ok(Self { document, buffers })
    }

    /// Load a glTF or GLB document held in memory
    pub fn load_from_slice(data: &[u8]) -> Result<Self> {
        let (document, buffers, _images) = gltf::import_slice(data)?;
        Ok(Self { document, buffers })
    }

    /// Flatten the default scene (or the first one) with world transforms applied.
    pub fn extract_scene(&self) -> Result<Scene> {
        let scene = self
            .document
            .default_scene()
            .or_else(|| self.document.scenes().next())
            .ok_or_else(|| RenderError::Scene("no scenes found in glTF file".to_string()))?;

        let mut builder = SceneBuilder::new();
        let mut camera = None;
        for node in scene.nodes() {
            self.process_node(&node, &Mat4::IDENTITY, &mut builder, &mut camera)?;
        }

        let mut loaded = builder.build();
        loaded.camera = camera;
        info!(
            "Loaded glTF scene: {} triangles, {} objects, camera {}",
            loaded.triangle_count(),
            loaded.objects.len(),
            if loaded.camera.is_some() { "found" } else { "missing" }
        );
        Ok(loaded)
    }

    /// Process a node and its children recursively
    fn process_node(
        &self,
        node: &Node,
        parent_transform: &Mat4,
        builder: &mut SceneBuilder,
        camera: &mut Option<CameraUniform>,
    ) -> Result<()> {
        let local = Mat4::from_cols_array_2d(&node.transform().matrix());
        let transform = *parent_transform * local;

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                self.process_primitive(&primitive, &transform, builder)?;
            }
        }

        if camera.is_none() {
            if let Some(gltf_camera) = node.camera() {
                *camera = Some(convert_camera(&gltf_camera, &transform));
            }
        }

        for child in node.children() {
            self.process_node(&child, &transform, builder, camera)?;
        }
        Ok(())
    }

    /// Process a mesh primitive into one scene object
    fn process_primitive(&self, primitive: &Primitive, transform: &Mat4, builder: &mut SceneBuilder) -> Result<()> {
        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(|data| &data.0[..]));

        let positions: Vec<Vec3> = reader
            .read_positions()
            .ok_or_else(|| RenderError::Scene("primitive missing position data".to_string()))?
            .map(|p| transform.transform_point3(Vec3::from_array(p)))
            .collect();

        let vertex_indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        let indices = match primitive.mode() {
            gltf::mesh::Mode::Triangles => vertex_indices
                .chunks_exact(3)
                .flat_map(|t| [t[0], t[1], t[2]])
                .collect(),
            gltf::mesh::Mode::TriangleStrip => (0..vertex_indices.len().saturating_sub(2))
                .flat_map(|i| {
                    // Alternate winding order for strips
                    if i % 2 == 0 {
                        [vertex_indices[i], vertex_indices[i + 1], vertex_indices[i + 2]]
                    } else {
                        [vertex_indices[i], vertex_indices[i + 2], vertex_indices[i + 1]]
                    }
                })
                .collect(),
            gltf::mesh::Mode::TriangleFan => (1..vertex_indices.len().saturating_sub(1))
                .flat_map(|i| [vertex_indices[0], vertex_indices[i], vertex_indices[i + 1]])
                .collect(),
            mode => {
                warn!("Unsupported primitive mode: {:?}", mode);
                return Ok(());
            }
        };

        let normal_matrix = Mat3::from_mat4(*transform).inverse().transpose();
        let normals: Vec<Vec3> = match reader.read_normals() {
            Some(normals) => normals
                .map(|n| (normal_matrix * Vec3::from_array(n)).normalize_or_zero())
                .collect(),
            None => face_normals(&positions, &indices),
        };
        if normals.len() != positions.len() {
            return Err(RenderError::Scene(format!(
                "primitive has {} normals for {} positions",
                normals.len(),
                positions.len()
            )));
        }

        builder.add_mesh(&positions, &normals, &indices, convert_material(&primitive.material()));
        Ok(())
    }
}

/// Load `path` and flatten its default scene.
pub fn load_gltf<P: AsRef<Path>>(path: P) -> Result<Scene> {
    GltfLoader::load_from_path(path)?.extract_scene()
}

/// Convert glTF camera to the renderer's camera record
fn convert_camera(gltf_camera: &gltf::Camera, transform: &Mat4) -> CameraUniform {
    let (fov, near, far) = match gltf_camera.projection() {
        gltf::camera::Projection::Perspective(persp) => {
            (persp.yfov().to_degrees(), persp.znear(), persp.zfar().unwrap_or(1000.0))
        }
        gltf::camera::Projection::Orthographic(ortho) => (45.0, ortho.znear(), ortho.zfar()),
    };
    CameraUniform::from_transform(*transform, fov, near, far)
}

/// Metallic-roughness factors plus emission scaled by `KHR_materials_emissive_strength`
fn convert_material(gltf_material: &gltf::Material) -> Material {
    let pbr = gltf_material.pbr_metallic_roughness();
    let base_color = pbr.base_color_factor();
    let emissive = gltf_material.emissive_factor();
    let strength = gltf_material.emissive_strength().unwrap_or(1.0);
    let intensity = if emissive.iter().any(|&c| c > 0.0) { strength } else { 0.0 };

    Material {
        color: [base_color[0], base_color[1], base_color[2]],
        roughness: pbr.roughness_factor(),
        emission: [emissive[0], emissive[1], emissive[2], intensity],
        metalness: pbr.metallic_factor(),
        _padding: [0.0; 3],
    }
}

/// Area weighted vertex normals for meshes shipped without them.
fn face_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for t in indices.chunks_exact(3) {
        let (a, b, c) = (t[0] as usize, t[1] as usize, t[2] as usize);
        let (Some(&pa), Some(&pb), Some(&pc)) = (positions.get(a), positions.get(b), positions.get(c)) else {
            continue;
        };
        let n = (pb - pa).cross(pc - pa);
        normals[a] += n;
        normals[b] += n;
        normals[c] += n;
    }
    normals.into_iter().map(Vec3::normalize_or_zero).collect()
}
