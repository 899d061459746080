use crate::ray::Ray;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

#[cfg(target_arch = "spirv")]
use spirv_std::num_traits::Float;

/// Pinhole camera as the trace kernel sees it. `fov` is the vertical field of view in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CameraUniform {
    pub position: [f32; 3],
    pub near: f32,
    pub right: [f32; 3],
    pub far: f32,
    pub up: [f32; 3],
    pub fov: f32,
    pub forward: [f32; 3],
    pub _padding: f32,
}

impl CameraUniform {
    /// Basis from a camera-to-world matrix: columns 0 and 1 are right and up, the camera
    /// looks down its local `-z`.
    pub fn from_transform(world: Mat4, fov: f32, near: f32, far: f32) -> Self {
        Self {
            position: world.w_axis.truncate().to_array(),
            near,
            right: world.x_axis.truncate().normalize().to_array(),
            far,
            up: world.y_axis.truncate().normalize().to_array(),
            fov,
            forward: (-world.z_axis.truncate()).normalize().to_array(),
            _padding: 0.0,
        }
    }

    pub fn look_at(eye: Vec3, target: Vec3, world_up: Vec3, fov: f32, near: f32, far: f32) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(world_up).normalize();
        let up = right.cross(forward);
        Self {
            position: eye.to_array(),
            near,
            right: right.to_array(),
            far,
            up: up.to_array(),
            fov,
            forward: forward.to_array(),
            _padding: 0.0,
        }
    }

    pub fn position_vec(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn forward_vec(&self) -> Vec3 {
        Vec3::from_array(self.forward)
    }

    /// Ray through the centre of pixel `(x, y)`, row 0 at the top.
    pub fn primary_ray(&self, x: u32, y: u32, width: u32, height: u32) -> Ray {
        let aspect_ratio = width as f32 / height as f32;
        let nx = ((x as f32 + 0.5) / width as f32 - 0.5) * 2.0 * aspect_ratio;
        let ny = ((y as f32 + 0.5) / height as f32 - 0.5) * -2.0;
        let nz = 1.0 / (self.fov.to_radians() * 0.5).tan();

        let direction = nx * Vec3::from_array(self.right)
            + ny * Vec3::from_array(self.up)
            + nz * Vec3::from_array(self.forward);
        Ray::new(self.position_vec(), direction.normalize())
    }

    /// View depth of `point` along the forward axis.
    pub fn depth(&self, point: Vec3) -> f32 {
        (point - self.position_vec()).dot(self.forward_vec())
    }

    /// World to view matrix; view space `-z` is [`CameraUniform::depth`].
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position_vec(), self.forward_vec(), Vec3::from_array(self.up))
    }

    /// Projection matching [`CameraUniform::primary_ray`] for a `width` by `height` image.
    pub fn projection_matrix(&self, width: u32, height: u32) -> Mat4 {
        let aspect_ratio = width as f32 / height.max(1) as f32;
        Mat4::perspective_rh(self.fov.to_radians(), aspect_ratio, self.near, self.far)
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 45.0, 0.01, 1000.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use glam::vec3;

    #[test]
    fn test_from_transform_matches_look_at() {
        let eye = vec3(1.0, 2.0, 3.0);
        let world = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y).inverse();
        let a = CameraUniform::from_transform(world, 60.0, 0.1, 100.0);
        let b = CameraUniform::look_at(eye, Vec3::ZERO, Vec3::Y, 60.0, 0.1, 100.0);
        for (x, y) in a.right.iter().chain(&a.up).chain(&a.forward).chain(&a.position).zip(
            b.right.iter().chain(&b.up).chain(&b.forward).chain(&b.position),
        ) {
            assert!((x - y).abs() < 1e-5, "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_centre_ray_follows_forward() {
        let camera = CameraUniform::look_at(Vec3::ZERO, vec3(0.0, 0.0, -1.0), Vec3::Y, 90.0, 0.1, 10.0);
        let ray = camera.primary_ray(1, 1, 3, 3);
        assert!((ray.direction - vec3(0.0, 0.0, -1.0)).length() < 1e-6);

        // top row points up, left column points left
        let corner = camera.primary_ray(0, 0, 3, 3);
        assert!(corner.direction.y > 0.0);
        assert!(corner.direction.x < 0.0);
    }

    #[test]
    fn test_projection_lands_on_traced_pixel() {
        let camera = CameraUniform::look_at(vec3(1.0, 2.0, 4.0), vec3(0.0, 0.5, 0.0), Vec3::Y, 50.0, 0.1, 100.0);
        let (width, height) = (64, 48);
        let view_projection = camera.projection_matrix(width, height) * camera.view_matrix();

        for (x, y) in [(0, 0), (10, 40), (63, 47), (32, 24)] {
            let point = camera.primary_ray(x, y, width, height).at(3.0);
            let clip = view_projection * point.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            let px = (ndc.x + 1.0) * 0.5 * width as f32;
            let py = (1.0 - ndc.y) * 0.5 * height as f32;
            assert!((px - (x as f32 + 0.5)).abs() < 1e-2, "x {} -> {}", x, px);
            assert!((py - (y as f32 + 0.5)).abs() < 1e-2, "y {} -> {}", y, py);
            assert!((0.0..=1.0).contains(&ndc.z));

            let view = camera.view_matrix() * point.extend(1.0);
            assert!((-view.z - camera.depth(point)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_depth_along_forward() {
        let camera = CameraUniform::look_at(Vec3::ZERO, vec3(0.0, 0.0, -1.0), Vec3::Y, 60.0, 0.1, 10.0);
        assert!((camera.depth(vec3(4.0, 1.0, -2.0)) - 2.0).abs() < 1e-6);
    }
}
