//! Cosine-power lobe sampling and a Cook-Torrance style BRDF.

use crate::rng::Rng;
use crate::{Material, PathTracerConfig};
use core::f32::consts::PI;
use glam::{vec3, Vec3};

#[cfg(target_arch = "spirv")]
use spirv_std::num_traits::Float;

/// Sampled direction with its probability density
#[derive(Copy, Clone, Debug)]
pub struct BrdfSample {
    pub direction: Vec3,
    pub pdf: f32,
}

/// `roughness²`, floored at [`PathTracerConfig::MIN_ALPHA`].
pub fn material_alpha(material: &Material) -> f32 {
    (material.roughness * material.roughness).max(PathTracerConfig::MIN_ALPHA)
}

/// Unit vector perpendicular to `normal`.
///
/// Picks the construction on the larger of `|x|`, `|y|` so the result never degenerates.
pub fn tangent(normal: Vec3) -> Vec3 {
    if normal.x.abs() > normal.y.abs() {
        vec3(-normal.z, 0.0, normal.x).normalize()
    } else {
        vec3(0.0, -normal.z, normal.y).normalize()
    }
}

/// Draw a direction around `normal` from the lobe `pdf = (a + 2) cos^(a + 1) θ / 2π`.
pub fn sample_brdf(material: &Material, normal: Vec3, rng: &mut Rng) -> BrdfSample {
    let alpha = material_alpha(material);

    let phi = rng.next_f32() * 2.0 * PI;
    let theta = rng.next_f32().powf(1.0 / (alpha + 2.0)).acos();

    let x = phi.cos() * theta.sin();
    let y = theta.cos();
    let z = phi.sin() * theta.sin();

    let tangent = tangent(normal);
    let bitangent = tangent.cross(normal).normalize();
    let direction = x * tangent + y * normal + z * bitangent;

    let pdf = (alpha + 2.0) * theta.cos().powf(alpha + 1.0) / (2.0 * PI);

    BrdfSample { direction, pdf }
}

/// Reflectance for light arriving along `incoming` (pointing at the surface) and leaving
/// along `outgoing` (pointing away from it).
pub fn brdf(material: &Material, normal: Vec3, incoming: Vec3, outgoing: Vec3) -> Vec3 {
    let epsilon = PathTracerConfig::EPSILON;
    let alpha = material_alpha(material);
    let alpha_squared = alpha * alpha;
    let halfway = (outgoing - incoming).normalize();

    let ndoti = normal.dot(-incoming).max(0.0);
    let ndoto = normal.dot(outgoing).max(0.0);
    let hdotn = halfway.dot(normal).max(0.0);
    let odoth = outgoing.dot(halfway).max(0.0);

    let distribution = (1.0 / (PI * alpha_squared)) * hdotn.powf(2.0 / alpha_squared - 2.0);

    let k = alpha / 2.0;
    let geometry = ndoto.max(epsilon) / (ndoto * (1.0 - k) + k);

    let color = material.color();
    let fresnel = color + (Vec3::ONE - color) * (1.0 - odoth).powf(5.0);

    let diffuse = color * (1.0 - material.metalness) / PI;
    let specular = distribution * geometry * fresnel / (4.0 * ndoti.max(epsilon) * ndoto.max(epsilon));

    diffuse + specular
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tangent_is_perpendicular() {
        for normal in [
            vec3(0.0, 1.0, 0.0),
            vec3(0.0, -1.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(-1.0, 0.0, 0.0),
            vec3(0.0, 0.0, 1.0),
            vec3(0.3, -0.8, 0.52).normalize(),
        ] {
            let t = tangent(normal);
            assert!((t.length() - 1.0).abs() < 1e-5, "normal {:?}", normal);
            assert!(t.dot(normal).abs() < 1e-5, "normal {:?}", normal);
        }
    }

    #[test]
    fn test_samples_stay_in_hemisphere() {
        let mut rng = Rng::new(17);
        let normal = vec3(0.0, -1.0, 0.0);
        let material = Material::diffuse([0.5; 3]);
        for _ in 0..1000 {
            let s = sample_brdf(&material, normal, &mut rng);
            assert!((s.direction.length() - 1.0).abs() < 1e-4);
            assert!(s.direction.dot(normal) >= -1e-4);
            assert!(s.pdf >= 0.0);
        }
    }

    #[test]
    fn test_lobe_mean_cosine() {
        // E[cos θ] = (a + 2) / (a + 3) for cos θ = r^(1 / (a + 2))
        let normal = vec3(0.0, 0.0, 1.0);
        for roughness in [0.05f32, 1.0] {
            let material = Material::diffuse([1.0; 3]).with_roughness(roughness);
            let alpha = material_alpha(&material);
            let mut rng = Rng::new(5);
            let samples = 4000;
            let mut mean = 0.0;
            for _ in 0..samples {
                mean += sample_brdf(&material, normal, &mut rng).direction.dot(normal);
            }
            mean /= samples as f32;
            let expected = (alpha + 2.0) / (alpha + 3.0);
            assert!((mean - expected).abs() < 0.02, "roughness {} mean {}", roughness, mean);
        }
    }

    #[test]
    fn test_brdf_is_finite_and_nonnegative() {
        let normal = vec3(0.0, 1.0, 0.0);
        let incoming = vec3(0.3, -1.0, 0.1).normalize();
        let outgoing = vec3(-0.2, 1.0, 0.4).normalize();
        for roughness in [0.0, 0.1, 0.5, 1.0] {
            for metalness in [0.0, 1.0] {
                let m = Material::diffuse([0.7, 0.2, 0.1])
                    .with_roughness(roughness)
                    .with_metalness(metalness);
                let f = brdf(&m, normal, incoming, outgoing);
                assert!(f.is_finite(), "roughness {} metalness {}", roughness, metalness);
                assert!(f.min_element() >= 0.0);
            }
        }
    }

    #[test]
    fn test_metal_drops_diffuse_term() {
        let normal = vec3(0.0, 1.0, 0.0);
        let incoming = vec3(1.0, -1.0, 0.0).normalize();
        let outgoing = vec3(-1.0, 3.0, 0.5).normalize();
        let dielectric = Material::diffuse([0.5; 3]);
        let metal = dielectric.with_metalness(1.0);
        let gap = brdf(&dielectric, normal, incoming, outgoing) - brdf(&metal, normal, incoming, outgoing);
        assert!((gap - Vec3::splat(0.5 / PI)).abs().max_element() < 1e-5);
    }
}
