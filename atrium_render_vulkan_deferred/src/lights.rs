use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::config::{LIGHT_COUNT, Z_FAR, Z_NEAR};

pub const LIGHT_TYPE_POINT: f32 = 0.0;
pub const LIGHT_TYPE_SPOT: f32 = 1.0;

/// GPU-facing light record. `params.x` is the light type, `params.y` the
/// radius (point) or falloff (spot). Layout matches the fragment lights
/// uniform block member for member.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub position: Vec4,
    pub dir: Vec4,
    pub color: Vec4,
    pub params: Vec4,
    pub light_space: Mat4,
}

impl Light {
    pub fn point(position: Vec3, color: Vec3, radius: f32) -> Self {
        Self {
            position: position.extend(1.0),
            dir: position.extend(1.0),
            color: color.extend(1.0),
            params: Vec4::new(LIGHT_TYPE_POINT, radius, 0.0, 0.0),
            light_space: Mat4::IDENTITY,
        }
    }

    pub fn spot(position: Vec3, direction: Vec3, cone_angle: f32, color: Vec3) -> Self {
        let mut light = Self {
            position: position.extend(1.0),
            dir: direction.extend(1.0),
            color: color.extend(1.0),
            params: Vec4::new(LIGHT_TYPE_SPOT, 1600.0, 0.0, 0.0),
            light_space: Mat4::IDENTITY,
        };
        light.light_space = spot_light_space(position, direction, cone_angle);
        light
    }
}

/// Depth projection for a spot light's shadow pass: a square perspective
/// frustum down the light direction.
pub fn spot_light_space(position: Vec3, direction: Vec3, cone_angle: f32) -> Mat4 {
    let projection = Mat4::perspective_rh(cone_angle, 1.0, Z_NEAR, Z_FAR);
    let view = Mat4::look_at_rh(position, position + direction, Vec3::Y);
    projection * view
}

/// Three spot lights around the atrium center.
pub fn default_lights() -> [Light; LIGHT_COUNT] {
    let fov = 45.0f32.to_radians();
    let center = Vec3::new(0.0, 0.0, -15.0);
    let low = Vec3::new(0.0, -15.0, 0.0);
    let high = center + Vec3::new(30.0, -30.0, 15.0);

    [
        Light::spot(low, Vec3::X, fov, Vec3::new(1.0, 1.0, 1.0)),
        Light::spot(low, -Vec3::X, fov, Vec3::new(1.0, 1.0, 0.0)),
        Light::spot(high, Vec3::Z, fov, Vec3::new(1.0, 1.0, 1.0)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_light_space_is_deterministic() {
        let a = spot_light_space(Vec3::new(1.0, -15.0, 2.0), Vec3::X, 0.8);
        let b = spot_light_space(Vec3::new(1.0, -15.0, 2.0), Vec3::X, 0.8);
        assert_eq!(a, b);
    }

    #[test]
    fn spot_light_space_projects_points_ahead_of_the_light() {
        let position = Vec3::new(0.0, -15.0, 0.0);
        let light_space = spot_light_space(position, Vec3::X, 45.0f32.to_radians());
        // A point straight down the light direction lands on the axis.
        let projected = light_space * (position + Vec3::X * 10.0).extend(1.0);
        let ndc = projected / projected.w;
        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn default_lights_are_spots_with_light_space() {
        let lights = default_lights();
        assert_eq!(lights.len(), LIGHT_COUNT);
        for light in &lights {
            assert_eq!(light.params.x, LIGHT_TYPE_SPOT);
            assert_ne!(light.light_space, Mat4::IDENTITY);
        }
    }

    #[test]
    fn point_lights_carry_radius_and_no_matrix() {
        let light = Light::point(Vec3::ONE, Vec3::ONE, 25.0);
        assert_eq!(light.params.x, LIGHT_TYPE_POINT);
        assert_eq!(light.params.y, 25.0);
        assert_eq!(light.light_space, Mat4::IDENTITY);
    }
}
