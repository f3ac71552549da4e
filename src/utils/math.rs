//! Additional math helpers layered on top of `glam`.

use glam::{DMat3, DQuat, DVec3};

/// Reads a `[w, x, y, z]` quaternion from generalized coordinates.
pub fn quat_from_slice(q: &[f64]) -> DQuat {
    DQuat::from_xyzw(q[1], q[2], q[3], q[0])
}

/// Writes a quaternion into generalized coordinates as `[w, x, y, z]`.
pub fn quat_to_slice(quat: DQuat, q: &mut [f64]) {
    q[0] = quat.w;
    q[1] = quat.x;
    q[2] = quat.y;
    q[3] = quat.z;
}

/// Integrates a body-frame angular velocity over `dt`: `q * exp(omega * dt)`.
pub fn quat_integrate(quat: DQuat, omega_local: DVec3, dt: f64) -> DQuat {
    let rotvec = omega_local * dt;
    if rotvec.length_squared() < 1e-28 {
        return quat;
    }
    (quat * DQuat::from_scaled_axis(rotvec)).normalize()
}

/// Rotates a body-frame inertia tensor into the world frame.
pub fn rotate_inertia(rotation: DQuat, inertia: DMat3) -> DMat3 {
    let r = DMat3::from_quat(rotation);
    r * inertia * r.transpose()
}

/// Principal inertia of a solid box with the given full extents.
pub fn inertia_box(mass: f64, size: DVec3) -> DVec3 {
    let s2 = size * size;
    DVec3::new(s2.y + s2.z, s2.x + s2.z, s2.x + s2.y) * (mass / 12.0)
}

/// Principal inertia of a solid sphere.
pub fn inertia_sphere(mass: f64, radius: f64) -> DVec3 {
    DVec3::splat(0.4 * mass * radius * radius)
}

/// Principal inertia of a solid cylinder aligned with Z.
pub fn inertia_cylinder(mass: f64, radius: f64, height: f64) -> DVec3 {
    let side = mass * (3.0 * radius * radius + height * height) / 12.0;
    DVec3::new(side, side, 0.5 * mass * radius * radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quaternion_slice_order_is_wxyz() {
        let mut q = [0.0; 4];
        let quat = DQuat::from_rotation_z(0.5);
        quat_to_slice(quat, &mut q);
        assert_relative_eq!(q[0], (0.25f64).cos(), epsilon = 1e-15);
        assert_eq!(quat_from_slice(&q), quat);
    }

    #[test]
    fn integration_accumulates_rotation() {
        let mut quat = DQuat::IDENTITY;
        for _ in 0..100 {
            quat = quat_integrate(quat, DVec3::new(0.0, 0.0, 1.0), 0.01);
        }
        let (axis, angle) = quat.to_axis_angle();
        assert_relative_eq!(angle, 1.0, epsilon = 1e-10);
        assert_relative_eq!(axis.z, 1.0, epsilon = 1e-10);
    }
}
