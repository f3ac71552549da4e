use glam::DVec3;

use crate::core::{Data, JointKind, Model};
use crate::utils::math::{quat_from_slice, quat_integrate, quat_to_slice};

/// Semi-implicit Euler: velocities first, then positions from the new velocities.
#[derive(Debug, Clone, Copy)]
pub struct Integrator {
    pub dt: f64,
}

impl Integrator {
    pub fn new(dt: f64) -> Self {
        Self { dt }
    }

    pub fn from_model(model: &Model) -> Self {
        Self::new(model.opt.timestep)
    }

    pub fn integrate_velocity(&self, data: &mut Data) {
        for (v, a) in data.qvel.iter_mut().zip(&data.qacc) {
            *v += a * self.dt;
        }
    }

    pub fn integrate_position(&self, model: &Model, data: &mut Data) {
        integrate_pos(model, &mut data.qpos, &data.qvel, self.dt);
    }

    /// Advances `data` by one timestep using the accelerations already in `qacc`.
    pub fn step(&self, model: &Model, data: &mut Data) {
        self.integrate_velocity(data);
        self.integrate_position(model, data);
        data.time += self.dt;
    }
}

/// Integrates `qpos` along `qvel` for `dt`, respecting quaternion joints.
///
/// Ball and free-joint rotations use the angular velocity in the local frame.
pub fn integrate_pos(model: &Model, qpos: &mut [f64], qvel: &[f64], dt: f64) {
    for j in 0..model.njnt {
        let qadr = model.jnt_qposadr[j];
        let vadr = model.jnt_dofadr[j];
        match model.jnt_type[j] {
            JointKind::Free => {
                for k in 0..3 {
                    qpos[qadr + k] += qvel[vadr + k] * dt;
                }
                rotate(&mut qpos[qadr + 3..qadr + 7], &qvel[vadr + 3..vadr + 6], dt);
            }
            JointKind::Ball => rotate(&mut qpos[qadr..qadr + 4], &qvel[vadr..vadr + 3], dt),
            JointKind::Hinge | JointKind::Slide => qpos[qadr] += qvel[vadr] * dt,
        }
    }
}

fn rotate(quat: &mut [f64], omega: &[f64], dt: f64) {
    let q = quat_integrate(quat_from_slice(quat).normalize(), DVec3::from_slice(omega), dt);
    quat_to_slice(q, quat);
}
