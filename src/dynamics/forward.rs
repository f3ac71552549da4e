//! Forward and inverse dynamics pipelines.
//!
//! Stages are split by what they depend on (positions, velocities,
//! accelerations) and each one can be rerun on its own; given the same
//! inputs every stage produces the same outputs.

use std::time::Duration;

use crate::core::{Data, Model};
use crate::dynamics::constraint::{
    constraint_velocity, inverse_constraint, make_constraint, solve_global,
};
use crate::dynamics::crb::composite_rigid_body;
use crate::dynamics::factor::{factor_m, mul_m, solve_m};
use crate::dynamics::integrator::Integrator;
use crate::dynamics::island::{discover_islands, solve_islands};
use crate::dynamics::kinematics::{com_vel, kinematics};
use crate::dynamics::passive::passive;
use crate::dynamics::rne::rne;
use crate::error::Warning;
use crate::utils::logging;
use crate::utils::profiling::{self, StageProfiler};

fn timed(
    data: &mut Data,
    label: &str,
    slot: fn(&mut StageProfiler) -> &mut Duration,
    stage: impl FnOnce(&mut Data),
) {
    let _trace = logging::ScopedTimer::new(label);
    let mut elapsed = Duration::ZERO;
    {
        let _timer = profiling::ScopedTimer::new(&mut elapsed);
        stage(data);
    }
    *slot(&mut data.profiler) += elapsed;
}

/// Position stage: kinematics, mass matrix and its factor, constraint rows.
pub fn fwd_position(model: &Model, data: &mut Data) {
    timed(data, "kinematics", |p| &mut p.position_time, |data| {
        kinematics(model, data)
    });
    timed(data, "inertia", |p| &mut p.inertia_time, |data| {
        composite_rigid_body(model, data);
        factor_m(model, data);
    });
    timed(data, "make constraint", |p| &mut p.constraint_time, |data| {
        make_constraint(model, data)
    });
    data.profiler.dof_count = model.nv;
    data.profiler.constraint_rows = data.nefc;
}

/// Velocity stage: body velocities, bias and passive forces, reference
/// accelerations of the constraint rows.
pub fn fwd_velocity(model: &Model, data: &mut Data) {
    timed(data, "bias", |p| &mut p.bias_time, |data| {
        com_vel(model, data);
        rne(model, data, false);
        passive(model, data);
    });
    constraint_velocity(model, data);
}

/// Unconstrained acceleration `qacc_smooth = M^-1·(passive - bias + applied)`.
pub fn fwd_acceleration(model: &Model, data: &mut Data) {
    for i in 0..model.nv {
        data.qfrc_smooth[i] = data.qfrc_passive[i] - data.qfrc_bias[i] + data.qfrc_applied[i];
    }
    let mut qacc_smooth = std::mem::take(&mut data.qacc_smooth);
    qacc_smooth.copy_from_slice(&data.qfrc_smooth);
    solve_m(model, data, &mut qacc_smooth, 1);
    data.qacc_smooth = qacc_smooth;
}

/// Constraint stage: writes `qacc`, `qfrc_constraint` and the row forces.
pub fn fwd_constraint(model: &Model, data: &mut Data) {
    if data.nefc == 0 {
        data.qacc.copy_from_slice(&data.qacc_smooth);
        data.qfrc_constraint.fill(0.0);
        data.clear_islands();
        return;
    }

    let result = if model.opt.islands {
        timed(data, "islands", |p| &mut p.island_time, |data| {
            discover_islands(model, data)
        });
        let mut result = Ok(());
        timed(data, "solve", |p| &mut p.solve_time, |data| {
            result = solve_islands(model, data);
        });
        result
    } else {
        data.clear_islands();
        let mut result = Ok(());
        timed(data, "solve", |p| &mut p.solve_time, |data| {
            result = solve_global(model, data);
        });
        result
    };
    if let Err(err) = result {
        data.handler.fatal(&format!("constraint solve failed: {err}"));
    }
}

fn check_acc(data: &mut Data) {
    if let Some(i) = data.qacc.iter().position(|a| !a.is_finite()) {
        data.handler.warn(Warning::BadQacc, i);
    }
}

/// Full forward dynamics: computes `qacc` from the current state.
pub fn forward(model: &Model, data: &mut Data) {
    let start = std::time::Instant::now();
    fwd_position(model, data);
    fwd_velocity(model, data);
    fwd_acceleration(model, data);
    fwd_constraint(model, data);
    check_acc(data);
    data.profiler.total_time += start.elapsed();
}

/// Forward dynamics followed by one semi-implicit Euler step.
pub fn step(model: &Model, data: &mut Data) {
    data.profiler.reset();
    forward(model, data);
    timed(data, "integrate", |p| &mut p.integrate_time, |data| {
        Integrator::from_model(model).step(model, data)
    });
}

/// Inverse dynamics: the applied force that produces the current `qacc`.
///
/// `qfrc_inverse = M·qacc + qfrc_bias - qfrc_passive - qfrc_constraint`,
/// with constraint forces from the soft-constraint model at this `qacc`.
pub fn inverse(model: &Model, data: &mut Data) {
    fwd_position(model, data);
    fwd_velocity(model, data);
    if data.nefc > 0 {
        inverse_constraint(model, data);
    } else {
        data.qfrc_constraint.fill(0.0);
    }

    let mut qfrc_inverse = std::mem::take(&mut data.qfrc_inverse);
    mul_m(model, data, &mut qfrc_inverse, &data.qacc);
    for i in 0..model.nv {
        qfrc_inverse[i] += data.qfrc_bias[i] - data.qfrc_passive[i] - data.qfrc_constraint[i];
    }
    data.qfrc_inverse = qfrc_inverse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BodySpec, JointSpec, ModelBuilder};
    use approx::assert_relative_eq;
    use glam::DVec3;

    #[test]
    fn stages_are_idempotent() {
        let mut builder = ModelBuilder::new();
        let base = builder.add_body(
            BodySpec::new("base", 0).with_joint(JointSpec::hinge(DVec3::Z).with_damping(0.2)),
        );
        builder.add_body(
            BodySpec::new("tip", base)
                .with_pos(DVec3::X)
                .with_joint(JointSpec::ball()),
        );
        let model = builder.compile().unwrap();
        let mut data = Data::new(&model);
        data.qvel.copy_from_slice(&[0.5, 0.1, -0.2, 0.3]);

        forward(&model, &mut data);
        let first = data.qacc.clone();
        forward(&model, &mut data);
        assert_eq!(first, data.qacc);
    }

    #[test]
    fn falling_slider_accelerates_with_gravity() {
        let mut builder = ModelBuilder::new();
        builder.add_body(
            BodySpec::new("slider", 0)
                .with_mass(3.0, DVec3::splat(0.1))
                .with_joint(JointSpec::slide(DVec3::Z)),
        );
        let model = builder.compile().unwrap();
        let mut data = Data::new(&model);
        forward(&model, &mut data);
        assert_relative_eq!(data.qacc[0], -9.81, epsilon = 1e-12);
    }

    #[test]
    fn inverse_recovers_unconstrained_force() {
        let mut builder = ModelBuilder::new();
        builder.add_body(
            BodySpec::new("arm", 0)
                .with_com(DVec3::new(0.3, 0.0, 0.0))
                .with_joint(JointSpec::hinge(DVec3::Y).with_damping(0.1)),
        );
        let model = builder.compile().unwrap();
        let mut data = Data::new(&model);
        data.qpos[0] = 0.4;
        data.qvel[0] = -1.2;
        data.qfrc_applied[0] = 0.7;
        forward(&model, &mut data);
        inverse(&model, &mut data);
        assert_relative_eq!(data.qfrc_inverse[0], 0.7, epsilon = 1e-10);
    }
}
