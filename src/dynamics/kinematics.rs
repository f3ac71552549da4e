//! Forward kinematics, motion subspaces and point Jacobians.
//!
//! Everything is expressed in the world frame about the world origin: a
//! spatial motion `(ang, lin)` carries the angular velocity and the velocity
//! of the body-fixed point currently at the origin.

use glam::{DMat3, DVec3};

use crate::core::{Data, JointKind, Model};
use crate::utils::math::{quat_from_slice, rotate_inertia};
use crate::utils::spatial::{SpatialInertia, SpatialVec};

/// Computes body poses, joint anchors/axes, composite inertias of single
/// bodies (`cinert`) and the motion subspace of every dof (`cdof`).
pub fn kinematics(model: &Model, data: &mut Data) {
    data.xpos[0] = DVec3::ZERO;
    data.xquat[0] = glam::DQuat::IDENTITY;
    data.xipos[0] = DVec3::ZERO;
    data.cinert[0] = SpatialInertia::ZERO;

    for b in 1..model.nbody {
        let parent = model.body_parent[b];
        let mut pos = data.xpos[parent] + data.xquat[parent] * model.body_pos[b];
        let mut quat = data.xquat[parent] * model.body_quat[b];

        let jnts = model.body_jntadr[b]..model.body_jntadr[b] + model.body_jntnum[b];
        for j in jnts {
            let qadr = model.jnt_qposadr[j];
            let local_pos = model.jnt_pos[j];
            match model.jnt_type[j] {
                JointKind::Free => {
                    pos = DVec3::from_slice(&data.qpos[qadr..qadr + 3]);
                    quat = quat_from_slice(&data.qpos[qadr + 3..qadr + 7]).normalize();
                    data.xanchor[j] = pos;
                    data.xaxis[j] = DVec3::Z;
                }
                JointKind::Ball => {
                    let anchor = pos + quat * local_pos;
                    data.xanchor[j] = anchor;
                    data.xaxis[j] = DVec3::Z;
                    quat = (quat * quat_from_slice(&data.qpos[qadr..qadr + 4]).normalize())
                        .normalize();
                    pos = anchor - quat * local_pos;
                }
                JointKind::Hinge => {
                    let anchor = pos + quat * local_pos;
                    let axis = quat * model.jnt_axis[j];
                    data.xanchor[j] = anchor;
                    data.xaxis[j] = axis;
                    quat = (glam::DQuat::from_axis_angle(axis, data.qpos[qadr]) * quat).normalize();
                    pos = anchor - quat * local_pos;
                }
                JointKind::Slide => {
                    let axis = quat * model.jnt_axis[j];
                    data.xanchor[j] = pos + quat * local_pos;
                    data.xaxis[j] = axis;
                    pos += axis * data.qpos[qadr];
                }
            }
        }

        data.xpos[b] = pos;
        data.xquat[b] = quat;
        data.xipos[b] = pos + quat * model.body_ipos[b];
        data.cinert[b] = SpatialInertia::new(
            model.body_mass[b],
            data.xipos[b],
            rotate_inertia(quat, DMat3::from_diagonal(model.body_inertia[b])),
        );
    }

    for j in 0..model.njnt {
        let adr = model.jnt_dofadr[j];
        let b = model.jnt_body[j];
        let anchor = data.xanchor[j];
        match model.jnt_type[j] {
            JointKind::Free => {
                let rot = DMat3::from_quat(data.xquat[b]);
                for k in 0..3 {
                    let mut lin = DVec3::ZERO;
                    lin[k] = 1.0;
                    data.cdof[adr + k] = SpatialVec::new(DVec3::ZERO, lin);
                    let ang = rot.col(k);
                    data.cdof[adr + 3 + k] = SpatialVec::new(ang, anchor.cross(ang));
                }
            }
            JointKind::Ball => {
                let rot = DMat3::from_quat(data.xquat[b]);
                for k in 0..3 {
                    let ang = rot.col(k);
                    data.cdof[adr + k] = SpatialVec::new(ang, anchor.cross(ang));
                }
            }
            JointKind::Hinge => {
                let axis = data.xaxis[j];
                data.cdof[adr] = SpatialVec::new(axis, anchor.cross(axis));
            }
            JointKind::Slide => {
                data.cdof[adr] = SpatialVec::new(DVec3::ZERO, data.xaxis[j]);
            }
        }
    }
}

/// Computes body velocities (`cvel`) and the time derivatives of the motion
/// subspaces (`cdof_dot`).
///
/// Dofs of one ball joint (or the rotational half of a free joint) share the
/// velocity accumulated before that joint.
pub fn com_vel(model: &Model, data: &mut Data) {
    data.cvel[0] = SpatialVec::ZERO;
    for b in 1..model.nbody {
        let mut cvel = data.cvel[model.body_parent[b]];

        let jnts = model.body_jntadr[b]..model.body_jntadr[b] + model.body_jntnum[b];
        for j in jnts {
            let adr = model.jnt_dofadr[j];
            let groups: &[(usize, usize)] = match model.jnt_type[j] {
                JointKind::Free => &[(0, 3), (3, 3)],
                JointKind::Ball => &[(0, 3)],
                JointKind::Hinge | JointKind::Slide => &[(0, 1)],
            };
            for &(offset, count) in groups {
                let dofs = adr + offset..adr + offset + count;
                for i in dofs.clone() {
                    data.cdof_dot[i] = cvel.cross_motion(&data.cdof[i]);
                }
                for i in dofs {
                    cvel += data.cdof[i] * data.qvel[i];
                }
            }
        }
        data.cvel[b] = cvel;
    }
}

/// Dofs that move `body`, ascending (the dof chain of its deepest dof).
pub fn body_chain(model: &Model, body: usize) -> &[usize] {
    match model.body_lastdof[body] {
        Some(dof) => model.tree.chain(dof),
        None => &[],
    }
}

/// Translational Jacobian of the world point `point` attached to `body`.
///
/// Returns the dof chain and one column per chain entry: the velocity of
/// the point per unit velocity of that dof.
pub fn jac_point<'m>(
    model: &'m Model,
    data: &Data,
    body: usize,
    point: DVec3,
    columns: &mut Vec<DVec3>,
) -> &'m [usize] {
    let chain = body_chain(model, body);
    columns.clear();
    columns.extend(chain.iter().map(|&i| data.cdof[i].point_velocity(point)));
    chain
}
