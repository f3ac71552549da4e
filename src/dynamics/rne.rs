//! Recursive Newton-Euler for the bias force `C(q, v)`: gravity plus
//! Coriolis and centrifugal terms.

use glam::DVec3;

use crate::core::{Data, Model};
use crate::utils::spatial::SpatialVec;

/// Computes `data.qfrc_bias`. With `use_qacc` the result also includes
/// `M·qacc`, which yields the full inverse-dynamics force.
pub fn rne(model: &Model, data: &mut Data, use_qacc: bool) {
    let gravity = DVec3::from_array(model.opt.gravity);
    data.cacc[0] = SpatialVec::new(DVec3::ZERO, -gravity);

    for b in 1..model.nbody {
        let mut cacc = data.cacc[model.body_parent[b]];
        let dofs = model.body_dofadr[b]..model.body_dofadr[b] + model.body_dofnum[b];
        for i in dofs {
            cacc += data.cdof_dot[i] * data.qvel[i];
            if use_qacc {
                cacc += data.cdof[i] * data.qacc[i];
            }
        }
        data.cacc[b] = cacc;

        let inertia = &data.cinert[b];
        let momentum = inertia.mul_motion(data.cvel[b]);
        data.cfrc[b] = inertia.mul_motion(cacc) + data.cvel[b].cross_force(&momentum);
    }

    for b in (1..model.nbody).rev() {
        let parent = model.body_parent[b];
        if parent != 0 {
            let child = data.cfrc[b];
            data.cfrc[parent] += child;
        }
    }

    for i in 0..model.nv {
        data.qfrc_bias[i] = data.cdof[i].dot(&data.cfrc[model.dof_body[i]]);
    }
}
