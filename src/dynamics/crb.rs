//! Composite rigid body algorithm for the joint-space inertia matrix.

use crate::core::{Data, Model};

/// Fills `data.crb` with subtree inertias and `data.qm` with the lower
/// triangle of `M` over the dof tree pattern.
///
/// Off-diagonal entries of simple dofs are written as exact zeros; the
/// factorization never reads them.
pub fn composite_rigid_body(model: &Model, data: &mut Data) {
    data.crb.copy_from_slice(&data.cinert);
    for b in (1..model.nbody).rev() {
        let parent = model.body_parent[b];
        if parent != 0 {
            data.crb[parent] = data.crb[parent].add(&data.crb[b]);
        }
    }

    let structure = model.tree.structure();
    data.qm.fill(0.0);
    for i in 0..model.nv {
        let force = data.crb[model.dof_body[i]].mul_motion(data.cdof[i]);
        let diag = model.tree.diag_adr(i);

        if model.tree.is_simple(i) {
            data.qm[diag] = data.cdof[i].dot(&force);
        } else {
            for adr in structure.row_range(i) {
                let j = structure.colind[adr];
                data.qm[adr] = data.cdof[j].dot(&force);
            }
        }
        data.qm[diag] += model.dof_armature[i];
    }
}
