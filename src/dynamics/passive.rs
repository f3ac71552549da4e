//! Joint springs and dampers.

use crate::core::{Data, Model};

/// Computes `data.qfrc_passive`: viscous damping on every dof plus linear
/// springs toward `qpos0` on hinge and slide joints.
pub fn passive(model: &Model, data: &mut Data) {
    for i in 0..model.nv {
        data.qfrc_passive[i] = -model.dof_damping[i] * data.qvel[i];
    }

    for j in 0..model.njnt {
        let stiffness = model.jnt_stiffness[j];
        if stiffness == 0.0 || !model.jnt_type[j].is_scalar() {
            continue;
        }
        let qadr = model.jnt_qposadr[j];
        let dof = model.jnt_dofadr[j];
        data.qfrc_passive[dof] -= stiffness * (data.qpos[qadr] - model.qpos0[qadr]);
    }
}
