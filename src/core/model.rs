//! Compiled model: topology, constant body/joint parameters and the dof tree.
//!
//! A [`Model`] is produced once by [`ModelBuilder::compile`](super::ModelBuilder::compile)
//! and never changes afterwards; all per-step numbers live in
//! [`Data`](super::Data).

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::articulations::JointKind;
use super::constraints::Equality;
use super::tree::DofTree;
use crate::config::Options;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub nq: usize,
    pub nv: usize,
    /// Number of bodies, including the world body `0`.
    pub nbody: usize,
    pub njnt: usize,

    pub opt: Options,

    pub body_name: Vec<String>,
    pub body_parent: Vec<usize>,
    /// Offset and orientation relative to the parent at zero joint positions.
    pub body_pos: Vec<DVec3>,
    pub body_quat: Vec<DQuat>,
    pub body_mass: Vec<f64>,
    /// Center of mass in the body frame.
    pub body_ipos: Vec<DVec3>,
    /// Principal inertia about the center of mass, in the body frame.
    pub body_inertia: Vec<DVec3>,
    pub body_jntadr: Vec<usize>,
    pub body_jntnum: Vec<usize>,
    pub body_dofadr: Vec<usize>,
    pub body_dofnum: Vec<usize>,
    /// Deepest dof whose motion moves this body, if any.
    pub body_lastdof: Vec<Option<usize>>,

    pub jnt_name: Vec<String>,
    pub jnt_type: Vec<JointKind>,
    pub jnt_body: Vec<usize>,
    pub jnt_qposadr: Vec<usize>,
    pub jnt_dofadr: Vec<usize>,
    /// Axis and anchor in the body frame.
    pub jnt_axis: Vec<DVec3>,
    pub jnt_pos: Vec<DVec3>,
    pub jnt_stiffness: Vec<f64>,

    pub dof_body: Vec<usize>,
    pub dof_jnt: Vec<usize>,
    pub dof_damping: Vec<f64>,
    pub dof_armature: Vec<f64>,

    pub tree: DofTree,
    pub qpos0: Vec<f64>,
    pub eq: Vec<Equality>,
}

impl Model {
    pub fn neq(&self) -> usize {
        self.eq.len()
    }

    /// Upper bound on constraint rows (all equalities active).
    pub fn nefc_max(&self) -> usize {
        self.eq.iter().map(Equality::rows).sum()
    }

    /// Index of the body with the given name.
    pub fn body_id(&self, name: &str) -> Option<usize> {
        self.body_name.iter().position(|n| n == name)
    }

    pub fn joint_id(&self, name: &str) -> Option<usize> {
        self.jnt_name.iter().position(|n| n == name)
    }

    /// Total mass of the bodies in the subtree rooted at `body`.
    pub fn subtree_mass(&self, body: usize) -> f64 {
        let mut mass = self.body_mass.clone();
        for b in (1..self.nbody).rev() {
            mass[self.body_parent[b]] += mass[b];
        }
        mass[body]
    }
}
