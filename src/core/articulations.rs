use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::constraints::{Equality, EqualityKind};
use super::model::Model;
use super::tree::DofTree;
use crate::config::Options;
use crate::error::{SimError, SimResult};

/// Type of joint connecting a body to its parent in reduced coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointKind {
    /// 6-DOF floating base: world position plus `[w, x, y, z]` orientation.
    Free,
    /// 3-DOF rotation about an anchor, velocities in the body frame.
    Ball,
    /// 1-DOF translation along an axis.
    Slide,
    /// 1-DOF rotation about an axis through an anchor.
    Hinge,
}

impl JointKind {
    /// Number of generalized position coordinates.
    pub fn nq(&self) -> usize {
        match self {
            JointKind::Free => 7,
            JointKind::Ball => 4,
            JointKind::Slide | JointKind::Hinge => 1,
        }
    }

    /// Returns the number of degrees of freedom for this joint type.
    pub fn nv(&self) -> usize {
        match self {
            JointKind::Free => 6,
            JointKind::Ball => 3,
            JointKind::Slide | JointKind::Hinge => 1,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, JointKind::Slide | JointKind::Hinge)
    }
}

/// A joint attached to a body, expressed in that body's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSpec {
    pub name: String,
    pub kind: JointKind,
    pub axis: DVec3,
    /// Anchor in the body frame.
    pub pos: DVec3,
    pub damping: f64,
    pub stiffness: f64,
    pub armature: f64,
}

impl JointSpec {
    pub fn new(kind: JointKind) -> Self {
        Self {
            name: String::new(),
            kind,
            axis: DVec3::Z,
            pos: DVec3::ZERO,
            damping: 0.0,
            stiffness: 0.0,
            armature: 0.0,
        }
    }

    pub fn free() -> Self {
        Self::new(JointKind::Free)
    }

    pub fn ball() -> Self {
        Self::new(JointKind::Ball)
    }

    pub fn hinge(axis: DVec3) -> Self {
        Self {
            axis,
            ..Self::new(JointKind::Hinge)
        }
    }

    pub fn slide(axis: DVec3) -> Self {
        Self {
            axis,
            ..Self::new(JointKind::Slide)
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_pos(mut self, pos: DVec3) -> Self {
        self.pos = pos;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_stiffness(mut self, stiffness: f64) -> Self {
        self.stiffness = stiffness;
        self
    }

    pub fn with_armature(mut self, armature: f64) -> Self {
        self.armature = armature;
        self
    }
}

/// A single node in the articulated body tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySpec {
    pub name: String,
    /// Index of the parent body; `0` is the world.
    pub parent: usize,
    /// Offset from the parent frame at zero joint positions.
    pub pos: DVec3,
    pub quat: DQuat,
    pub mass: f64,
    /// Center of mass offset in the body frame.
    pub com: DVec3,
    /// Principal rotational inertia about the center of mass.
    pub inertia: DVec3,
    pub joints: Vec<JointSpec>,
}

impl BodySpec {
    pub fn new(name: &str, parent: usize) -> Self {
        Self {
            name: name.into(),
            parent,
            pos: DVec3::ZERO,
            quat: DQuat::IDENTITY,
            mass: 1.0,
            com: DVec3::ZERO,
            inertia: DVec3::splat(0.1),
            joints: Vec::new(),
        }
    }

    pub fn with_pos(mut self, pos: DVec3) -> Self {
        self.pos = pos;
        self
    }

    pub fn with_quat(mut self, quat: DQuat) -> Self {
        self.quat = quat;
        self
    }

    pub fn with_mass(mut self, mass: f64, inertia: DVec3) -> Self {
        self.mass = mass;
        self.inertia = inertia;
        self
    }

    pub fn with_com(mut self, com: DVec3) -> Self {
        self.com = com;
        self
    }

    pub fn with_joint(mut self, joint: JointSpec) -> Self {
        self.joints.push(joint);
        self
    }
}

/// Collects bodies, joints and equalities, then compiles them into a [`Model`].
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    bodies: Vec<BodySpec>,
    equalities: Vec<Equality>,
    options: Options,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    /// Index of the world body.
    pub const WORLD: usize = 0;

    pub fn new() -> Self {
        Self {
            bodies: vec![BodySpec::new("world", 0).with_mass(0.0, DVec3::ZERO)],
            equalities: Vec::new(),
            options: Options::default(),
        }
    }

    /// Adds a body and returns its index. Parents must be added before children.
    pub fn add_body(&mut self, body: BodySpec) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    pub fn add_equality(&mut self, equality: Equality) -> usize {
        self.equalities.push(equality);
        self.equalities.len() - 1
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Validates the description and lays out bodies, joints and dofs.
    pub fn compile(&self) -> SimResult<Model> {
        let timestep = self.options.timestep;
        if !timestep.is_finite() || timestep <= 0.0 {
            return Err(SimError::InvalidModel(format!(
                "timestep must be positive and finite, got {timestep}"
            )));
        }
        let nbody = self.bodies.len();
        let mut model = Model {
            nq: 0,
            nv: 0,
            nbody,
            njnt: 0,
            opt: self.options.clone(),
            body_name: Vec::with_capacity(nbody),
            body_parent: Vec::with_capacity(nbody),
            body_pos: Vec::with_capacity(nbody),
            body_quat: Vec::with_capacity(nbody),
            body_mass: Vec::with_capacity(nbody),
            body_ipos: Vec::with_capacity(nbody),
            body_inertia: Vec::with_capacity(nbody),
            body_jntadr: Vec::with_capacity(nbody),
            body_jntnum: Vec::with_capacity(nbody),
            body_dofadr: Vec::with_capacity(nbody),
            body_dofnum: Vec::with_capacity(nbody),
            body_lastdof: Vec::with_capacity(nbody),
            jnt_name: Vec::new(),
            jnt_type: Vec::new(),
            jnt_body: Vec::new(),
            jnt_qposadr: Vec::new(),
            jnt_dofadr: Vec::new(),
            jnt_axis: Vec::new(),
            jnt_pos: Vec::new(),
            jnt_stiffness: Vec::new(),
            dof_body: Vec::new(),
            dof_jnt: Vec::new(),
            dof_damping: Vec::new(),
            dof_armature: Vec::new(),
            tree: DofTree::default(),
            qpos0: Vec::new(),
            eq: self.equalities.clone(),
        };

        let mut dof_parent: Vec<Option<usize>> = Vec::new();
        let mut has_child = vec![false; nbody];

        for (b, body) in self.bodies.iter().enumerate() {
            if b > 0 && body.parent >= b {
                return Err(SimError::InvalidModel(format!(
                    "body {b} ({}) has parent {}; parents must be added first",
                    body.name, body.parent
                )));
            }
            if !(body.mass.is_finite() && body.mass >= 0.0) || body.inertia.min_element() < 0.0 {
                return Err(SimError::InvalidModel(format!(
                    "body {b} ({}) has invalid mass or inertia",
                    body.name
                )));
            }
            if b > 0 {
                has_child[body.parent] = true;
            }

            model.body_name.push(body.name.clone());
            model.body_parent.push(if b == 0 { 0 } else { body.parent });
            model.body_pos.push(body.pos);
            model.body_quat.push(body.quat.normalize());
            model.body_mass.push(body.mass);
            model.body_ipos.push(body.com);
            model.body_inertia.push(body.inertia);
            model.body_jntadr.push(model.njnt);
            model.body_jntnum.push(body.joints.len());
            model.body_dofadr.push(model.nv);

            if b == 0 && !body.joints.is_empty() {
                return Err(SimError::InvalidModel("the world body cannot have joints".into()));
            }

            let mut prev_dof = if b == 0 {
                None
            } else {
                model.body_lastdof[body.parent]
            };
            for joint in &body.joints {
                self.check_joint(b, body, joint)?;
                let jid = model.njnt;
                model.jnt_name.push(joint.name.clone());
                model.jnt_type.push(joint.kind);
                model.jnt_body.push(b);
                model.jnt_qposadr.push(model.nq);
                model.jnt_dofadr.push(model.nv);
                model.jnt_axis.push(if joint.kind.is_scalar() {
                    joint.axis.normalize()
                } else {
                    joint.axis
                });
                model.jnt_pos.push(joint.pos);
                model.jnt_stiffness.push(joint.stiffness);

                match joint.kind {
                    JointKind::Free => {
                        model.qpos0.extend_from_slice(&body.pos.to_array());
                        let q = body.quat.normalize();
                        model.qpos0.extend_from_slice(&[q.w, q.x, q.y, q.z]);
                    }
                    JointKind::Ball => model.qpos0.extend_from_slice(&[1.0, 0.0, 0.0, 0.0]),
                    JointKind::Slide | JointKind::Hinge => model.qpos0.push(0.0),
                }

                for _ in 0..joint.kind.nv() {
                    dof_parent.push(prev_dof);
                    prev_dof = Some(model.nv);
                    model.dof_body.push(b);
                    model.dof_jnt.push(jid);
                    model.dof_damping.push(joint.damping);
                    model.dof_armature.push(joint.armature);
                    model.nv += 1;
                }
                model.nq += joint.kind.nq();
                model.njnt += 1;
            }

            model.body_dofnum.push(model.nv - model.body_dofadr[b]);
            model.body_lastdof.push(prev_dof);
        }

        let mut simple = vec![false; model.nv];
        for b in 1..nbody {
            if self.body_is_simple(&model, b, has_child[b]) {
                let start = model.body_dofadr[b];
                simple[start..start + model.body_dofnum[b]].fill(true);
            }
        }
        model.tree = DofTree::new(dof_parent, &simple)?;

        for (e, eq) in model.eq.iter().enumerate() {
            check_equality(&model, e, eq)?;
        }

        log::debug!(
            "compiled model: {} bodies, {} joints, nq = {}, nv = {}, nM = {}, {} equalities",
            model.nbody,
            model.njnt,
            model.nq,
            model.nv,
            model.tree.nnz(),
            model.eq.len()
        );
        Ok(model)
    }

    fn check_joint(&self, b: usize, body: &BodySpec, joint: &JointSpec) -> SimResult<()> {
        match joint.kind {
            JointKind::Free => {
                if body.parent != Self::WORLD || body.joints.len() != 1 {
                    return Err(SimError::InvalidModel(format!(
                        "free joint of body {b} ({}) must be the only joint of a root body",
                        body.name
                    )));
                }
            }
            JointKind::Ball => {
                if body.joints.len() != 1 {
                    return Err(SimError::InvalidModel(format!(
                        "ball joint of body {b} ({}) must be the only joint of its body",
                        body.name
                    )));
                }
            }
            JointKind::Slide | JointKind::Hinge => {
                if !(joint.axis.length_squared() > 0.0 && joint.axis.is_finite()) {
                    return Err(SimError::InvalidModel(format!(
                        "joint {:?} of body {b} ({}) needs a nonzero axis",
                        joint.name, body.name
                    )));
                }
            }
        }
        if joint.damping < 0.0 || joint.armature < 0.0 {
            return Err(SimError::InvalidModel(format!(
                "joint {:?} of body {b} ({}) has negative damping or armature",
                joint.name, body.name
            )));
        }
        Ok(())
    }

    /// A body is simple when its block of `M` is diagonal and decoupled: it
    /// hangs from the world, has no children, and either has a single dof or
    /// only mutually orthogonal slides.
    fn body_is_simple(&self, model: &Model, b: usize, has_child: bool) -> bool {
        let dofnum = model.body_dofnum[b];
        if model.body_parent[b] != Self::WORLD || has_child || dofnum == 0 {
            return false;
        }
        if dofnum == 1 {
            return true;
        }
        let jnts = model.body_jntadr[b]..model.body_jntadr[b] + model.body_jntnum[b];
        if jnts.clone().any(|j| model.jnt_type[j] != JointKind::Slide) {
            return false;
        }
        let quat = model.body_quat[b];
        let axes: Vec<DVec3> = jnts.map(|j| quat * model.jnt_axis[j]).collect();
        axes.iter()
            .enumerate()
            .all(|(i, a)| axes[i + 1..].iter().all(|o| a.dot(*o) == 0.0))
    }
}

fn check_equality(model: &Model, e: usize, eq: &Equality) -> SimResult<()> {
    match eq.kind {
        EqualityKind::Connect { body1, body2, .. } => {
            if body1 >= model.nbody || body2 >= model.nbody || body1 == body2 {
                return Err(SimError::InvalidModel(format!(
                    "connect equality {e} references bodies {body1} and {body2}"
                )));
            }
        }
        EqualityKind::Joint { joint1, joint2, .. } => {
            for j in std::iter::once(joint1).chain(joint2) {
                if j >= model.njnt || !model.jnt_type[j].is_scalar() {
                    return Err(SimError::InvalidModel(format!(
                        "joint equality {e} needs hinge or slide joints, got joint {j}"
                    )));
                }
            }
            if joint2 == Some(joint1) {
                return Err(SimError::InvalidModel(format!(
                    "joint equality {e} couples joint {joint1} to itself"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dof_layout_follows_joint_order() {
        let mut builder = ModelBuilder::new();
        let base = builder.add_body(BodySpec::new("base", 0).with_joint(JointSpec::free()));
        let arm = builder.add_body(
            BodySpec::new("arm", base)
                .with_pos(DVec3::new(0.0, 0.0, 0.5))
                .with_joint(JointSpec::ball()),
        );
        builder.add_body(
            BodySpec::new("hand", arm)
                .with_joint(JointSpec::hinge(DVec3::X))
                .with_joint(JointSpec::slide(DVec3::Y)),
        );
        let model = builder.compile().unwrap();

        assert_eq!(model.nq, 7 + 4 + 1 + 1);
        assert_eq!(model.nv, 6 + 3 + 1 + 1);
        assert_eq!(model.jnt_qposadr, vec![0, 7, 11, 12]);
        assert_eq!(model.jnt_dofadr, vec![0, 6, 9, 10]);
        assert_eq!(model.tree.parent(6), Some(5));
        assert_eq!(model.tree.parent(9), Some(8));
        assert_eq!(model.tree.chain(10).len(), 11);
        assert_eq!(model.body_lastdof, vec![None, Some(5), Some(8), Some(10)]);
        assert!(model.tree.simplenum().iter().all(|&s| s == 0));
        assert_eq!(&model.qpos0[7..11], &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn simple_bodies_get_run_lengths() {
        let mut builder = ModelBuilder::new();
        builder.add_body(BodySpec::new("a", 0).with_joint(JointSpec::hinge(DVec3::Z)));
        builder.add_body(
            BodySpec::new("b", 0)
                .with_joint(JointSpec::slide(DVec3::X))
                .with_joint(JointSpec::slide(DVec3::Y))
                .with_joint(JointSpec::slide(DVec3::Z)),
        );
        let parent = builder.add_body(BodySpec::new("c", 0).with_joint(JointSpec::hinge(DVec3::Z)));
        builder.add_body(BodySpec::new("d", parent).with_joint(JointSpec::hinge(DVec3::Z)));
        let model = builder.compile().unwrap();
        assert_eq!(model.tree.simplenum(), &[4, 3, 2, 1, 0, 0]);
    }

    #[test]
    fn skewed_slides_are_not_simple() {
        let mut builder = ModelBuilder::new();
        builder.add_body(
            BodySpec::new("b", 0)
                .with_joint(JointSpec::slide(DVec3::X))
                .with_joint(JointSpec::slide(DVec3::new(1.0, 1.0, 0.0))),
        );
        let model = builder.compile().unwrap();
        assert_eq!(model.tree.simplenum(), &[0, 0]);
    }

    #[test]
    fn free_joint_must_be_on_a_root_body() {
        let mut builder = ModelBuilder::new();
        let base = builder.add_body(BodySpec::new("base", 0).with_joint(JointSpec::hinge(DVec3::Z)));
        builder.add_body(BodySpec::new("floating", base).with_joint(JointSpec::free()));
        assert!(matches!(builder.compile(), Err(SimError::InvalidModel(_))));
    }

    #[test]
    fn joint_equality_rejects_ball_joints() {
        let mut builder = ModelBuilder::new();
        builder.add_body(BodySpec::new("b", 0).with_joint(JointSpec::ball()));
        builder.add_equality(Equality::joint(0, None, 0.0, 0.0));
        assert!(builder.compile().is_err());
    }

    #[test]
    fn non_positive_timestep_is_rejected() {
        for timestep in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            let mut builder = ModelBuilder::new();
            builder.add_body(BodySpec::new("b", 0).with_joint(JointSpec::hinge(DVec3::Z)));
            builder.options_mut().timestep = timestep;
            assert!(matches!(builder.compile(), Err(SimError::InvalidModel(_))));
        }
    }
}
