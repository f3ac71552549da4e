use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Bilateral equality constraints between bodies or joints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EqualityKind {
    /// Pins a point of `body1` to a point of `body2` (3 rows).
    /// Anchors are expressed in the local frame of their body.
    Connect {
        body1: usize,
        body2: usize,
        anchor1: DVec3,
        anchor2: DVec3,
    },
    /// Couples two scalar joints: `q1 - ratio * q2 = offset` (1 row).
    /// Without `joint2` the joint is held at `offset`.
    Joint {
        joint1: usize,
        joint2: Option<usize>,
        ratio: f64,
        offset: f64,
    },
}

/// An equality constraint definition with its initial activation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equality {
    pub name: String,
    pub kind: EqualityKind,
    pub active: bool,
}

impl Equality {
    pub fn connect(body1: usize, body2: usize, anchor1: DVec3, anchor2: DVec3) -> Self {
        Self {
            name: String::new(),
            kind: EqualityKind::Connect {
                body1,
                body2,
                anchor1,
                anchor2,
            },
            active: true,
        }
    }

    pub fn joint(joint1: usize, joint2: Option<usize>, ratio: f64, offset: f64) -> Self {
        Self {
            name: String::new(),
            kind: EqualityKind::Joint {
                joint1,
                joint2,
                ratio,
                offset,
            },
            active: true,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Number of constraint rows this equality contributes when active.
    pub fn rows(&self) -> usize {
        match self.kind {
            EqualityKind::Connect { .. } => 3,
            EqualityKind::Joint { .. } => 1,
        }
    }
}
