//! Core types: the model builder, the compiled model, the dof tree and the
//! per-step simulation data.

pub mod articulations;
pub mod constraints;
pub mod data;
pub mod model;
pub mod tree;

pub use articulations::{BodySpec, JointKind, JointSpec, ModelBuilder};
pub use constraints::{Equality, EqualityKind};
pub use data::{Data, IslandPhase};
pub use model::Model;
pub use tree::DofTree;
