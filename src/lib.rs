//! kinetree – sparse constrained multibody dynamics for Rust.
//!
//! Articulated bodies form a kinematic tree whose dofs induce a fixed sparsity
//! pattern on the mass matrix. The crate assembles and factors that matrix
//! with a reverse sparse Cholesky, builds bilateral constraint rows over the
//! same pattern, splits them into independent islands and solves each island
//! serially or on rayon.

pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod sparse;
pub mod utils;
pub mod world;

pub use glam::{DMat3, DQuat, DVec3};

pub use config::Options;
pub use crate::core::{
    BodySpec, Data, DofTree, Equality, EqualityKind, IslandPhase, JointKind, JointSpec, Model,
    ModelBuilder,
};
pub use dynamics::{forward, inverse, step, Integrator, Island};
pub use error::{ErrorHandler, SimError, SimResult, Warning, WarningStat};
pub use sparse::{CsrMatrix, CsrStructure, FactorReport, SparseLdl};
pub use world::World;

/// High-level convenience wrapper that owns a [`World`].
pub struct Engine {
    world: World,
}

impl Engine {
    /// Compiles the model described by `builder`.
    pub fn new(builder: &ModelBuilder) -> SimResult<Self> {
        Ok(Self {
            world: World::from_builder(builder)?,
        })
    }

    /// Advances the simulation by the provided delta time.
    pub fn step(&mut self, dt: f64) -> usize {
        self.world.step(dt)
    }

    /// Enables or disables rayon dispatch of per-island solves.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.world.set_parallel_enabled(enabled);
    }

    /// Returns whether island solves may run in parallel.
    pub fn parallel_enabled(&self) -> bool {
        self.world.parallel_enabled()
    }

    pub fn qpos(&self) -> &[f64] {
        &self.world.data().qpos
    }

    pub fn qvel(&self) -> &[f64] {
        &self.world.data().qvel
    }

    /// Generalized forces applied on the next step.
    pub fn qfrc_applied_mut(&mut self) -> &mut [f64] {
        &mut self.world.data_mut().qfrc_applied
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}
