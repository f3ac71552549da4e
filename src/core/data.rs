//! Per-step simulation state.
//!
//! [`Data`] owns every buffer the pipeline writes. It is sized once from a
//! [`Model`] and reused across steps; only the constraint and island arrays
//! change length from one step to the next.

use std::sync::Arc;

use glam::{DQuat, DVec3};

use super::model::Model;
use crate::error::ErrorHandler;
use crate::sparse::{CsrMatrix, FactorReport};
use crate::utils::profiling::StageProfiler;
use crate::utils::spatial::{SpatialInertia, SpatialVec};

/// Lifecycle of an island within one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IslandPhase {
    #[default]
    Inactive,
    Discovered,
    Solved,
    Merged,
}

#[derive(Debug)]
pub struct Data {
    pub time: f64,

    // state and inputs
    pub qpos: Vec<f64>,
    pub qvel: Vec<f64>,
    pub qacc: Vec<f64>,
    pub qfrc_applied: Vec<f64>,
    pub eq_active: Vec<bool>,

    // position dependent
    pub xpos: Vec<DVec3>,
    pub xquat: Vec<DQuat>,
    pub xipos: Vec<DVec3>,
    pub xanchor: Vec<DVec3>,
    pub xaxis: Vec<DVec3>,
    pub cinert: Vec<SpatialInertia>,
    pub crb: Vec<SpatialInertia>,
    pub cdof: Vec<SpatialVec>,

    // mass matrix and factor, stored over `Model::tree`
    pub qm: Vec<f64>,
    pub qld: Vec<f64>,
    pub qld_diag_inv: Vec<f64>,
    pub qld_diag_sqrt_inv: Vec<f64>,
    pub factor_report: FactorReport,

    // velocity dependent
    pub cvel: Vec<SpatialVec>,
    pub cdof_dot: Vec<SpatialVec>,
    pub cacc: Vec<SpatialVec>,
    pub cfrc: Vec<SpatialVec>,

    // forces
    pub qfrc_bias: Vec<f64>,
    pub qfrc_passive: Vec<f64>,
    pub qfrc_smooth: Vec<f64>,
    pub qacc_smooth: Vec<f64>,
    pub qfrc_constraint: Vec<f64>,
    pub qfrc_inverse: Vec<f64>,

    // constraints
    pub nefc: usize,
    pub efc_j: CsrMatrix,
    pub efc_eq: Vec<usize>,
    pub efc_pos: Vec<f64>,
    pub efc_vel: Vec<f64>,
    pub efc_aref: Vec<f64>,
    pub efc_diag: Vec<f64>,
    pub efc_r: Vec<f64>,
    pub efc_force: Vec<f64>,

    // islands
    pub nisland: usize,
    pub island_dofnum: Vec<usize>,
    pub island_dofadr: Vec<usize>,
    pub island_dofind: Vec<usize>,
    pub island_efcnum: Vec<usize>,
    pub island_efcadr: Vec<usize>,
    pub island_efcind: Vec<usize>,
    pub island_phase: Vec<IslandPhase>,
    pub dof_island: Vec<Option<usize>>,
    pub map_dof2idof: Vec<Option<usize>>,
    pub efc_island: Vec<Option<usize>>,

    pub handler: Arc<ErrorHandler>,
    #[cfg(feature = "parallel")]
    pub(crate) thread_pool: Option<Arc<rayon::ThreadPool>>,
    pub profiler: StageProfiler,
}

impl Data {
    pub fn new(model: &Model) -> Self {
        let (nv, nbody, njnt) = (model.nv, model.nbody, model.njnt);
        let nm = model.tree.nnz();
        Self {
            time: 0.0,
            qpos: model.qpos0.clone(),
            qvel: vec![0.0; nv],
            qacc: vec![0.0; nv],
            qfrc_applied: vec![0.0; nv],
            eq_active: model.eq.iter().map(|eq| eq.active).collect(),

            xpos: vec![DVec3::ZERO; nbody],
            xquat: vec![DQuat::IDENTITY; nbody],
            xipos: vec![DVec3::ZERO; nbody],
            xanchor: vec![DVec3::ZERO; njnt],
            xaxis: vec![DVec3::ZERO; njnt],
            cinert: vec![SpatialInertia::ZERO; nbody],
            crb: vec![SpatialInertia::ZERO; nbody],
            cdof: vec![SpatialVec::ZERO; nv],

            qm: vec![0.0; nm],
            qld: vec![0.0; nm],
            qld_diag_inv: vec![0.0; nv],
            qld_diag_sqrt_inv: vec![0.0; nv],
            factor_report: FactorReport::default(),

            cvel: vec![SpatialVec::ZERO; nbody],
            cdof_dot: vec![SpatialVec::ZERO; nv],
            cacc: vec![SpatialVec::ZERO; nbody],
            cfrc: vec![SpatialVec::ZERO; nbody],

            qfrc_bias: vec![0.0; nv],
            qfrc_passive: vec![0.0; nv],
            qfrc_smooth: vec![0.0; nv],
            qacc_smooth: vec![0.0; nv],
            qfrc_constraint: vec![0.0; nv],
            qfrc_inverse: vec![0.0; nv],

            nefc: 0,
            efc_j: CsrMatrix::zeros(crate::sparse::CsrStructure::empty(0, nv)),
            efc_eq: Vec::new(),
            efc_pos: Vec::new(),
            efc_vel: Vec::new(),
            efc_aref: Vec::new(),
            efc_diag: Vec::new(),
            efc_r: Vec::new(),
            efc_force: Vec::new(),

            nisland: 0,
            island_dofnum: Vec::new(),
            island_dofadr: Vec::new(),
            island_dofind: Vec::new(),
            island_efcnum: Vec::new(),
            island_efcadr: Vec::new(),
            island_efcind: Vec::new(),
            island_phase: Vec::new(),
            dof_island: vec![None; nv],
            map_dof2idof: vec![None; nv],
            efc_island: Vec::new(),

            handler: Arc::new(ErrorHandler::new()),
            #[cfg(feature = "parallel")]
            thread_pool: None,
            profiler: StageProfiler::default(),
        }
    }

    /// Replaces the error/warning sink shared with island workers.
    pub fn set_error_handler(&mut self, handler: Arc<ErrorHandler>) {
        self.handler = handler;
    }

    /// Binds a rayon pool used for per-island work when parallel solving is enabled.
    #[cfg(feature = "parallel")]
    pub fn bind_thread_pool(&mut self, pool: Arc<rayon::ThreadPool>) {
        self.thread_pool = Some(pool);
    }

    #[cfg(feature = "parallel")]
    pub fn unbind_thread_pool(&mut self) {
        self.thread_pool = None;
    }

    /// Restores the initial state: `qpos0`, zero velocity, and default activations.
    pub fn reset(&mut self, model: &Model) {
        self.time = 0.0;
        self.qpos.copy_from_slice(&model.qpos0);
        self.qvel.fill(0.0);
        self.qacc.fill(0.0);
        self.qfrc_applied.fill(0.0);
        for (active, eq) in self.eq_active.iter_mut().zip(&model.eq) {
            *active = eq.active;
        }
        self.nefc = 0;
        self.clear_islands();
        self.handler.clear_warnings();
        self.profiler.reset();
    }

    /// Drops the island partition of the previous step. Every dof and row
    /// is left unassigned and no island phase remains.
    pub fn clear_islands(&mut self) {
        self.nisland = 0;
        self.island_dofnum.clear();
        self.island_dofadr.clear();
        self.island_dofind.clear();
        self.island_efcnum.clear();
        self.island_efcadr.clear();
        self.island_efcind.clear();
        self.island_phase.clear();
        self.dof_island.fill(None);
        self.map_dof2idof.fill(None);
        self.efc_island.clear();
        self.profiler.island_count = 0;
    }

    /// Dofs of island `i`, in increasing order.
    pub fn island_dofs(&self, i: usize) -> &[usize] {
        let adr = self.island_dofadr[i];
        &self.island_dofind[adr..adr + self.island_dofnum[i]]
    }

    /// Constraint rows of island `i`, in increasing order.
    pub fn island_rows(&self, i: usize) -> &[usize] {
        let adr = self.island_efcadr[i];
        &self.island_efcind[adr..adr + self.island_efcnum[i]]
    }
}
