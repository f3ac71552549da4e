//! Constraint islands: independent blocks of coupled dofs and rows.
//!
//! Two dofs share an island when they are linked through the dof tree or
//! appear together in a constraint row. Only components that carry at least
//! one row become islands; every other dof keeps its smooth acceleration.

use crate::config::Options;
use crate::core::{Data, IslandPhase, Model};
use crate::dynamics::constraint::{ConstraintProblem, ConstraintSolution};
use crate::dynamics::parallel;
use crate::error::{ErrorHandler, SimError, SimResult, Warning};
use crate::sparse::matrix::prefix_sum;
use crate::sparse::{factor_is, CsrMatrix, CsrStructure, FactorReport};

/// Disjoint-set forest with path compression and union by rank.
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Partitions dofs and constraint rows into islands.
///
/// Islands are numbered in order of their first dof; `island_dofind` and
/// `island_efcind` are increasing within each island.
pub fn discover_islands(model: &Model, data: &mut Data) {
    let nv = model.nv;
    let nefc = data.nefc;
    let jac = &data.efc_j.structure;

    let mut uf = UnionFind::new(nv);
    for (i, parent) in model.tree.parents().iter().enumerate() {
        if let Some(p) = *parent {
            uf.union(i, p);
        }
    }
    for r in 0..nefc {
        if let Some((&first, rest)) = jac.row(r).split_first() {
            for &c in rest {
                uf.union(first, c);
            }
        }
    }

    let mut constrained = vec![false; nv];
    for r in 0..nefc {
        if let Some(&first) = jac.row(r).first() {
            let root = uf.find(first);
            constrained[root] = true;
        }
    }

    let mut root_island: Vec<Option<usize>> = vec![None; nv];
    let mut dofnum: Vec<usize> = Vec::new();
    data.dof_island.fill(None);
    data.map_dof2idof.fill(None);
    for i in 0..nv {
        let root = uf.find(i);
        if !constrained[root] {
            continue;
        }
        let id = match root_island[root] {
            Some(id) => id,
            None => {
                dofnum.push(0);
                root_island[root] = Some(dofnum.len() - 1);
                dofnum.len() - 1
            }
        };
        data.dof_island[i] = Some(id);
        data.map_dof2idof[i] = Some(dofnum[id]);
        dofnum[id] += 1;
    }

    let nisland = dofnum.len();
    let dofadr = prefix_sum(&dofnum);
    let mut cursor = dofadr.clone();
    let mut dofind = vec![0; dofnum.iter().sum::<usize>()];
    for i in 0..nv {
        if let Some(id) = data.dof_island[i] {
            dofind[cursor[id]] = i;
            cursor[id] += 1;
        }
    }

    let mut efc_island = vec![None; nefc];
    let mut efcnum = vec![0; nisland];
    for (r, island) in efc_island.iter_mut().enumerate() {
        *island = jac.row(r).first().and_then(|&c| data.dof_island[c]);
        if let Some(id) = *island {
            efcnum[id] += 1;
        }
    }
    let efcadr = prefix_sum(&efcnum);
    let mut cursor = efcadr.clone();
    let mut efcind = vec![0; efcnum.iter().sum::<usize>()];
    for (r, island) in efc_island.iter().enumerate() {
        if let Some(id) = *island {
            efcind[cursor[id]] = r;
            cursor[id] += 1;
        }
    }

    data.nisland = nisland;
    data.island_dofnum = dofnum;
    data.island_dofadr = dofadr;
    data.island_dofind = dofind;
    data.island_efcnum = efcnum;
    data.island_efcadr = efcadr;
    data.island_efcind = efcind;
    data.efc_island = efc_island;
    data.island_phase = vec![IslandPhase::Discovered; nisland];
    data.profiler.island_count = nisland;
}

/// One island's self-contained constraint system in local numbering.
#[derive(Debug, Clone)]
pub struct Island {
    pub index: usize,
    /// Global dof and row indices, increasing.
    pub dofs: Vec<usize>,
    pub rows: Vec<usize>,
    pub phase: IslandPhase,

    structure: CsrStructure,
    simplenum: Vec<usize>,
    qld: Vec<f64>,
    diag_inv: Vec<f64>,
    diag_sqrt_inv: Vec<f64>,
    jac: CsrMatrix,
    aref: Vec<f64>,
    qacc_smooth: Vec<f64>,
    mass_report: FactorReport,
    solution: Option<ConstraintSolution>,
}

impl Island {
    /// Copies the island's block of `M`, its Jacobian rows and right-hand
    /// side out of `data`.
    pub fn gather(model: &Model, data: &Data, index: usize) -> SimResult<Self> {
        let dofs = data.island_dofs(index).to_vec();
        let rows = data.island_rows(index).to_vec();
        let map = &data.map_dof2idof;

        let structure = model.tree.sub_structure(&dofs, map)?;
        let simplenum = model.tree.sub_simplenum(&dofs);
        let mut qld = Vec::with_capacity(structure.nnz());
        for &g in &dofs {
            qld.extend_from_slice(&data.qm[model.tree.structure().row_range(g)]);
        }

        let mut local_rows = Vec::with_capacity(rows.len());
        let mut values = Vec::new();
        for &r in &rows {
            let cols = data
                .efc_j
                .structure
                .row(r)
                .iter()
                .map(|&c| {
                    map[c].ok_or_else(|| {
                        SimError::InvalidModel(format!(
                            "constraint row {r} touches dof {c} outside island {index}"
                        ))
                    })
                })
                .collect::<SimResult<Vec<usize>>>()?;
            local_rows.push(cols);
            values.extend_from_slice(data.efc_j.row_values(r));
        }
        let jac = CsrMatrix::new(
            CsrStructure::from_rows(dofs.len(), &local_rows).with_supernodes(),
            values,
        );

        let n = dofs.len();
        Ok(Self {
            index,
            aref: rows.iter().map(|&r| data.efc_aref[r]).collect(),
            qacc_smooth: dofs.iter().map(|&g| data.qacc_smooth[g]).collect(),
            dofs,
            rows,
            phase: IslandPhase::Discovered,
            structure,
            simplenum,
            qld,
            diag_inv: vec![0.0; n],
            diag_sqrt_inv: vec![0.0; n],
            jac,
            mass_report: FactorReport::default(),
            solution: None,
        })
    }

    pub fn nv(&self) -> usize {
        self.dofs.len()
    }

    pub fn nefc(&self) -> usize {
        self.rows.len()
    }

    /// Report of the local mass-matrix factorization.
    pub fn mass_report(&self) -> &FactorReport {
        &self.mass_report
    }

    /// Factors the local mass matrix and solves the island's constraints.
    pub fn solve(&mut self, opt: &Options, handler: &ErrorHandler) -> SimResult<()> {
        self.mass_report = factor_is(
            &mut self.qld,
            &mut self.diag_inv,
            &self.structure,
            Some(&self.simplenum),
            opt.min_diag,
        );
        for (sqrt_inv, inv) in self.diag_sqrt_inv.iter_mut().zip(&self.diag_inv) {
            *sqrt_inv = inv.max(0.0).sqrt();
        }

        let problem = ConstraintProblem {
            structure: &self.structure,
            qld: &self.qld,
            diag_inv: &self.diag_inv,
            diag_sqrt_inv: &self.diag_sqrt_inv,
            simplenum: &self.simplenum,
            jac: &self.jac,
            aref: &self.aref,
            qacc_smooth: &self.qacc_smooth,
            ratio: opt.regularizer_ratio(),
        };
        let solution = problem.solve()?;
        if let Some(local) = solution.report.first_bad_row {
            handler.warn(Warning::ConstraintPivot, self.rows[local]);
        }
        self.solution = Some(solution);
        self.phase = IslandPhase::Solved;
        Ok(())
    }

    /// Writes the island's results back into the global arrays.
    pub fn scatter(&mut self, data: &mut Data) {
        let Some(solution) = self.solution.take() else {
            return;
        };
        for (k, &r) in self.rows.iter().enumerate() {
            data.efc_diag[r] = solution.diag[k];
            data.efc_r[r] = solution.r[k];
            data.efc_force[r] = solution.force[k];
        }
        for (k, &g) in self.dofs.iter().enumerate() {
            data.qfrc_constraint[g] = solution.qfrc_constraint[k];
            data.qacc[g] = solution.qacc[k];
        }
        self.phase = IslandPhase::Merged;
        data.island_phase[self.index] = IslandPhase::Merged;
    }
}

/// Solves every discovered island and merges the results; dofs outside all
/// islands keep `qacc_smooth`.
pub fn solve_islands(model: &Model, data: &mut Data) -> SimResult<()> {
    let mut islands = (0..data.nisland)
        .map(|i| Island::gather(model, data, i))
        .collect::<SimResult<Vec<_>>>()?;

    parallel::solve_all(&mut islands, model, data)?;

    data.qacc.copy_from_slice(&data.qacc_smooth);
    data.qfrc_constraint.fill(0.0);
    for island in &mut islands {
        data.island_phase[island.index] = island.phase;
        island.scatter(data);
    }
    log::trace!(
        "merged {} islands covering {} of {} dofs",
        islands.len(),
        data.island_dofind.len(),
        model.nv
    );
    Ok(())
}
