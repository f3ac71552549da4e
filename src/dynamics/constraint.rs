//! Equality constraint rows and the soft-constraint solve.
//!
//! Every active equality contributes rows to the sparse Jacobian `J`. Row
//! patterns are closed under dof ancestry so that half solves against the
//! mass-matrix factor stay inside the row pattern.
//!
//! The solve projects the rows through `M`: with `B = J·L^-1·sqrt(D^-1)` the
//! constraint-space inertia is `A = B·B'`. Forces follow from
//! `(A + R)·f = aref - J·qacc_smooth`, with `R` a fixed fraction of `diag(A)`.

use glam::DVec3;

use crate::config::MIN_VAL;
use crate::core::{Data, EqualityKind, Model};
use crate::dynamics::factor::half_solve_row;
use crate::dynamics::kinematics::body_chain;
use crate::error::{SimResult, Warning};
use crate::sparse::{
    add_chains, mul_mat_t_vec_sparse, mul_mat_vec_sparse, solve_lds, sqr_mat_td_alloc,
    transpose_sparse, CsrMatrix, CsrStructure, FactorReport, SparseLdl,
};

/// Builds `efc_j`, `efc_eq` and `efc_pos` from the active equalities.
///
/// Rows whose pattern is structurally empty (both sides welded to the world)
/// are dropped.
pub fn make_constraint(model: &Model, data: &mut Data) {
    let nv = model.nv;
    let mut rows: Vec<Vec<usize>> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    data.efc_eq.clear();
    data.efc_pos.clear();

    if !model.opt.disable_constraints {
        let mut merged = vec![0usize; 2 * nv];
        let mut jac: Vec<DVec3> = Vec::new();

        for (e, eq) in model.eq.iter().enumerate() {
            if !data.eq_active[e] {
                continue;
            }
            match eq.kind {
                EqualityKind::Connect {
                    body1,
                    body2,
                    anchor1,
                    anchor2,
                } => {
                    let p1 = data.xpos[body1] + data.xquat[body1] * anchor1;
                    let p2 = data.xpos[body2] + data.xquat[body2] * anchor2;
                    let chain1 = body_chain(model, body1);
                    let chain2 = body_chain(model, body2);
                    let n = add_chains(&mut merged, chain1, chain2);
                    if n == 0 {
                        log::debug!("equality {e} ({}) moves no dofs, skipped", eq.name);
                        continue;
                    }
                    let cols = &merged[..n];

                    jac.clear();
                    jac.resize(n, DVec3::ZERO);
                    accumulate_chain(&mut jac, cols, chain1, |d| {
                        data.cdof[d].point_velocity(p1)
                    });
                    accumulate_chain(&mut jac, cols, chain2, |d| {
                        -data.cdof[d].point_velocity(p2)
                    });

                    let pos = p1 - p2;
                    for axis in 0..3 {
                        rows.push(cols.to_vec());
                        values.extend(jac.iter().map(|v| v[axis]));
                        data.efc_eq.push(e);
                        data.efc_pos.push(pos[axis]);
                    }
                }
                EqualityKind::Joint {
                    joint1,
                    joint2,
                    ratio,
                    offset,
                } => {
                    let dof1 = model.jnt_dofadr[joint1];
                    let qadr1 = model.jnt_qposadr[joint1];
                    let q1 = data.qpos[qadr1] - model.qpos0[qadr1];

                    let (q2, dof2) = match joint2 {
                        Some(j2) => {
                            let qadr2 = model.jnt_qposadr[j2];
                            (
                                data.qpos[qadr2] - model.qpos0[qadr2],
                                Some(model.jnt_dofadr[j2]),
                            )
                        }
                        None => (0.0, None),
                    };

                    let chain2 = dof2.map_or(&[][..], |d| model.tree.chain(d));
                    let n = add_chains(&mut merged, model.tree.chain(dof1), chain2);
                    let cols = &merged[..n];
                    values.extend(cols.iter().map(|&c| {
                        if c == dof1 {
                            1.0
                        } else if Some(c) == dof2 {
                            -ratio
                        } else {
                            0.0
                        }
                    }));
                    rows.push(cols.to_vec());
                    data.efc_eq.push(e);
                    data.efc_pos.push(q1 - ratio * q2 - offset);
                }
            }
        }
    }

    let nefc = rows.len();
    let structure = CsrStructure::from_rows(nv, &rows).with_supernodes();
    data.efc_j = CsrMatrix::new(structure, values);
    data.nefc = nefc;
    for buf in [
        &mut data.efc_vel,
        &mut data.efc_aref,
        &mut data.efc_diag,
        &mut data.efc_r,
        &mut data.efc_force,
    ] {
        buf.clear();
        buf.resize(nefc, 0.0);
    }
}

/// Adds `f(d)` for every dof `d` of `chain` into the matching slot of `jac`.
fn accumulate_chain(
    jac: &mut [DVec3],
    cols: &[usize],
    chain: &[usize],
    f: impl Fn(usize) -> DVec3,
) {
    let mut k = 0;
    for &d in chain {
        while cols[k] != d {
            k += 1;
        }
        jac[k] += f(d);
    }
}

/// Computes `efc_vel = J·qvel` and the reference acceleration
/// `aref = -b·vel - k·pos`.
pub fn constraint_velocity(model: &Model, data: &mut Data) {
    let (k, b) = model.opt.reference_gains();
    mul_mat_vec_sparse(
        &mut data.efc_vel,
        &data.efc_j.values,
        &data.qvel,
        &data.efc_j.structure,
    );
    for r in 0..data.nefc {
        data.efc_aref[r] = -b * data.efc_vel[r] - k * data.efc_pos[r];
    }
}

/// One constraint system over a set of dofs: the whole model, or one island
/// in local numbering.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConstraintProblem<'a> {
    pub structure: &'a CsrStructure,
    pub qld: &'a [f64],
    pub diag_inv: &'a [f64],
    pub diag_sqrt_inv: &'a [f64],
    pub simplenum: &'a [usize],
    pub jac: &'a CsrMatrix,
    pub aref: &'a [f64],
    pub qacc_smooth: &'a [f64],
    pub ratio: f64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ConstraintSolution {
    pub diag: Vec<f64>,
    pub r: Vec<f64>,
    pub force: Vec<f64>,
    pub qfrc_constraint: Vec<f64>,
    pub qacc: Vec<f64>,
    pub report: FactorReport,
}

impl ConstraintProblem<'_> {
    fn nv(&self) -> usize {
        self.structure.nrows()
    }

    /// `B = J·L^-1·sqrt(D^-1)`, stored over the pattern of `J`.
    fn project(&self) -> CsrMatrix {
        let mut b = CsrMatrix::zeros(self.jac.structure.clone());
        let mut scratch = vec![0.0; self.nv()];
        for r in 0..self.jac.nrows() {
            let range = self.jac.structure.row_range(r);
            half_solve_row(
                self.structure,
                self.qld,
                self.diag_sqrt_inv,
                self.simplenum,
                self.jac.structure.row(r),
                &self.jac.values[range.clone()],
                &mut scratch,
                &mut b.values[range],
            );
        }
        b
    }

    /// `diag(A)` and the regularizer `R`, with `A = B·B'`.
    fn regularizer(&self, b: &CsrMatrix) -> (Vec<f64>, Vec<f64>) {
        let diag: Vec<f64> = (0..b.nrows())
            .map(|r| b.row_values(r).iter().fold(0.0, |acc, v| acc + v * v))
            .collect();
        let r = diag.iter().map(|d| self.ratio * d.max(MIN_VAL)).collect();
        (diag, r)
    }

    /// Diagonal and regularizer of the current configuration without solving.
    pub fn impedance(&self) -> (Vec<f64>, Vec<f64>) {
        let b = self.project();
        self.regularizer(&b)
    }

    /// Assembles and factors `A + R`, solves for the forces and maps them back
    /// to joint space.
    pub fn solve(&self) -> SimResult<ConstraintSolution> {
        let nv = self.nv();
        let nefc = self.jac.nrows();

        let b = self.project();
        let (diag, r) = self.regularizer(&b);

        let bt = transpose_sparse(&b.values, &b.structure);
        let upper = sqr_mat_td_alloc(&bt, &b, None, true)?;
        let mut lower = transpose_sparse(&upper.values, &upper.structure);
        for (row, reg) in r.iter().enumerate() {
            let diag_adr = lower.structure.row_range(row).end - 1;
            lower.values[diag_adr] += reg;
        }

        let mut ldl = SparseLdl::analyze(&lower.structure)?;
        let report = ldl.factorize(&lower.structure, &lower.values, Some(MIN_VAL))?;

        let mut force = vec![0.0; nefc];
        mul_mat_vec_sparse(&mut force, &self.jac.values, self.qacc_smooth, &self.jac.structure);
        for (f, aref) in force.iter_mut().zip(self.aref) {
            *f = aref - *f;
        }
        ldl.solve(&mut force, 1);

        let mut qfrc_constraint = vec![0.0; nv];
        mul_mat_t_vec_sparse(&mut qfrc_constraint, &self.jac.values, &force, &self.jac.structure);

        let mut qacc = qfrc_constraint.clone();
        solve_lds(
            &mut qacc,
            1,
            self.structure,
            self.qld,
            self.diag_inv,
            Some(self.simplenum),
        );
        for (a, smooth) in qacc.iter_mut().zip(self.qacc_smooth) {
            *a += smooth;
        }

        Ok(ConstraintSolution {
            diag,
            r,
            force,
            qfrc_constraint,
            qacc,
            report,
        })
    }
}

fn global_problem<'a>(model: &'a Model, data: &'a Data) -> ConstraintProblem<'a> {
    ConstraintProblem {
        structure: model.tree.structure(),
        qld: &data.qld,
        diag_inv: &data.qld_diag_inv,
        diag_sqrt_inv: &data.qld_diag_sqrt_inv,
        simplenum: model.tree.simplenum(),
        jac: &data.efc_j,
        aref: &data.efc_aref,
        qacc_smooth: &data.qacc_smooth,
        ratio: model.opt.regularizer_ratio(),
    }
}

/// Solves all constraint rows as one system and writes `qacc`.
pub fn solve_global(model: &Model, data: &mut Data) -> SimResult<()> {
    let solution = global_problem(model, data).solve()?;
    if !solution.report.is_positive_definite() {
        data.handler.warn(
            Warning::ConstraintPivot,
            solution.report.first_bad_row.unwrap_or_default(),
        );
    }
    data.efc_diag = solution.diag;
    data.efc_r = solution.r;
    data.efc_force = solution.force;
    data.qfrc_constraint = solution.qfrc_constraint;
    data.qacc = solution.qacc;
    Ok(())
}

/// Constraint forces consistent with a given `qacc`:
/// `f = (aref - J·qacc) / R` and `qfrc_constraint = J'·f`.
pub fn inverse_constraint(model: &Model, data: &mut Data) {
    let (diag, r) = global_problem(model, data).impedance();

    let mut force = vec![0.0; data.nefc];
    mul_mat_vec_sparse(&mut force, &data.efc_j.values, &data.qacc, &data.efc_j.structure);
    for ((f, aref), reg) in force.iter_mut().zip(&data.efc_aref).zip(&r) {
        *f = (aref - *f) / reg;
    }
    mul_mat_t_vec_sparse(
        &mut data.qfrc_constraint,
        &data.efc_j.values,
        &force,
        &data.efc_j.structure,
    );
    data.efc_diag = diag;
    data.efc_r = r;
    data.efc_force = force;
}
