//! Mass-matrix factorization and the products/solves built on it.

use crate::core::{Data, Model};
use crate::error::Warning;
use crate::sparse::{self, mul_sym_vec_sparse};

/// Factors `data.qm` into `data.qld` and refreshes the inverse diagonals.
///
/// A floored or non-positive pivot raises [`Warning::Inertia`] with the first
/// offending dof.
pub fn factor_m(model: &Model, data: &mut Data) {
    data.qld.copy_from_slice(&data.qm);
    let report = sparse::factor_is(
        &mut data.qld,
        &mut data.qld_diag_inv,
        model.tree.structure(),
        Some(model.tree.simplenum()),
        model.opt.min_diag,
    );
    for (sqrt_inv, inv) in data.qld_diag_sqrt_inv.iter_mut().zip(&data.qld_diag_inv) {
        *sqrt_inv = inv.max(0.0).sqrt();
    }
    if !report.is_positive_definite() {
        data.handler
            .warn(Warning::Inertia, report.first_bad_row.unwrap_or_default());
    }
    data.factor_report = report;
}

fn check_len(model: &Model, data: &Data, what: &str, len: usize, n: usize) {
    if len < n * model.nv {
        data.handler.fatal(&format!(
            "{what}: buffer of length {len} cannot hold {n} vectors of size {}",
            model.nv
        ));
    }
}

/// Solves `M·x = b` in place for `n` vectors using the current factor.
pub fn solve_m(model: &Model, data: &Data, x: &mut [f64], n: usize) {
    check_len(model, data, "solve_m", x.len(), n);
    sparse::solve_lds(
        x,
        n,
        model.tree.structure(),
        &data.qld,
        &data.qld_diag_inv,
        Some(model.tree.simplenum()),
    );
}

/// Half solve `x = sqrt(D^-1)·L^-T·y` for `n` vectors.
pub fn solve_m2(model: &Model, data: &Data, x: &mut [f64], y: &[f64], n: usize) {
    check_len(model, data, "solve_m2", x.len().min(y.len()), n);
    sparse::solve_m2(
        x,
        y,
        n,
        model.tree.structure(),
        &data.qld,
        &data.qld_diag_sqrt_inv,
        Some(model.tree.simplenum()),
    );
}

/// `res = M·vec` from the stored lower triangle.
pub fn mul_m(model: &Model, data: &Data, res: &mut [f64], vec: &[f64]) {
    check_len(model, data, "mul_m", res.len().min(vec.len()), 1);
    mul_sym_vec_sparse(res, &data.qm, vec, model.tree.structure());
}

/// `res = sqrt(D)·L·vec`, so that `|res|^2 = vec'·M·vec`.
pub fn mul_m2(model: &Model, data: &Data, res: &mut [f64], vec: &[f64]) {
    check_len(model, data, "mul_m2", res.len().min(vec.len()), 1);
    sparse::mul_m2(
        res,
        vec,
        model.tree.structure(),
        &data.qld,
        &data.qld_diag_sqrt_inv,
    );
}

/// Expands the stored lower triangle of `M` into a dense symmetric matrix.
pub fn full_m(model: &Model, data: &Data, dst: &mut [f64]) {
    let nv = model.nv;
    check_len(model, data, "full_m", dst.len(), nv);
    let structure = model.tree.structure();
    dst[..nv * nv].fill(0.0);
    for i in 0..nv {
        for adr in structure.row_range(i) {
            let j = structure.colind[adr];
            dst[i * nv + j] = data.qm[adr];
            dst[j * nv + i] = data.qm[adr];
        }
    }
}

/// Half solve of one sparse row `y` whose columns are ancestor-closed.
///
/// `dense` is an `nv` scratch vector that must be zero on entry and is zero
/// again on exit. The result is written to `out` in the order of `cols`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn half_solve_row(
    structure: &sparse::CsrStructure,
    qld: &[f64],
    diag_sqrt_inv: &[f64],
    simplenum: &[usize],
    cols: &[usize],
    y: &[f64],
    dense: &mut [f64],
    out: &mut [f64],
) {
    for (&c, &v) in cols.iter().zip(y) {
        dense[c] = v;
    }
    for &i in cols.iter().rev() {
        if simplenum[i] > 0 {
            continue;
        }
        let xi = dense[i];
        if xi == 0.0 {
            continue;
        }
        let range = structure.row_range(i);
        for adr in range.start..range.end - 1 {
            dense[structure.colind[adr]] -= qld[adr] * xi;
        }
    }
    for (o, &c) in out.iter_mut().zip(cols) {
        *o = dense[c] * diag_sqrt_inv[c];
        dense[c] = 0.0;
    }
}
