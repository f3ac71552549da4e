//! Reverse sparse Cholesky factorization `M = L'·D·L`.
//!
//! `L` is unit lower triangular. Each row stores its nonzero columns in
//! ascending order with the diagonal as the last entry; the diagonal slot of
//! the factor holds `D`. Elimination runs from the last row to the first, so
//! a kinematic tree ordered parents-first produces no fill.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::sparse::matrix::{prefix_sum, CsrStructure};
use crate::sparse::vector::{add_to_scl_sparse_inc, merge_sorted};

/// Outcome of a numeric factorization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorReport {
    /// Smallest pivot encountered, before any floor was applied.
    pub min_diag: f64,
    /// Number of pivots raised to the floor (or found non-positive without one).
    pub floored: usize,
    /// First row whose pivot was floored or non-positive.
    pub first_bad_row: Option<usize>,
}

impl Default for FactorReport {
    fn default() -> Self {
        Self {
            min_diag: f64::INFINITY,
            floored: 0,
            first_bad_row: None,
        }
    }
}

impl FactorReport {
    pub fn is_positive_definite(&self) -> bool {
        self.floored == 0
    }

    fn record(&mut self, row: usize, pivot: f64, min_diag: Option<f64>) -> f64 {
        self.min_diag = self.min_diag.min(pivot);
        match min_diag {
            Some(floor) if pivot.is_nan() || pivot < floor => {
                self.flag(row);
                floor
            }
            None if pivot.is_nan() || pivot <= 0.0 => {
                self.flag(row);
                pivot
            }
            _ => pivot,
        }
    }

    fn flag(&mut self, row: usize) {
        self.floored += 1;
        // rows are visited last to first
        self.first_bad_row = Some(row);
    }
}

#[inline]
fn is_simple(simplenum: Option<&[usize]>, i: usize) -> bool {
    simplenum.is_some_and(|s| s[i] > 0)
}

/// Predicts the per-row nonzero counts of the reverse factor `L`.
///
/// `structure` is the upper (or full) pattern of a symmetric matrix; entries
/// on or below the diagonal are ignored. Counts include the diagonal.
/// Returns the total.
pub fn chol_factor_count(l_rownnz: &mut [usize], structure: &CsrStructure) -> usize {
    let n = structure.nrows;
    let mut parent: Vec<Option<usize>> = vec![None; n];
    let mut flag = vec![usize::MAX; n];

    for r in (0..n).rev() {
        flag[r] = r;
        l_rownnz[r] = 1;
        for &col in structure.row(r) {
            if col <= r {
                continue;
            }
            let mut i = col;
            while flag[i] != r {
                if parent[i].is_none() {
                    parent[i] = Some(r);
                }
                l_rownnz[i] += 1;
                flag[i] = r;
                match parent[i] {
                    Some(p) => i = p,
                    None => break,
                }
            }
        }
    }

    l_rownnz[..n].iter().sum()
}

/// In-place factorization over a tree pattern.
///
/// On entry `values` holds the lower triangle of a symmetric matrix in
/// `structure`, whose rows must be ancestor chains: the columns of row `k`
/// up to and including `i` equal the full pattern of row `i`. On exit it
/// holds `L` with `D` on the diagonal slots, and `diag_inv[i] = 1 / D[i]`.
///
/// Rows flagged by `simplenum` have no off-diagonal entries and skip
/// elimination. `min_diag` floors the pivots.
pub fn factor_is(
    values: &mut [f64],
    diag_inv: &mut [f64],
    structure: &CsrStructure,
    simplenum: Option<&[usize]>,
    min_diag: Option<f64>,
) -> FactorReport {
    let mut report = FactorReport::default();
    let rowadr = &structure.rowadr;
    let rownnz = &structure.rownnz;
    let colind = &structure.colind;

    for k in (0..structure.nrows).rev() {
        let start = rowadr[k];
        let nnz = rownnz[k];
        let diag = start + nnz - 1;

        let pivot = report.record(k, values[diag], min_diag);
        values[diag] = pivot;
        let inv = 1.0 / pivot;
        diag_inv[k] = inv;

        if nnz == 1 || is_simple(simplenum, k) {
            continue;
        }

        let (lo, hi) = values.split_at_mut(start);
        let row_k = &mut hi[..nnz];
        for adr in (0..nnz - 1).rev() {
            let i = colind[start + adr];
            let tmp = row_k[adr] * inv;
            let row_i = &mut lo[rowadr[i]..rowadr[i] + rownnz[i]];
            for (dst, src) in row_i.iter_mut().zip(&row_k[..=adr]) {
                *dst -= tmp * src;
            }
        }
        for v in &mut row_k[..nnz - 1] {
            *v *= inv;
        }
    }
    report
}

/// Solves `(L'·D·L)·x = b` in place for `n` vectors stored back to back.
pub fn solve_lds(
    x: &mut [f64],
    n: usize,
    structure: &CsrStructure,
    qld: &[f64],
    diag_inv: &[f64],
    simplenum: Option<&[usize]>,
) {
    let nv = structure.nrows;
    for v in 0..n {
        let x = &mut x[v * nv..(v + 1) * nv];

        // x <- L^-T x
        for i in (0..nv).rev() {
            if is_simple(simplenum, i) {
                continue;
            }
            let xi = x[i];
            if xi == 0.0 {
                continue;
            }
            let range = structure.row_range(i);
            for adr in range.start..range.end - 1 {
                x[structure.colind[adr]] -= qld[adr] * xi;
            }
        }

        for (xi, d) in x.iter_mut().zip(diag_inv) {
            *xi *= d;
        }

        // x <- L^-1 x
        for i in 0..nv {
            if is_simple(simplenum, i) {
                continue;
            }
            let range = structure.row_range(i);
            let mut acc = 0.0;
            for adr in range.start..range.end - 1 {
                acc += qld[adr] * x[structure.colind[adr]];
            }
            x[i] -= acc;
        }
    }
}

/// Half solve `x = sqrt(D^-1)·L^-T·y` for `n` vectors stored back to back.
///
/// `dot(y, M^-1·y) == dot(x, x)` up to rounding.
pub fn solve_m2(
    x: &mut [f64],
    y: &[f64],
    n: usize,
    structure: &CsrStructure,
    qld: &[f64],
    diag_sqrt_inv: &[f64],
    simplenum: Option<&[usize]>,
) {
    let nv = structure.nrows;
    x[..n * nv].copy_from_slice(&y[..n * nv]);
    for v in 0..n {
        let x = &mut x[v * nv..(v + 1) * nv];
        for i in (0..nv).rev() {
            if is_simple(simplenum, i) {
                continue;
            }
            let xi = x[i];
            if xi == 0.0 {
                continue;
            }
            let range = structure.row_range(i);
            for adr in range.start..range.end - 1 {
                x[structure.colind[adr]] -= qld[adr] * xi;
            }
        }
        for (xi, d) in x.iter_mut().zip(diag_sqrt_inv) {
            *xi *= d;
        }
    }
}

/// Half product `y = sqrt(D)·L·x`, so that `dot(y, y) == x'·M·x`.
pub fn mul_m2(
    y: &mut [f64],
    x: &[f64],
    structure: &CsrStructure,
    qld: &[f64],
    diag_sqrt_inv: &[f64],
) {
    let nv = structure.nrows;
    for i in 0..nv {
        let range = structure.row_range(i);
        let mut acc = x[i];
        for adr in range.start..range.end - 1 {
            acc += qld[adr] * x[structure.colind[adr]];
        }
        y[i] = acc / diag_sqrt_inv[i];
    }
}

/// General sparse `L'·D·L` factorization with a precomputed fill pattern.
///
/// Input matrices are given by their lower triangle with the diagonal stored
/// last in every row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparseLdl {
    structure: CsrStructure,
    values: Vec<f64>,
    diag_inv: Vec<f64>,
}

impl SparseLdl {
    /// Symbolic factorization: computes the fill pattern of `L`.
    pub fn analyze(lower: &CsrStructure) -> SimResult<Self> {
        let n = lower.nrows;
        if lower.ncols != n {
            return Err(SimError::DimensionMismatch {
                context: "SparseLdl::analyze square",
                expected: n,
                actual: lower.ncols,
            });
        }

        let mut rows: Vec<Vec<usize>> = Vec::with_capacity(n);
        for r in 0..n {
            let row = lower.row(r);
            if row.last() != Some(&r) {
                return Err(SimError::InvalidModel(format!(
                    "row {r} of the lower pattern must end with its diagonal"
                )));
            }
            rows.push(row.to_vec());
        }

        let mut merged = Vec::new();
        for k in (0..n).rev() {
            let pattern_k = std::mem::take(&mut rows[k]);
            for (pos, &i) in pattern_k[..pattern_k.len() - 1].iter().enumerate() {
                let prefix = &pattern_k[..pos];
                if prefix.is_empty() {
                    continue;
                }
                merged.resize(rows[i].len() + prefix.len(), 0);
                let count = merge_sorted(&mut merged, &rows[i], prefix);
                rows[i].clear();
                rows[i].extend_from_slice(&merged[..count]);
            }
            rows[k] = pattern_k;
        }

        let rownnz: Vec<usize> = rows.iter().map(Vec::len).collect();
        let rowadr = prefix_sum(&rownnz);
        let colind: Vec<usize> = rows.into_iter().flatten().collect();
        let nnz = colind.len();
        Ok(Self {
            structure: CsrStructure {
                nrows: n,
                ncols: n,
                rownnz,
                rowadr,
                colind,
                rowsuper: None,
            },
            values: vec![0.0; nnz],
            diag_inv: vec![0.0; n],
        })
    }

    /// Numeric factorization of a matrix whose lower pattern was analyzed.
    pub fn factorize(
        &mut self,
        lower: &CsrStructure,
        values: &[f64],
        min_diag: Option<f64>,
    ) -> SimResult<FactorReport> {
        let n = self.structure.nrows;
        if lower.nrows != n {
            return Err(SimError::DimensionMismatch {
                context: "SparseLdl::factorize rows",
                expected: n,
                actual: lower.nrows,
            });
        }

        self.values.fill(0.0);
        for r in 0..n {
            let dst = self.structure.row_range(r);
            add_to_scl_sparse_inc(
                &mut self.values[dst.clone()],
                &self.structure.colind[dst],
                &values[lower.row_range(r)],
                lower.row(r),
                1.0,
            );
        }

        let mut report = FactorReport::default();
        let s = &self.structure;
        for k in (0..n).rev() {
            let start = s.rowadr[k];
            let nnz = s.rownnz[k];
            let diag = start + nnz - 1;

            let pivot = report.record(k, self.values[diag], min_diag);
            self.values[diag] = pivot;
            let inv = 1.0 / pivot;
            self.diag_inv[k] = inv;

            let (lo, hi) = self.values.split_at_mut(start);
            let row_k = &mut hi[..nnz];
            let cols_k = &s.colind[start..start + nnz];
            for adr in 0..nnz - 1 {
                let i = cols_k[adr];
                let tmp = row_k[adr] * inv;
                let range_i = s.row_range(i);
                add_to_scl_sparse_inc(
                    &mut lo[range_i.clone()],
                    &s.colind[range_i],
                    &row_k[..=adr],
                    &cols_k[..=adr],
                    -tmp,
                );
            }
            for v in &mut row_k[..nnz - 1] {
                *v *= inv;
            }
        }
        Ok(report)
    }

    /// Solves `A·x = b` in place for `n` vectors stored back to back.
    pub fn solve(&self, x: &mut [f64], n: usize) {
        solve_lds(x, n, &self.structure, &self.values, &self.diag_inv, None);
    }

    pub fn structure(&self) -> &CsrStructure {
        &self.structure
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn diag_inv(&self) -> &[f64] {
        &self.diag_inv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Chain 0 <- 1 <- 2 plus a separate root 3.
    fn chain_structure() -> CsrStructure {
        CsrStructure::from_rows(4, &[vec![0], vec![0, 1], vec![0, 1, 2], vec![3]])
    }

    fn chain_values() -> Vec<f64> {
        vec![
            4.0, //
            1.0, 3.0, //
            0.5, 0.25, 2.0, //
            5.0,
        ]
    }

    fn dense_from_lower(structure: &CsrStructure, values: &[f64]) -> Vec<f64> {
        let n = structure.nrows();
        let mut dense = vec![0.0; n * n];
        for r in 0..n {
            for adr in structure.row_range(r) {
                let c = structure.colind()[adr];
                dense[r * n + c] = values[adr];
                dense[c * n + r] = values[adr];
            }
        }
        dense
    }

    #[test]
    fn factor_reconstructs_matrix() {
        let structure = chain_structure();
        let original = chain_values();
        let mut qld = original.clone();
        let mut diag_inv = vec![0.0; 4];
        let report = factor_is(&mut qld, &mut diag_inv, &structure, None, None);
        assert!(report.is_positive_definite());

        // rebuild L' D L
        let n = 4;
        let mut l = vec![0.0; n * n];
        let mut d = vec![0.0; n];
        for r in 0..n {
            let range = structure.row_range(r);
            for adr in range.start..range.end - 1 {
                l[r * n + structure.colind()[adr]] = qld[adr];
            }
            l[r * n + r] = 1.0;
            d[r] = qld[range.end - 1];
            assert_relative_eq!(diag_inv[r], 1.0 / d[r], epsilon = 1e-15);
        }
        let dense = dense_from_lower(&structure, &original);
        for i in 0..n {
            for j in 0..n {
                let rebuilt: f64 = (0..n).map(|k| l[k * n + i] * d[k] * l[k * n + j]).sum();
                assert_relative_eq!(rebuilt, dense[i * n + j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn solve_recovers_rhs() {
        let structure = chain_structure();
        let original = chain_values();
        let mut qld = original.clone();
        let mut diag_inv = vec![0.0; 4];
        factor_is(&mut qld, &mut diag_inv, &structure, None, None);

        let x_true = [1.0, -2.0, 0.5, 3.0, 0.0, 1.0, 1.0, -1.0];
        let mut b = vec![0.0; 8];
        for v in 0..2 {
            crate::sparse::matrix::mul_sym_vec_sparse(
                &mut b[v * 4..(v + 1) * 4],
                &original,
                &x_true[v * 4..(v + 1) * 4],
                &structure,
            );
        }
        solve_lds(&mut b, 2, &structure, &qld, &diag_inv, None);
        for (got, want) in b.iter().zip(&x_true) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn half_solve_and_half_product_identities() {
        let structure = chain_structure();
        let original = chain_values();
        let mut qld = original.clone();
        let mut diag_inv = vec![0.0; 4];
        factor_is(&mut qld, &mut diag_inv, &structure, None, None);
        let sqrt_inv: Vec<f64> = diag_inv.iter().map(|d| d.sqrt()).collect();

        let y = [0.3, -1.0, 2.0, 0.7];
        let mut minv_y = y.to_vec();
        solve_lds(&mut minv_y, 1, &structure, &qld, &diag_inv, None);
        let mut x = [0.0; 4];
        solve_m2(&mut x, &y, 1, &structure, &qld, &sqrt_inv, None);
        let lhs: f64 = y.iter().zip(&minv_y).map(|(a, b)| a * b).sum();
        let rhs: f64 = x.iter().map(|v| v * v).sum();
        assert_relative_eq!(lhs, rhs, epsilon = 1e-12);

        let mut mx = [0.0; 4];
        crate::sparse::matrix::mul_sym_vec_sparse(&mut mx, &original, &y, &structure);
        let mut half = [0.0; 4];
        mul_m2(&mut half, &y, &structure, &qld, &sqrt_inv);
        let xmx: f64 = y.iter().zip(&mx).map(|(a, b)| a * b).sum();
        let yy: f64 = half.iter().map(|v| v * v).sum();
        assert_relative_eq!(xmx, yy, epsilon = 1e-12);
    }

    #[test]
    fn simple_rows_do_not_change_the_factor() {
        let structure = CsrStructure::from_rows(3, &[vec![0], vec![1], vec![1, 2]]);
        let values = vec![2.0, 3.0, 1.0, 4.0];
        let simplenum = [1, 0, 0];

        let mut plain = values.clone();
        let mut plain_inv = vec![0.0; 3];
        factor_is(&mut plain, &mut plain_inv, &structure, None, None);
        let mut skipped = values.clone();
        let mut skipped_inv = vec![0.0; 3];
        factor_is(&mut skipped, &mut skipped_inv, &structure, Some(&simplenum), None);
        assert_eq!(plain, skipped);
        assert_eq!(plain_inv, skipped_inv);

        let mut a = vec![1.0, 2.0, 3.0];
        let mut b = a.clone();
        solve_lds(&mut a, 1, &structure, &plain, &plain_inv, None);
        solve_lds(&mut b, 1, &structure, &plain, &plain_inv, Some(&simplenum));
        assert_eq!(a, b);
    }

    #[test]
    fn floor_reports_rank_deficiency() {
        let structure = CsrStructure::from_rows(2, &[vec![0], vec![0, 1]]);
        // [[1, 1], [1, 1]] is singular
        let mut values = vec![1.0, 1.0, 1.0];
        let mut diag_inv = vec![0.0; 2];
        let report = factor_is(&mut values, &mut diag_inv, &structure, None, Some(1e-10));
        assert_eq!(report.floored, 1);
        assert_eq!(report.first_bad_row, Some(0));
        assert_eq!(report.min_diag, 0.0);
        assert!(diag_inv.iter().all(|d| d.is_finite()));
    }

    #[test]
    fn nan_pivots_count_as_deficient() {
        let structure = CsrStructure::from_rows(2, &[vec![0], vec![0, 1]]);
        let mut values = vec![1.0, 0.0, f64::NAN];
        let mut diag_inv = vec![0.0; 2];
        let report = factor_is(&mut values, &mut diag_inv, &structure, None, Some(1e-10));
        assert_eq!(report.floored, 1);
        assert_eq!(report.first_bad_row, Some(1));
        assert_eq!(values[2], 1e-10);
        assert!(diag_inv.iter().all(|d| d.is_finite()));

        // without a floor the NaN spreads to the parent row
        let mut values = vec![1.0, 0.0, f64::NAN];
        let report = factor_is(&mut values, &mut diag_inv, &structure, None, None);
        assert!(!report.is_positive_definite());
        assert_eq!(report.floored, 2);
        assert_eq!(report.first_bad_row, Some(0));
    }

    #[test]
    fn general_ldl_fills_and_matches_counts() {
        // arrow pattern: the last row couples to everything below it
        let lower = CsrStructure::from_rows(
            4,
            &[vec![0], vec![1], vec![0, 2], vec![1, 2, 3]],
        );
        let ldl = SparseLdl::analyze(&lower).unwrap();
        // eliminating row 3 couples 1 and 2; eliminating 2 then couples 0 and 1
        assert_eq!(ldl.structure().row(2), &[0, 1, 2]);
        assert_eq!(ldl.structure().row(1), &[0, 1]);

        let upper = crate::sparse::structure::transpose_sparse(&vec![0.0; lower.nnz()], &lower);
        let mut counts = vec![0; 4];
        let total = chol_factor_count(&mut counts, &upper.structure);
        assert_eq!(counts, ldl.structure().rownnz());
        assert_eq!(total, ldl.structure().nnz());
    }

    #[test]
    fn general_ldl_solves() {
        let lower = CsrStructure::from_rows(
            4,
            &[vec![0], vec![1], vec![0, 2], vec![1, 2, 3]],
        );
        let values = vec![4.0, 5.0, 1.0, 6.0, 1.5, -1.0, 7.0];
        let mut ldl = SparseLdl::analyze(&lower).unwrap();
        let report = ldl.factorize(&lower, &values, None).unwrap();
        assert!(report.is_positive_definite());

        let x_true = [1.0, 2.0, -3.0, 0.5];
        let mut b = [0.0; 4];
        crate::sparse::matrix::mul_sym_vec_sparse(&mut b, &values, &x_true, &lower);
        ldl.solve(&mut b, 1);
        for (got, want) in b.iter().zip(&x_true) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }
    }
}
