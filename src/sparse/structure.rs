//! Sparsity structure construction: transposes, supernodes, `M'·diag·M`
//! products and dof chain unions.

use crate::error::{SimError, SimResult};
use crate::sparse::matrix::{prefix_sum, CsrMatrix, CsrStructure};
use crate::sparse::vector::merge_sorted;

/// Transposes a CSR matrix in two passes: column occupancy, then fill.
///
/// Rows are visited in order, so every output row comes out sorted.
pub fn transpose_sparse(values: &[f64], structure: &CsrStructure) -> CsrMatrix {
    let (nr, nc) = (structure.nrows, structure.ncols);

    let mut rownnz = vec![0usize; nc];
    for r in 0..nr {
        for &c in structure.row(r) {
            rownnz[c] += 1;
        }
    }
    let rowadr = prefix_sum(&rownnz);
    let nnz: usize = rownnz.iter().sum();

    let mut colind = vec![0usize; nnz];
    let mut res = vec![0.0; nnz];
    let mut cursor = rowadr.clone();
    for r in 0..nr {
        for adr in structure.row_range(r) {
            let c = structure.colind[adr];
            let dst = cursor[c];
            colind[dst] = r;
            res[dst] = values[adr];
            cursor[c] += 1;
        }
    }

    CsrMatrix {
        structure: CsrStructure {
            nrows: nc,
            ncols: nr,
            rownnz,
            rowadr,
            colind,
            rowsuper: None,
        },
        values: res,
    }
}

/// Fills `rowsuper[r]` with the number of rows directly below `r` that share
/// its exact column pattern.
pub fn super_sparse(structure: &CsrStructure, rowsuper: &mut [usize]) {
    let nr = structure.nrows;
    if nr == 0 {
        return;
    }
    rowsuper[nr - 1] = 0;
    for r in (0..nr - 1).rev() {
        rowsuper[r] = if structure.row(r) == structure.row(r + 1) {
            rowsuper[r + 1] + 1
        } else {
            0
        };
    }
}

/// Predicts the row counts of `res = mat'·diag·mat`.
///
/// `mat` is `nr x nc`, `mat_t` its transpose (`nc x nr`). Rows of `mat_t`
/// in one supernode produce the same union pattern, so the merge is done once
/// per run. With `upper`, only columns `>= row` are counted. Returns the row
/// addresses of a compressed layout and the total count.
pub fn sqr_mat_td_count(
    res_rownnz: &mut [usize],
    mat: &CsrStructure,
    mat_t: &CsrStructure,
    upper: bool,
) -> (Vec<usize>, usize) {
    let nc = mat.ncols;
    let mut pattern = Vec::with_capacity(nc);
    let mut merged = vec![0usize; nc];
    let rowsuper_t = mat_t.rowsuper.as_deref();

    let mut r = 0;
    while r < nc {
        let ns = rowsuper_t.map_or(1, |s| s[r] + 1);

        pattern.clear();
        for &k in mat_t.row(r) {
            let n = merge_sorted(&mut merged, &pattern, mat.row(k));
            pattern.clear();
            pattern.extend_from_slice(&merged[..n]);
        }

        for (row, count) in res_rownnz[r..r + ns].iter_mut().enumerate() {
            let row = r + row;
            *count = if upper {
                pattern.len() - pattern.partition_point(|&c| c < row)
            } else {
                pattern.len()
            };
        }
        r += ns;
    }

    let rowadr = prefix_sum(&res_rownnz[..nc]);
    let total = res_rownnz[..nc].iter().sum();
    (rowadr, total)
}

/// Row addresses of the worst-case uncompressed `nc x nc` layout.
pub fn sqr_mat_td_uncompressed_init(res_rowadr: &mut [usize], nc: usize) {
    for (r, adr) in res_rowadr[..nc].iter_mut().enumerate() {
        *adr = r * nc;
    }
}

/// Computes `res = mat'·diag·mat` (`diag = None` computes `mat'·mat`).
///
/// `res.structure.rowadr` must already be set, either from
/// [`sqr_mat_td_count`] or [`sqr_mat_td_uncompressed_init`], with matching
/// buffer sizes. Row counts, column indices and values are written here. A
/// row that does not fit its slot yields a capacity error.
pub fn sqr_mat_td(
    res: &mut CsrMatrix,
    mat: &CsrMatrix,
    mat_t: &CsrMatrix,
    diag: Option<&[f64]>,
    upper: bool,
) -> SimResult<usize> {
    let nc = mat.structure.ncols;
    if mat_t.structure.nrows != nc {
        return Err(SimError::DimensionMismatch {
            context: "sqr_mat_td transpose rows",
            expected: nc,
            actual: mat_t.structure.nrows,
        });
    }

    let mut accum = vec![0.0; nc];
    let mut pattern: Vec<usize> = Vec::with_capacity(nc);
    let mut merged = vec![0usize; nc];
    let rowsuper_t = mat_t.structure.rowsuper.as_deref();
    let mut total = 0;

    let mut r = 0;
    while r < nc {
        // rows of one supernode of mat_t share the union pattern
        let ns = rowsuper_t.map_or(1, |s| s[r] + 1);
        pattern.clear();
        for &k in mat_t.structure.row(r) {
            let n = merge_sorted(&mut merged, &pattern, mat.structure.row(k));
            pattern.clear();
            pattern.extend_from_slice(&merged[..n]);
        }

        for row in r..r + ns {
            let lo = if upper {
                pattern.partition_point(|&c| c < row)
            } else {
                0
            };
            let cols = &pattern[lo..];
            let available = res.structure.row_capacity(row);
            if cols.len() > available {
                return Err(SimError::Capacity {
                    required: cols.len(),
                    available,
                });
            }

            for adr_t in mat_t.structure.row_range(row) {
                let k = mat_t.structure.colind[adr_t];
                let scl = mat_t.values[adr_t] * diag.map_or(1.0, |d| d[k]);
                for adr in mat.structure.row_range(k) {
                    let c = mat.structure.colind[adr];
                    if c >= row || !upper {
                        accum[c] += scl * mat.values[adr];
                    }
                }
            }

            let start = res.structure.rowadr[row];
            for (offset, &c) in cols.iter().enumerate() {
                res.structure.colind[start + offset] = c;
                res.values[start + offset] = accum[c];
                accum[c] = 0.0;
            }
            res.structure.rownnz[row] = cols.len();
            total += cols.len();
        }
        r += ns;
    }
    res.structure.rowsuper = None;
    Ok(total)
}

/// Allocates and fills `mat'·diag·mat` in a compressed layout.
pub fn sqr_mat_td_alloc(
    mat: &CsrMatrix,
    mat_t: &CsrMatrix,
    diag: Option<&[f64]>,
    upper: bool,
) -> SimResult<CsrMatrix> {
    let nc = mat.structure.ncols;
    let mut rownnz = vec![0; nc];
    let (rowadr, total) = sqr_mat_td_count(&mut rownnz, &mat.structure, &mat_t.structure, upper);
    let mut res = CsrMatrix {
        structure: CsrStructure {
            nrows: nc,
            ncols: nc,
            rownnz,
            rowadr,
            colind: vec![0; total],
            rowsuper: None,
        },
        values: vec![0.0; total],
    };
    sqr_mat_td(&mut res, mat, mat_t, diag, upper)?;
    Ok(res)
}

/// Union of two ancestor chains (each sorted ascending).
///
/// `res` needs room for both chains. Returns the number of merged dofs.
pub fn add_chains(res: &mut [usize], chain1: &[usize], chain2: &[usize]) -> usize {
    merge_sorted(res, chain1, chain2)
}
