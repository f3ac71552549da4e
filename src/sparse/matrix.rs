//! Compressed sparse row storage and the matrix-level kernels built on it.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::sparse::structure::super_sparse;
use crate::sparse::vector::{combine_sparse, combine_sparse_count, dot, dot_sparse};

/// Sparsity pattern of a matrix in row format.
///
/// Requires:
/// * `rownnz` and `rowadr` have length `nrows`
/// * `rowadr[r] + rownnz[r] <= colind.len()`
/// * within each row, column indices are strictly increasing and `< ncols`
///
/// Rows may leave gaps between `rowadr[r] + rownnz[r]` and `rowadr[r + 1]`
/// (uncompressed layout); the gap is spare capacity for that row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrStructure {
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) rownnz: Vec<usize>,
    pub(crate) rowadr: Vec<usize>,
    pub(crate) colind: Vec<usize>,
    pub(crate) rowsuper: Option<Vec<usize>>,
}

impl CsrStructure {
    /// Creates a structure after asserting its invariants.
    ///
    /// # Panics
    ///
    /// See type level documentation.
    #[track_caller]
    pub fn new_checked(
        nrows: usize,
        ncols: usize,
        rownnz: Vec<usize>,
        rowadr: Vec<usize>,
        colind: Vec<usize>,
    ) -> Self {
        let structure = Self {
            nrows,
            ncols,
            rownnz,
            rowadr,
            colind,
            rowsuper: None,
        };
        if let Err(msg) = structure.validate() {
            panic!("invalid CSR structure: {msg}");
        }
        structure
    }

    /// Creates a compressed structure from per-row counts and packed column indices.
    #[track_caller]
    pub fn from_rownnz(nrows: usize, ncols: usize, rownnz: Vec<usize>, colind: Vec<usize>) -> Self {
        let rowadr = prefix_sum(&rownnz);
        Self::new_checked(nrows, ncols, rownnz, rowadr, colind)
    }

    /// Creates a compressed structure from one column list per row.
    #[track_caller]
    pub fn from_rows(ncols: usize, rows: &[Vec<usize>]) -> Self {
        let rownnz: Vec<usize> = rows.iter().map(Vec::len).collect();
        let colind: Vec<usize> = rows.iter().flatten().copied().collect();
        Self::from_rownnz(rows.len(), ncols, rownnz, colind)
    }

    /// Empty `nrows x ncols` structure with no stored entries.
    pub fn empty(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            rownnz: vec![0; nrows],
            rowadr: vec![0; nrows],
            colind: Vec::new(),
            rowsuper: None,
        }
    }

    /// Checks the structural invariants, returning a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.rownnz.len() != self.nrows || self.rowadr.len() != self.nrows {
            return Err(format!(
                "expected {} rows, rownnz has {} and rowadr has {}",
                self.nrows,
                self.rownnz.len(),
                self.rowadr.len()
            ));
        }
        for r in 0..self.nrows {
            let end = self.rowadr[r] + self.rownnz[r];
            if end > self.colind.len() {
                return Err(format!("row {r} ends at {end} past colind length {}", self.colind.len()));
            }
            let cols = &self.colind[self.rowadr[r]..end];
            if let Some(&last) = cols.last() {
                if last >= self.ncols {
                    return Err(format!("row {r} has column {last} >= {}", self.ncols));
                }
            }
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("row {r} columns are not strictly increasing"));
            }
        }
        if let Some(rowsuper) = &self.rowsuper {
            if rowsuper.len() != self.nrows {
                return Err(format!("rowsuper has {} entries", rowsuper.len()));
            }
        }
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn rownnz(&self) -> &[usize] {
        &self.rownnz
    }

    pub fn rowadr(&self) -> &[usize] {
        &self.rowadr
    }

    pub fn colind(&self) -> &[usize] {
        &self.colind
    }

    pub fn rowsuper(&self) -> Option<&[usize]> {
        self.rowsuper.as_deref()
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.rownnz.iter().sum()
    }

    /// Length of the shared column/value buffer.
    pub fn capacity(&self) -> usize {
        self.colind.len()
    }

    /// Range of row `r` inside the column/value buffer.
    #[inline]
    pub fn row_range(&self, r: usize) -> Range<usize> {
        let start = self.rowadr[r];
        start..start + self.rownnz[r]
    }

    /// Column indices of row `r`.
    #[inline]
    pub fn row(&self, r: usize) -> &[usize] {
        &self.colind[self.row_range(r)]
    }

    /// Space reserved for row `r`, including any uncompressed gap.
    pub fn row_capacity(&self, r: usize) -> usize {
        let next = if r + 1 < self.nrows {
            self.rowadr[r + 1]
        } else {
            self.colind.len()
        };
        next.saturating_sub(self.rowadr[r])
    }

    /// Position of column `c` inside the buffer, if row `r` stores it.
    pub fn find(&self, r: usize, c: usize) -> Option<usize> {
        let range = self.row_range(r);
        self.colind[range.clone()]
            .binary_search(&c)
            .ok()
            .map(|k| range.start + k)
    }

    /// True when rows are packed back to back with no gaps.
    pub fn is_compressed(&self) -> bool {
        (0..self.nrows).all(|r| self.rowadr[r] == if r == 0 { 0 } else { self.rowadr[r - 1] + self.rownnz[r - 1] })
    }

    /// Computes and stores the supernode run lengths.
    pub fn compute_supernodes(&mut self) {
        let mut rowsuper = vec![0; self.nrows];
        super_sparse(self, &mut rowsuper);
        self.rowsuper = Some(rowsuper);
    }

    pub fn with_supernodes(mut self) -> Self {
        self.compute_supernodes();
        self
    }

    pub fn clear_supernodes(&mut self) {
        self.rowsuper = None;
    }
}

/// Exclusive prefix sum used to turn row counts into row addresses.
pub fn prefix_sum(counts: &[usize]) -> Vec<usize> {
    let mut adr = Vec::with_capacity(counts.len());
    let mut offset = 0;
    for &count in counts {
        adr.push(offset);
        offset += count;
    }
    adr
}

/// A sparse matrix: structure plus values aligned with `colind`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    pub structure: CsrStructure,
    pub values: Vec<f64>,
}

impl CsrMatrix {
    #[track_caller]
    pub fn new(structure: CsrStructure, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            structure.capacity(),
            "value buffer must match the column buffer"
        );
        Self { structure, values }
    }

    /// Zero-valued matrix over the given structure.
    pub fn zeros(structure: CsrStructure) -> Self {
        let values = vec![0.0; structure.capacity()];
        Self { structure, values }
    }

    /// Encodes a row-major dense matrix, keeping exact nonzeros only.
    pub fn from_dense(mat: &[f64], nrows: usize, ncols: usize) -> Self {
        let nnz = mat.iter().filter(|v| **v != 0.0).count();
        let mut values = vec![0.0; nnz];
        let mut colind = vec![0; nnz];
        let mut rownnz = vec![0; nrows];
        let mut rowadr = vec![0; nrows];
        // The buffers are sized from the exact nonzero count.
        if let Err(err) = dense_to_sparse(
            &mut values,
            mat,
            nrows,
            ncols,
            &mut rownnz,
            &mut rowadr,
            &mut colind,
        ) {
            unreachable!("exact sizing cannot overflow: {err}");
        }
        Self {
            structure: CsrStructure::new_checked(nrows, ncols, rownnz, rowadr, colind),
            values,
        }
    }

    pub fn nrows(&self) -> usize {
        self.structure.nrows
    }

    pub fn ncols(&self) -> usize {
        self.structure.ncols
    }

    /// Values of row `r`.
    #[inline]
    pub fn row_values(&self, r: usize) -> &[f64] {
        &self.values[self.structure.row_range(r)]
    }

    /// Entry `(r, c)`, zero when not stored.
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.structure
            .find(r, c)
            .map_or(0.0, |adr| self.values[adr])
    }

    /// Row-major dense copy.
    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.nrows() * self.ncols()];
        sparse_to_dense(&mut dense, &self.values, &self.structure);
        dense
    }

    pub fn mul_vec(&self, vec: &[f64]) -> Vec<f64> {
        let mut res = vec![0.0; self.nrows()];
        mul_mat_vec_sparse(&mut res, &self.values, vec, &self.structure);
        res
    }

    pub fn mul_t_vec(&self, vec: &[f64]) -> Vec<f64> {
        let mut res = vec![0.0; self.ncols()];
        mul_mat_t_vec_sparse(&mut res, &self.values, vec, &self.structure);
        res
    }
}

/// Encodes a row-major dense `nr x nc` matrix into CSR.
///
/// `res` and `colind` hold the output entries. When they are too small the
/// function stops before writing past them and reports the exact number of
/// entries required; the contents of the output buffers are then unspecified
/// but in bounds.
pub fn dense_to_sparse(
    res: &mut [f64],
    mat: &[f64],
    nr: usize,
    nc: usize,
    rownnz: &mut [usize],
    rowadr: &mut [usize],
    colind: &mut [usize],
) -> SimResult<()> {
    let available = res.len().min(colind.len());
    let mut adr = 0;
    for r in 0..nr {
        rowadr[r] = adr;
        rownnz[r] = 0;
        for (c, &value) in mat[r * nc..(r + 1) * nc].iter().enumerate() {
            if value == 0.0 {
                continue;
            }
            if adr >= available {
                let required = mat.iter().filter(|v| **v != 0.0).count();
                return Err(SimError::Capacity {
                    required,
                    available,
                });
            }
            res[adr] = value;
            colind[adr] = c;
            rownnz[r] += 1;
            adr += 1;
        }
    }
    Ok(())
}

/// Decodes a CSR matrix into a row-major dense buffer, zero-filling the rest.
pub fn sparse_to_dense(res: &mut [f64], mat: &[f64], structure: &CsrStructure) {
    let nc = structure.ncols;
    res[..structure.nrows * nc].fill(0.0);
    for r in 0..structure.nrows {
        let range = structure.row_range(r);
        for adr in range {
            res[r * nc + structure.colind[adr]] = mat[adr];
        }
    }
}

/// `res = mat * vec`, reusing one gathered copy of `vec` per supernode.
pub fn mul_mat_vec_sparse(res: &mut [f64], mat: &[f64], vec: &[f64], structure: &CsrStructure) {
    let nr = structure.nrows;
    let Some(rowsuper) = structure.rowsuper.as_deref() else {
        for (r, out) in res[..nr].iter_mut().enumerate() {
            let range = structure.row_range(r);
            *out = dot_sparse(&mat[range.clone()], &structure.colind[range], vec, false);
        }
        return;
    };

    let mut gathered: Vec<f64> = Vec::new();
    let mut r = 0;
    while r < nr {
        let ns = rowsuper[r] + 1;
        if ns == 1 {
            let range = structure.row_range(r);
            res[r] = dot_sparse(&mat[range.clone()], &structure.colind[range], vec, false);
        } else {
            gathered.clear();
            gathered.extend(structure.row(r).iter().map(|&c| vec[c]));
            for row in r..r + ns {
                let values = &mat[structure.row_range(row)];
                res[row] = dot(values, &gathered);
            }
        }
        r += ns;
    }
}

/// `res = mat' * vec`.
pub fn mul_mat_t_vec_sparse(res: &mut [f64], mat: &[f64], vec: &[f64], structure: &CsrStructure) {
    res[..structure.ncols].fill(0.0);
    for r in 0..structure.nrows {
        let scl = vec[r];
        if scl == 0.0 {
            continue;
        }
        let range = structure.row_range(r);
        for adr in range {
            res[structure.colind[adr]] += mat[adr] * scl;
        }
    }
}

/// `res = mat * vec` for a symmetric matrix stored as its lower triangle.
pub fn mul_sym_vec_sparse(res: &mut [f64], mat: &[f64], vec: &[f64], structure: &CsrStructure) {
    let n = structure.nrows;
    res[..n].fill(0.0);
    for r in 0..n {
        let range = structure.row_range(r);
        let mut acc = 0.0;
        for adr in range {
            let c = structure.colind[adr];
            acc += mat[adr] * vec[c];
            if c != r {
                res[c] += mat[adr] * vec[r];
            }
        }
        res[r] += acc;
    }
}

/// Row-wise `dst = dst + scl*src`.
///
/// `dst` must be uncompressed with enough spare room per row for the union
/// pattern; rows that would not fit are reported before anything is modified.
/// Returns the total nonzero count of `dst`.
pub fn add_to_sparse_mat(dst: &mut CsrMatrix, src: &CsrMatrix, scl: f64) -> SimResult<usize> {
    let nrows = dst.structure.nrows;
    if src.structure.nrows != nrows {
        return Err(SimError::DimensionMismatch {
            context: "add_to_sparse_mat rows",
            expected: nrows,
            actual: src.structure.nrows,
        });
    }

    for r in 0..nrows {
        let required = combine_sparse_count(dst.structure.row(r), src.structure.row(r));
        let available = dst.structure.row_capacity(r);
        if required > available {
            return Err(SimError::Capacity {
                required,
                available,
            });
        }
    }

    let max_row = dst.structure.rownnz.iter().copied().max().unwrap_or(0);
    let mut buf = vec![0.0; max_row];
    let mut buf_ind = vec![0; max_row];
    let mut total = 0;
    for r in 0..nrows {
        let start = dst.structure.rowadr[r];
        let cap = dst.structure.row_capacity(r);
        let src_range = src.structure.row_range(r);
        let nnz = combine_sparse(
            &mut dst.values[start..start + cap],
            &mut dst.structure.colind[start..start + cap],
            dst.structure.rownnz[r],
            &src.values[src_range.clone()],
            &src.structure.colind[src_range],
            1.0,
            scl,
            &mut buf,
            &mut buf_ind,
        );
        dst.structure.rownnz[r] = nnz;
        total += nnz;
    }
    dst.structure.rowsuper = None;
    Ok(total)
}

/// Packs an uncompressed matrix so rows are stored back to back.
pub fn compress_sparse(mat: &mut CsrMatrix) {
    let s = &mut mat.structure;
    let mut adr = 0;
    for r in 0..s.nrows {
        let start = s.rowadr[r];
        let nnz = s.rownnz[r];
        if start != adr {
            s.colind.copy_within(start..start + nnz, adr);
            mat.values.copy_within(start..start + nnz, adr);
            s.rowadr[r] = adr;
        }
        adr += nnz;
    }
    s.colind.truncate(adr);
    mat.values.truncate(adr);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dense() -> Vec<f64> {
        vec![
            1.0, 0.0, 2.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 3.0, 0.0, 4.0, //
        ]
    }

    #[test]
    fn dense_round_trip_is_exact() {
        let dense = sample_dense();
        let csr = CsrMatrix::from_dense(&dense, 3, 4);
        assert_eq!(csr.structure.rownnz(), &[2, 0, 2]);
        assert_eq!(csr.structure.colind(), &[0, 2, 1, 3]);
        assert_eq!(csr.to_dense(), dense);
    }

    #[test]
    fn dense_to_sparse_reports_capacity() {
        let dense = sample_dense();
        let mut res = [0.0; 3];
        let mut colind = [0usize; 3];
        let mut rownnz = [0usize; 3];
        let mut rowadr = [0usize; 3];
        let err = dense_to_sparse(&mut res, &dense, 3, 4, &mut rownnz, &mut rowadr, &mut colind)
            .unwrap_err();
        assert_eq!(
            err,
            SimError::Capacity {
                required: 4,
                available: 3
            }
        );
        assert_eq!(res, [1.0, 2.0, 3.0]);
    }

    #[test]
    #[should_panic(expected = "invalid CSR structure")]
    fn unsorted_rows_are_rejected() {
        CsrStructure::from_rownnz(1, 4, vec![2], vec![3, 1]);
    }

    #[test]
    fn mat_vec_with_and_without_supernodes_agree() {
        let rows = vec![vec![0, 2], vec![0, 2], vec![0, 2], vec![1], vec![1, 3]];
        let structure = CsrStructure::from_rows(4, &rows);
        let values: Vec<f64> = (0..structure.capacity()).map(|i| 1.0 + i as f64).collect();
        let vec = [0.5, -1.0, 2.0, 3.0];

        let mut plain = vec![0.0; 5];
        mul_mat_vec_sparse(&mut plain, &values, &vec, &structure);

        let with_super = structure.clone().with_supernodes();
        assert_eq!(with_super.rowsuper().unwrap(), &[2, 1, 0, 0, 0]);
        let mut batched = vec![0.0; 5];
        mul_mat_vec_sparse(&mut batched, &values, &vec, &with_super);

        assert_eq!(plain, batched);
        assert_eq!(plain[0], 1.0 * 0.5 + 2.0 * 2.0);
        assert_eq!(plain[4], 8.0 * -1.0 + 9.0 * 3.0);
    }

    #[test]
    fn mat_t_vec_matches_dense() {
        let dense = sample_dense();
        let csr = CsrMatrix::from_dense(&dense, 3, 4);
        let res = csr.mul_t_vec(&[1.0, 5.0, -1.0]);
        assert_eq!(res, vec![1.0, -3.0, 2.0, -4.0]);
    }

    #[test]
    fn symmetric_product_uses_both_triangles() {
        // [[4, 1, 0], [1, 3, 2], [0, 2, 5]] stored as lower triangle
        let structure = CsrStructure::from_rows(3, &[vec![0], vec![0, 1], vec![1, 2]]);
        let values = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        let mut res = vec![0.0; 3];
        mul_sym_vec_sparse(&mut res, &values, &[1.0, 2.0, 3.0], &structure);
        assert_eq!(res, vec![6.0, 13.0, 19.0]);
    }

    #[test]
    fn add_to_sparse_mat_grows_rows_in_place() {
        // uncompressed: each row has room for three entries
        let structure = CsrStructure::new_checked(2, 3, vec![1, 1], vec![0, 3], vec![0, 0, 0, 2, 0, 0]);
        let mut dst = CsrMatrix::new(structure, vec![1.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let src = CsrMatrix::from_dense(&[0.0, 1.0, 1.0, 0.0, 0.0, 1.0], 2, 3);

        let nnz = add_to_sparse_mat(&mut dst, &src, 3.0).unwrap();
        assert_eq!(nnz, 4);
        assert_eq!(dst.to_dense(), vec![1.0, 3.0, 3.0, 0.0, 0.0, 5.0]);

        compress_sparse(&mut dst);
        assert!(dst.structure.is_compressed());
        assert_eq!(dst.structure.colind(), &[0, 1, 2, 2]);
        assert_eq!(dst.values, vec![1.0, 3.0, 3.0, 5.0]);
    }

    #[test]
    fn add_to_sparse_mat_rejects_overflowing_rows() {
        let structure = CsrStructure::from_rownnz(1, 3, vec![1], vec![0]);
        let mut dst = CsrMatrix::new(structure, vec![1.0]);
        let src = CsrMatrix::from_dense(&[0.0, 1.0, 0.0], 1, 3);
        let err = add_to_sparse_mat(&mut dst, &src, 1.0).unwrap_err();
        assert_eq!(
            err,
            SimError::Capacity {
                required: 2,
                available: 1
            }
        );
        assert_eq!(dst.values, vec![1.0]);
    }
}
