//! The dof tree and the sparsity pattern it induces on the mass matrix.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::sparse::matrix::{prefix_sum, CsrStructure};

/// Parent links between degrees of freedom plus the shared `M`/`L` pattern.
///
/// Row `i` of [`DofTree::structure`] lists the ancestors of `i` in ascending
/// order followed by `i` itself, so the diagonal is always the last entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofTree {
    parent: Vec<Option<usize>>,
    simplenum: Vec<usize>,
    structure: CsrStructure,
}

impl DofTree {
    /// Builds the tree from parent links (`parent[i] < i`) and per-dof
    /// simplicity flags.
    pub fn new(parent: Vec<Option<usize>>, simple: &[bool]) -> SimResult<Self> {
        let nv = parent.len();
        if simple.len() != nv {
            return Err(SimError::DimensionMismatch {
                context: "DofTree simple flags",
                expected: nv,
                actual: simple.len(),
            });
        }
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = *p {
                if p >= i {
                    return Err(SimError::InvalidModel(format!(
                        "dof {i} has parent {p}; parents must precede children"
                    )));
                }
                if simple[i] && !simple[p] {
                    return Err(SimError::InvalidModel(format!(
                        "dof {i} is simple but its parent {p} is not"
                    )));
                }
            }
        }

        let mut rownnz = vec![0; nv];
        for i in 0..nv {
            let count = 1 + parent[i].map_or(0, |p| rownnz[p]);
            rownnz[i] = count;
        }
        let rowadr = prefix_sum(&rownnz);

        // a child's row is its parent's row plus itself
        let mut colind = vec![0; rownnz.iter().sum::<usize>()];
        for i in 0..nv {
            let start = rowadr[i];
            if let Some(p) = parent[i] {
                colind.copy_within(rowadr[p]..rowadr[p] + rownnz[p], start);
            }
            colind[start + rownnz[i] - 1] = i;
        }

        let mut simplenum = vec![0; nv];
        for i in (0..nv).rev() {
            if simple[i] {
                simplenum[i] = 1 + if i + 1 < nv { simplenum[i + 1] } else { 0 };
            }
        }

        Ok(Self {
            parent,
            simplenum,
            structure: CsrStructure {
                nrows: nv,
                ncols: nv,
                rownnz,
                rowadr,
                colind,
                rowsuper: None,
            },
        })
    }

    pub fn nv(&self) -> usize {
        self.parent.len()
    }

    /// Number of stored entries of `M` (and of its factor).
    pub fn nnz(&self) -> usize {
        self.structure.capacity()
    }

    pub fn parent(&self, i: usize) -> Option<usize> {
        self.parent[i]
    }

    pub fn parents(&self) -> &[Option<usize>] {
        &self.parent
    }

    /// Run lengths of consecutive simple dofs; zero for dofs that are not simple.
    pub fn simplenum(&self) -> &[usize] {
        &self.simplenum
    }

    pub fn is_simple(&self, i: usize) -> bool {
        self.simplenum[i] > 0
    }

    pub fn structure(&self) -> &CsrStructure {
        &self.structure
    }

    /// Ancestors of `i` followed by `i`.
    #[inline]
    pub fn chain(&self, i: usize) -> &[usize] {
        self.structure.row(i)
    }

    /// Position of the diagonal of row `i` in the value buffer.
    #[inline]
    pub fn diag_adr(&self, i: usize) -> usize {
        self.structure.rowadr[i] + self.structure.rownnz[i] - 1
    }

    /// Pattern of the sub-tree made of `dofind` (increasing, ancestor-closed),
    /// with columns renumbered through `map`.
    pub fn sub_structure(&self, dofind: &[usize], map: &[Option<usize>]) -> SimResult<CsrStructure> {
        let n = dofind.len();
        let rownnz: Vec<usize> = dofind.iter().map(|&g| self.structure.rownnz[g]).collect();
        let rowadr = prefix_sum(&rownnz);
        let mut colind = Vec::with_capacity(rownnz.iter().sum::<usize>());
        for &g in dofind {
            for &c in self.chain(g) {
                let local = map[c].ok_or_else(|| {
                    SimError::InvalidModel(format!("dof {c} is missing from the sub-tree of dof {g}"))
                })?;
                colind.push(local);
            }
        }
        Ok(CsrStructure {
            nrows: n,
            ncols: n,
            rownnz,
            rowadr,
            colind,
            rowsuper: None,
        })
    }

    /// Run lengths of simple dofs restricted to `dofind`.
    pub fn sub_simplenum(&self, dofind: &[usize]) -> Vec<usize> {
        let mut simplenum = vec![0; dofind.len()];
        for l in (0..dofind.len()).rev() {
            if self.is_simple(dofind[l]) {
                simplenum[l] = 1 + simplenum.get(l + 1).copied().unwrap_or(0);
            }
        }
        simplenum
    }
}
