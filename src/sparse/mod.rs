//! Sparse linear algebra over compressed row storage.
//!
//! The layers build on each other: [`vector`] kernels, [`matrix`] storage and
//! products, [`structure`] pattern construction, and the [`cholesky`]
//! factorizations used for the mass matrix and constraint systems.

pub mod cholesky;
pub mod matrix;
pub mod structure;
pub mod vector;

pub use cholesky::{
    chol_factor_count, factor_is, mul_m2, solve_lds, solve_m2, FactorReport, SparseLdl,
};
pub use matrix::{
    add_to_sparse_mat, compress_sparse, dense_to_sparse, mul_mat_t_vec_sparse,
    mul_mat_vec_sparse, mul_sym_vec_sparse, sparse_to_dense, CsrMatrix, CsrStructure,
};
pub use structure::{
    add_chains, sqr_mat_td, sqr_mat_td_alloc, sqr_mat_td_count, sqr_mat_td_uncompressed_init,
    super_sparse, transpose_sparse,
};
pub use vector::{
    add_to_scl_sparse_inc, combine_sparse, combine_sparse_count, combine_sparse_inc, dot_sparse,
    dot_sparse2, merge_sorted,
};
