use approx::assert_relative_eq;
use kinetree::sparse::{
    add_to_sparse_mat, compress_sparse, dense_to_sparse, sqr_mat_td, sqr_mat_td_alloc,
    sqr_mat_td_uncompressed_init, transpose_sparse, CsrMatrix, CsrStructure,
};
use kinetree::SimError;
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_dense(rng: &mut ChaCha8Rng, nr: usize, nc: usize, density: f64) -> Vec<f64> {
    (0..nr * nc)
        .map(|_| {
            if rng.gen_bool(density) {
                rng.gen_range(-2.0..2.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Dense matrix whose rows come in blocks sharing one column pattern.
fn blocked_dense(rng: &mut ChaCha8Rng, blocks: &[usize], nc: usize) -> Vec<f64> {
    let mut dense = Vec::new();
    for &rows in blocks {
        let pattern: Vec<bool> = (0..nc).map(|_| rng.gen_bool(0.4)).collect();
        for _ in 0..rows {
            dense.extend(
                pattern
                    .iter()
                    .map(|&on| if on { rng.gen_range(0.5..1.5) } else { 0.0 }),
            );
        }
    }
    dense
}

#[test]
fn test_dense_round_trip_and_products() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let (nr, nc) = (9, 13);
    let dense = random_dense(&mut rng, nr, nc, 0.3);
    let csr = CsrMatrix::from_dense(&dense, nr, nc);

    assert_eq!(csr.to_dense(), dense);
    assert_eq!(
        csr.structure.nnz(),
        dense.iter().filter(|v| **v != 0.0).count()
    );

    let x: Vec<f64> = (0..nc).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let y: Vec<f64> = (0..nr).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let a = DMatrix::from_row_slice(nr, nc, &dense);

    let ax = csr.mul_vec(&x);
    let expected = &a * nalgebra::DVector::from_column_slice(&x);
    for (got, want) in ax.iter().zip(expected.iter()) {
        assert_relative_eq!(got, want, epsilon = 1e-12);
    }

    let aty = csr.mul_t_vec(&y);
    let expected = a.transpose() * nalgebra::DVector::from_column_slice(&y);
    for (got, want) in aty.iter().zip(expected.iter()) {
        assert_relative_eq!(got, want, epsilon = 1e-12);
    }
}

#[test]
fn test_supernodes_do_not_change_products() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let nc = 17;
    let dense = blocked_dense(&mut rng, &[3, 1, 4, 2, 1], nc);
    let plain = CsrMatrix::from_dense(&dense, 11, nc);
    let mut grouped = plain.clone();
    grouped.structure.compute_supernodes();

    let rowsuper = grouped.structure.rowsuper().unwrap();
    assert!(rowsuper.iter().any(|&s| s > 0));

    let x: Vec<f64> = (0..nc).map(|_| rng.gen_range(-1.0..1.0)).collect();
    assert_eq!(plain.mul_vec(&x), grouped.mul_vec(&x));
}

#[test]
fn test_add_into_uncompressed_then_compress() {
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let (nr, nc) = (6, 8);
    let a = random_dense(&mut rng, nr, nc, 0.3);
    let b = random_dense(&mut rng, nr, nc, 0.3);

    // rows of `a` spread over an nc-wide slot each
    let packed = CsrMatrix::from_dense(&a, nr, nc);
    let mut colind = vec![0; nr * nc];
    let mut values = vec![0.0; nr * nc];
    for r in 0..nr {
        let cols = packed.structure.row(r);
        colind[r * nc..r * nc + cols.len()].copy_from_slice(cols);
        values[r * nc..r * nc + cols.len()].copy_from_slice(packed.row_values(r));
    }
    let rowadr: Vec<usize> = (0..nr).map(|r| r * nc).collect();
    let structure = CsrStructure::new_checked(
        nr,
        nc,
        packed.structure.rownnz().to_vec(),
        rowadr,
        colind,
    );
    let mut dst = CsrMatrix::new(structure, values);
    assert!(!dst.structure.is_compressed());

    let src = CsrMatrix::from_dense(&b, nr, nc);
    let total = add_to_sparse_mat(&mut dst, &src, -0.5).unwrap();
    compress_sparse(&mut dst);

    assert!(dst.structure.is_compressed());
    assert_eq!(dst.structure.capacity(), total);
    let sum = dst.to_dense();
    for i in 0..nr * nc {
        assert_relative_eq!(sum[i], a[i] - 0.5 * b[i], epsilon = 1e-15);
    }
}

#[test]
fn test_short_buffers_report_capacity() {
    let dense = vec![1.0, 0.0, 2.0, 0.0, 3.0, 4.0];
    let mut res = vec![0.0; 2];
    let mut colind = vec![0; 2];
    let mut rownnz = vec![0; 2];
    let mut rowadr = vec![0; 2];
    let err = dense_to_sparse(&mut res, &dense, 2, 3, &mut rownnz, &mut rowadr, &mut colind)
        .unwrap_err();
    assert_eq!(
        err,
        SimError::Capacity {
            required: 4,
            available: 2
        }
    );

    // a compressed destination has no room for new columns
    let mut dst = CsrMatrix::from_dense(&[1.0, 0.0, 0.0, 1.0], 2, 2);
    let src = CsrMatrix::from_dense(&[0.0, 1.0, 0.0, 0.0], 2, 2);
    assert!(matches!(
        add_to_sparse_mat(&mut dst, &src, 1.0),
        Err(SimError::Capacity { required: 2, available: 1 })
    ));
    assert_eq!(dst.to_dense(), vec![1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_weighted_gram_matches_dense() {
    let mut rng = ChaCha8Rng::seed_from_u64(77);
    let (nr, nc) = (7, 10);
    let dense = random_dense(&mut rng, nr, nc, 0.35);
    let diag: Vec<f64> = (0..nr).map(|_| rng.gen_range(0.1..3.0)).collect();

    let mat = CsrMatrix::from_dense(&dense, nr, nc);
    let mut mat_t = transpose_sparse(&mat.values, &mat.structure);
    mat_t.structure.compute_supernodes();

    let a = DMatrix::from_row_slice(nr, nc, &dense);
    let d = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(diag.clone()));
    let expected = a.transpose() * d * &a;

    let full = sqr_mat_td_alloc(&mat, &mat_t, Some(&diag), false).unwrap();
    let upper = sqr_mat_td_alloc(&mat, &mat_t, Some(&diag), true).unwrap();
    for r in 0..nc {
        for c in 0..nc {
            assert_relative_eq!(full.get(r, c), expected[(r, c)], epsilon = 1e-12);
            let want = if c >= r { expected[(r, c)] } else { 0.0 };
            assert_relative_eq!(upper.get(r, c), want, epsilon = 1e-12);
        }
        assert!(upper.structure.row(r).iter().all(|&c| c >= r));
    }

    // same values written into the worst-case layout
    let mut rowadr = vec![0; nc];
    sqr_mat_td_uncompressed_init(&mut rowadr, nc);
    let mut wide = CsrMatrix::zeros(CsrStructure::new_checked(
        nc,
        nc,
        vec![0; nc],
        rowadr,
        vec![0; nc * nc],
    ));
    let total = sqr_mat_td(&mut wide, &mat, &mat_t, Some(&diag), false).unwrap();
    assert_eq!(total, full.structure.nnz());
    compress_sparse(&mut wide);
    assert_eq!(wide.structure.colind(), full.structure.colind());
    assert_eq!(wide.values, full.values);
}
