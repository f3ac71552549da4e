use approx::assert_relative_eq;
use kinetree::sparse::{
    chol_factor_count, factor_is, mul_m2, mul_sym_vec_sparse, solve_lds, solve_m2,
    transpose_sparse, CsrStructure, SparseLdl,
};
use kinetree::DofTree;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_tree(rng: &mut ChaCha8Rng, nv: usize) -> DofTree {
    let parent = (0..nv)
        .map(|i| {
            if i == 0 || rng.gen_bool(0.2) {
                None
            } else {
                Some(rng.gen_range(0..i))
            }
        })
        .collect();
    DofTree::new(parent, &vec![false; nv]).unwrap()
}

/// Random SPD matrix `L'·D·L` with `L` over the tree pattern, returned as
/// lower-triangle values over that pattern plus the dense matrix.
fn random_tree_matrix(rng: &mut ChaCha8Rng, tree: &DofTree) -> (Vec<f64>, DMatrix<f64>) {
    let nv = tree.nv();
    let structure = tree.structure();
    let mut l = DMatrix::<f64>::identity(nv, nv);
    for i in 0..nv {
        let row = structure.row(i);
        for &j in &row[..row.len() - 1] {
            l[(i, j)] = rng.gen_range(-1.0..1.0);
        }
    }
    let d = DMatrix::from_diagonal(&DVector::from_fn(nv, |_, _| rng.gen_range(0.5..2.0)));
    let dense = l.transpose() * d * &l;

    let mut values = Vec::with_capacity(tree.nnz());
    for i in 0..nv {
        for &j in structure.row(i) {
            values.push(dense[(i, j)]);
        }
    }
    (values, dense)
}

fn factored(tree: &DofTree, values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut qld = values.to_vec();
    let mut diag_inv = vec![0.0; tree.nv()];
    let report = factor_is(&mut qld, &mut diag_inv, tree.structure(), None, None);
    assert!(report.is_positive_definite());
    (qld, diag_inv)
}

#[test]
fn test_tree_factor_solves_like_dense_cholesky() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..5 {
        let tree = random_tree(&mut rng, 14);
        let (values, dense) = random_tree_matrix(&mut rng, &tree);
        let (qld, diag_inv) = factored(&tree, &values);

        let b: Vec<f64> = (0..tree.nv()).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut x = b.clone();
        solve_lds(&mut x, 1, tree.structure(), &qld, &diag_inv, None);

        let expected = dense
            .clone()
            .cholesky()
            .unwrap()
            .solve(&DVector::from_vec(b));
        for (got, want) in x.iter().zip(expected.iter()) {
            assert_relative_eq!(got, want, epsilon = 1e-9, max_relative = 1e-9);
        }
    }
}

#[test]
fn test_batch_solve_matches_individual_solves() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let tree = random_tree(&mut rng, 10);
    let nv = tree.nv();
    let (values, _) = random_tree_matrix(&mut rng, &tree);
    let (qld, diag_inv) = factored(&tree, &values);

    let batch: Vec<f64> = (0..3 * nv).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let mut solved = batch.clone();
    solve_lds(&mut solved, 3, tree.structure(), &qld, &diag_inv, None);

    for v in 0..3 {
        let mut single = batch[v * nv..(v + 1) * nv].to_vec();
        solve_lds(&mut single, 1, tree.structure(), &qld, &diag_inv, None);
        assert_eq!(&solved[v * nv..(v + 1) * nv], single.as_slice());
    }
}

#[test]
fn test_symmetric_product_matches_dense() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let tree = random_tree(&mut rng, 12);
    let (values, dense) = random_tree_matrix(&mut rng, &tree);
    let x: Vec<f64> = (0..tree.nv()).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut y = vec![0.0; tree.nv()];
    mul_sym_vec_sparse(&mut y, &values, &x, tree.structure());
    let expected = &dense * DVector::from_vec(x);
    for (got, want) in y.iter().zip(expected.iter()) {
        assert_relative_eq!(got, want, epsilon = 1e-12);
    }
}

#[test]
fn test_half_solve_and_half_product_identities() {
    let mut rng = ChaCha8Rng::seed_from_u64(19);
    let tree = random_tree(&mut rng, 16);
    let nv = tree.nv();
    let (values, _) = random_tree_matrix(&mut rng, &tree);
    let (qld, diag_inv) = factored(&tree, &values);
    let diag_sqrt_inv: Vec<f64> = diag_inv.iter().map(|d| d.sqrt()).collect();

    let y: Vec<f64> = (0..nv).map(|_| rng.gen_range(-1.0..1.0)).collect();

    // dot(y, M^-1 y) == |sqrt(D^-1) L^-T y|^2
    let mut minv_y = y.clone();
    solve_lds(&mut minv_y, 1, tree.structure(), &qld, &diag_inv, None);
    let quad: f64 = y.iter().zip(&minv_y).map(|(a, b)| a * b).sum();
    let mut half = vec![0.0; nv];
    solve_m2(&mut half, &y, 1, tree.structure(), &qld, &diag_sqrt_inv, None);
    let half_sq: f64 = half.iter().map(|v| v * v).sum();
    assert_relative_eq!(quad, half_sq, max_relative = 1e-10);

    // x' M x == |sqrt(D) L x|^2
    let mut mx = vec![0.0; nv];
    mul_sym_vec_sparse(&mut mx, &values, &y, tree.structure());
    let quad: f64 = y.iter().zip(&mx).map(|(a, b)| a * b).sum();
    let mut prod = vec![0.0; nv];
    mul_m2(&mut prod, &y, tree.structure(), &qld, &diag_sqrt_inv);
    let prod_sq: f64 = prod.iter().map(|v| v * v).sum();
    assert_relative_eq!(quad, prod_sq, max_relative = 1e-10);
}

#[test]
fn test_general_ldl_agrees_with_tree_factor() {
    let mut rng = ChaCha8Rng::seed_from_u64(23);
    let tree = random_tree(&mut rng, 15);
    let (values, _) = random_tree_matrix(&mut rng, &tree);
    let (qld, diag_inv) = factored(&tree, &values);

    let mut ldl = SparseLdl::analyze(tree.structure()).unwrap();
    // tree patterns produce no fill
    assert_eq!(ldl.structure().colind(), tree.structure().colind());
    let report = ldl.factorize(tree.structure(), &values, None).unwrap();
    assert!(report.is_positive_definite());

    for (got, want) in ldl.values().iter().zip(&qld) {
        assert_relative_eq!(got, want, epsilon = 1e-12, max_relative = 1e-12);
    }
    for (got, want) in ldl.diag_inv().iter().zip(&diag_inv) {
        assert_relative_eq!(got, want, max_relative = 1e-12);
    }
}

#[test]
fn test_factor_count_matches_symbolic_analysis() {
    let mut rng = ChaCha8Rng::seed_from_u64(31);
    for _ in 0..4 {
        let n = 20;
        let rows: Vec<Vec<usize>> = (0..n)
            .map(|i| {
                let mut row: Vec<usize> = (0..i).filter(|_| rng.gen_bool(0.15)).collect();
                row.push(i);
                row
            })
            .collect();
        let lower = CsrStructure::from_rows(n, &rows);
        let ones = vec![1.0; lower.nnz()];
        let upper = transpose_sparse(&ones, &lower);

        let mut counts = vec![0; n];
        let total = chol_factor_count(&mut counts, &upper.structure);
        let ldl = SparseLdl::analyze(&lower).unwrap();
        assert_eq!(counts.as_slice(), ldl.structure().rownnz());
        assert_eq!(total, ldl.structure().nnz());
    }
}

#[test]
fn test_general_ldl_solves_with_fill() {
    // arrow matrix pointing at the last row fills the whole lower triangle
    let n = 5;
    let mut dense = DMatrix::<f64>::identity(n, n) * 4.0;
    for i in 0..n - 1 {
        dense[(n - 1, i)] = 1.0;
        dense[(i, n - 1)] = 1.0;
    }
    let rows: Vec<Vec<usize>> = (0..n)
        .map(|i| if i == n - 1 { (0..n).collect() } else { vec![i] })
        .collect();
    let lower = CsrStructure::from_rows(n, &rows);
    let mut values = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        values.extend(row.iter().map(|&j| dense[(i, j)]));
    }

    let mut ldl = SparseLdl::analyze(&lower).unwrap();
    assert_eq!(ldl.structure().nnz(), n * (n + 1) / 2);
    ldl.factorize(&lower, &values, None).unwrap();

    let b = vec![1.0, -1.0, 2.0, 0.5, 3.0];
    let mut x = b.clone();
    ldl.solve(&mut x, 1);
    let expected = dense.cholesky().unwrap().solve(&DVector::from_vec(b));
    for (got, want) in x.iter().zip(expected.iter()) {
        assert_relative_eq!(got, want, epsilon = 1e-12);
    }
}

#[test]
fn test_general_ldl_reconstructs_dominant_matrix() {
    let mut rng = ChaCha8Rng::seed_from_u64(101);
    let n = 150;
    let mut dense = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..i {
            if rng.gen_bool(0.05) {
                let v = rng.gen_range(-1.0..1.0);
                dense[(i, j)] = v;
                dense[(j, i)] = v;
            }
        }
    }
    for i in 0..n {
        let off: f64 = dense.row(i).iter().map(|v| v.abs()).sum();
        dense[(i, i)] = off + rng.gen_range(1.0..2.0);
    }

    let rows: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..=i).filter(|&j| dense[(i, j)] != 0.0).collect())
        .collect();
    let lower = CsrStructure::from_rows(n, &rows);
    let mut values = Vec::with_capacity(lower.nnz());
    for (i, row) in rows.iter().enumerate() {
        values.extend(row.iter().map(|&j| dense[(i, j)]));
    }

    let mut ldl = SparseLdl::analyze(&lower).unwrap();
    let report = ldl.factorize(&lower, &values, None).unwrap();
    assert!(report.is_positive_definite());

    let mut l = DMatrix::<f64>::identity(n, n);
    let mut d = DMatrix::<f64>::zeros(n, n);
    let s = ldl.structure();
    for i in 0..n {
        let range = s.rowadr()[i]..s.rowadr()[i] + s.rownnz()[i];
        let cols = &s.colind()[range.clone()];
        let vals = &ldl.values()[range];
        for (&j, &v) in cols.iter().zip(vals) {
            if j == i {
                d[(i, i)] = v;
            } else {
                l[(i, j)] = v;
            }
        }
    }
    let rebuilt = l.transpose() * d * &l;
    let scale = dense.amax();
    for (got, want) in rebuilt.iter().zip(dense.iter()) {
        assert!((got - want).abs() <= 1e-12 * scale, "{got} vs {want}");
    }
}
