//! Sparse vector kernels: dot products, pattern merges and combinations.
//!
//! A sparse vector is a value slice plus a strictly increasing index slice.
//! In the compressed layout `values[i]` belongs to `ind[i]`; in the
//! uncompressed layout the values live in a dense buffer at `values[ind[i]]`.

/// Dot product of a sparse vector with a dense vector.
///
/// Accumulates four partial sums to shorten the dependency chain, so the
/// result matches a left-to-right sum only up to floating point reordering.
#[inline]
pub fn dot_sparse(sparse: &[f64], ind: &[usize], dense: &[f64], uncompressed: bool) -> f64 {
    let nnz = ind.len();
    let mut i = 0;
    let (mut s0, mut s1, mut s2, mut s3) = (0.0, 0.0, 0.0, 0.0);

    if uncompressed {
        while i + 4 <= nnz {
            s0 += sparse[ind[i]] * dense[ind[i]];
            s1 += sparse[ind[i + 1]] * dense[ind[i + 1]];
            s2 += sparse[ind[i + 2]] * dense[ind[i + 2]];
            s3 += sparse[ind[i + 3]] * dense[ind[i + 3]];
            i += 4;
        }
    } else {
        while i + 4 <= nnz {
            s0 += sparse[i] * dense[ind[i]];
            s1 += sparse[i + 1] * dense[ind[i + 1]];
            s2 += sparse[i + 2] * dense[ind[i + 2]];
            s3 += sparse[i + 3] * dense[ind[i + 3]];
            i += 4;
        }
    }

    let mut res = (s0 + s2) + (s1 + s3);
    if uncompressed {
        for &k in &ind[i..] {
            res += sparse[k] * dense[k];
        }
    } else {
        for (value, &k) in sparse[i..nnz].iter().zip(&ind[i..]) {
            res += value * dense[k];
        }
    }
    res
}

/// Dense dot product with the same four-way accumulation as [`dot_sparse`].
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let mut i = 0;
    let (mut s0, mut s1, mut s2, mut s3) = (0.0, 0.0, 0.0, 0.0);
    while i + 4 <= n {
        s0 += a[i] * b[i];
        s1 += a[i + 1] * b[i + 1];
        s2 += a[i + 2] * b[i + 2];
        s3 += a[i + 3] * b[i + 3];
        i += 4;
    }
    let mut res = (s0 + s2) + (s1 + s3);
    for k in i..n {
        res += a[k] * b[k];
    }
    res
}

/// Dot product of two sparse vectors.
///
/// `vec1` is compressed. `vec2` is compressed unless `uncompressed2` is set,
/// in which case it is a dense buffer addressed through `ind2`.
pub fn dot_sparse2(
    vec1: &[f64],
    ind1: &[usize],
    vec2: &[f64],
    ind2: &[usize],
    uncompressed2: bool,
) -> f64 {
    let (nnz1, nnz2) = (ind1.len(), ind2.len());
    if nnz1 == 0 || nnz2 == 0 {
        return 0.0;
    }

    let (mut i1, mut i2) = (0, 0);
    let mut res = 0.0;
    while i1 < nnz1 && i2 < nnz2 {
        let adr1 = ind1[i1];
        let adr2 = ind2[i2];
        if adr1 == adr2 {
            let v2 = if uncompressed2 { vec2[adr2] } else { vec2[i2] };
            res += vec1[i1] * v2;
            i1 += 1;
            i2 += 1;
        } else if adr1 < adr2 {
            i1 += 1;
        } else {
            i2 += 1;
        }
    }
    res
}

/// Returns true if both index sequences are identical.
#[inline]
pub fn compare(a: &[usize], b: &[usize]) -> bool {
    a == b
}

/// Merges two strictly increasing sequences into `merge`, dropping duplicates.
///
/// `merge` must hold at least `chain1.len() + chain2.len()` entries. Returns
/// the number of entries written.
pub fn merge_sorted(merge: &mut [usize], chain1: &[usize], chain2: &[usize]) -> usize {
    let (n1, n2) = (chain1.len(), chain2.len());

    if n1 == 0 {
        merge[..n2].copy_from_slice(chain2);
        return n2;
    }
    if n2 == 0 {
        merge[..n1].copy_from_slice(chain1);
        return n1;
    }
    if n1 == n2 && compare(chain1, chain2) {
        merge[..n1].copy_from_slice(chain1);
        return n1;
    }

    let (mut i, mut j, mut k) = (0, 0, 0);
    while i < n1 && j < n2 {
        let c1 = chain1[i];
        let c2 = chain2[j];
        if c1 < c2 {
            merge[k] = c1;
            i += 1;
        } else if c1 > c2 {
            merge[k] = c2;
            j += 1;
        } else {
            merge[k] = c1;
            i += 1;
            j += 1;
        }
        k += 1;
    }

    if i < n1 {
        merge[k..k + n1 - i].copy_from_slice(&chain1[i..]);
        k += n1 - i;
    } else if j < n2 {
        merge[k..k + n2 - j].copy_from_slice(&chain2[j..]);
        k += n2 - j;
    }
    k
}

/// Counts the nonzeros of the union of two sparse patterns.
pub fn combine_sparse_count(a_ind: &[usize], b_ind: &[usize]) -> usize {
    let (mut a, mut b, mut count) = (0, 0, 0);
    while a < a_ind.len() && b < b_ind.len() {
        count += 1;
        match a_ind[a].cmp(&b_ind[b]) {
            std::cmp::Ordering::Less => a += 1,
            std::cmp::Ordering::Greater => b += 1,
            std::cmp::Ordering::Equal => {
                a += 1;
                b += 1;
            }
        }
    }
    count + (a_ind.len() - a) + (b_ind.len() - b)
}

/// Computes `dst = a*dst + b*src` over the union of both patterns.
///
/// `dst`/`dst_ind` hold `dst_nnz` entries on entry and must have room for the
/// union. `buf`/`buf_ind` are scratch buffers of at least `dst_nnz` entries.
/// Returns the resulting nonzero count.
#[allow(clippy::too_many_arguments)]
pub fn combine_sparse(
    dst: &mut [f64],
    dst_ind: &mut [usize],
    dst_nnz: usize,
    src: &[f64],
    src_ind: &[usize],
    a: f64,
    b: f64,
    buf: &mut [f64],
    buf_ind: &mut [usize],
) -> usize {
    let src_nnz = src_ind.len();

    if dst_nnz == src_nnz && compare(&dst_ind[..dst_nnz], src_ind) {
        for (d, s) in dst[..dst_nnz].iter_mut().zip(src) {
            *d = a * *d + b * s;
        }
        return dst_nnz;
    }

    buf[..dst_nnz].copy_from_slice(&dst[..dst_nnz]);
    buf_ind[..dst_nnz].copy_from_slice(&dst_ind[..dst_nnz]);

    let (mut bi, mut si, mut nnz) = (0, 0, 0);
    while bi < dst_nnz && si < src_nnz {
        let badr = buf_ind[bi];
        let sadr = src_ind[si];
        if badr == sadr {
            dst[nnz] = a * buf[bi] + b * src[si];
            dst_ind[nnz] = badr;
            bi += 1;
            si += 1;
        } else if badr < sadr {
            dst[nnz] = a * buf[bi];
            dst_ind[nnz] = badr;
            bi += 1;
        } else {
            dst[nnz] = b * src[si];
            dst_ind[nnz] = sadr;
            si += 1;
        }
        nnz += 1;
    }
    while si < src_nnz {
        dst[nnz] = b * src[si];
        dst_ind[nnz] = src_ind[si];
        si += 1;
        nnz += 1;
    }
    while bi < dst_nnz {
        dst[nnz] = a * buf[bi];
        dst_ind[nnz] = buf_ind[bi];
        bi += 1;
        nnz += 1;
    }
    nnz
}

/// Computes `dst = a*dst + b*src` without growing the pattern of `dst`.
///
/// Entries of `src` whose index is absent from `dst_ind` are ignored.
pub fn combine_sparse_inc(
    dst: &mut [f64],
    dst_ind: &[usize],
    src: &[f64],
    src_ind: &[usize],
    a: f64,
    b: f64,
) {
    let dst_nnz = dst_ind.len();
    if dst_nnz == src_ind.len() && compare(dst_ind, src_ind) {
        for (d, s) in dst[..dst_nnz].iter_mut().zip(src) {
            *d = a * *d + b * s;
        }
        return;
    }

    if a != 1.0 {
        for d in &mut dst[..dst_nnz] {
            *d *= a;
        }
    }
    add_to_scl_sparse_inc(dst, dst_ind, src, src_ind, b);
}

/// Computes `dst += scl*src` at the indices common to both patterns.
pub fn add_to_scl_sparse_inc(
    dst: &mut [f64],
    dst_ind: &[usize],
    src: &[f64],
    src_ind: &[usize],
    scl: f64,
) {
    let dst_nnz = dst_ind.len();
    let mut di = 0;
    for (s, &sadr) in src.iter().zip(src_ind) {
        while di < dst_nnz && dst_ind[di] < sadr {
            di += 1;
        }
        if di == dst_nnz {
            return;
        }
        if dst_ind[di] == sadr {
            dst[di] += scl * s;
            di += 1;
        }
    }
}
