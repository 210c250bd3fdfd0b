//! Dense linear-algebra primitives used by the stamping pipeline.
//!
//! Every matrix here is row-major and flattened into a single `&[f64]` /
//! `&mut [f64]` slice of length `rows * cols`. None of these routines detect
//! a singular input or aliased buffers; callers are responsible for both
//! (the safe API's `&mut`/`&` split already rules out aliasing at compile
//! time).

/// Inverts the `m x m` matrix `a` in place using partial-pivot LU
/// decomposition followed by explicit recomposition of the inverse.
///
/// `a` is overwritten with its own inverse. Scratch storage for the pivot
/// permutation, the LU factors, and the intermediate product is allocated
/// internally and freed when this function returns.
///
/// Panics if `a.len() != m * m`.
pub fn mat_inv(m: usize, a: &mut [f64]) {
    assert_eq!(a.len(), m * m);
    if m == 0 {
        return;
    }

    // Step 0: partial-pivot permutation. Mirrors the reference selection
    // loop exactly: pm[j] is swapped with pm[i] every time a larger pivot
    // candidate is found while scanning down column j, not only once at
    // the end of the scan.
    let mut pm: Vec<usize> = (0..m).collect();
    for j in 0..m {
        for i in (j + 1)..m {
            if a[pm[i] * m + j].abs() > a[pm[j] * m + j].abs() {
                pm.swap(j, i);
            }
        }
    }

    // Step 1: permuted copy to factor in place.
    let mut lu = vec![0.0f64; m * m];
    for i in 0..m {
        let src = pm[i] * m;
        let dst = i * m;
        lu[dst..dst + m].copy_from_slice(&a[src..src + m]);
    }

    // Step 2: Doolittle LU, U on/above the diagonal, L (unit diagonal,
    // implicit) strictly below.
    for i in 0..m {
        for j in i..m {
            let mut s = lu[i * m + j];
            for k in 0..i {
                s -= lu[i * m + k] * lu[k * m + j];
            }
            lu[i * m + j] = s;
        }
        for k in (i + 1)..m {
            let mut s = lu[k * m + i];
            for j in 0..i {
                s -= lu[k * m + j] * lu[j * m + i];
            }
            lu[k * m + i] = s / lu[i * m + i];
        }
    }

    // Step 3: invert L (unit lower) and U (upper) independently into `a`,
    // stored in the corresponding triangle (diagonal belongs to U^-1).
    for i in 0..m {
        a[i * m + i] = 1.0 / lu[i * m + i];
    }
    for i in 1..m {
        for j in 0..i {
            // L's own diagonal entry L[j][j] is an implicit 1, not stored.
            let mut s = lu[i * m + j];
            for k in (j + 1)..i {
                s += lu[i * m + k] * a[k * m + j];
            }
            a[i * m + j] = -s;
        }
    }
    for j in 1..m {
        for i in (0..j).rev() {
            let mut s = 0.0;
            for k in (i + 1)..=j {
                s += lu[i * m + k] * a[k * m + j];
            }
            a[i * m + j] = -s / lu[i * m + i];
        }
    }

    // Step 4: U^-1 . L^-1, exploiting the triangular sparsity of both
    // factors (U^-1 upper incl. diagonal read from `a`'s upper triangle,
    // L^-1 unit lower read from `a`'s lower triangle with an implicit 1 on
    // the diagonal), written into `lu`.
    for i in 0..m {
        for j in 0..m {
            let lo = i.max(j);
            let mut s = 0.0;
            for k in lo..m {
                let u_ik = if k == i {
                    a[i * m + i]
                } else if k > i {
                    a[i * m + k]
                } else {
                    0.0
                };
                let l_kj = if k == j {
                    1.0
                } else if k > j {
                    a[k * m + j]
                } else {
                    0.0
                };
                s += u_ik * l_kj;
            }
            lu[i * m + j] = s;
        }
    }

    // Step 5: un-permute columns back into `a`.
    for i in 0..m {
        for j in 0..m {
            a[i * m + pm[j]] = lu[i * m + j];
        }
    }
}

/// Multiplies square `m x m` matrices `a . b` into `c`. `c` must not alias
/// `a` or `b`; it is zeroed before accumulation.
///
/// Panics if any slice length is not `m * m`.
pub fn mat_mul(m: usize, c: &mut [f64], a: &[f64], b: &[f64]) {
    assert_eq!(a.len(), m * m);
    assert_eq!(b.len(), m * m);
    assert_eq!(c.len(), m * m);
    c.iter_mut().for_each(|v| *v = 0.0);
    for i in 0..m {
        for k in 0..m {
            let s = a[i * m + k];
            if s == 0.0 {
                continue;
            }
            for j in 0..m {
                c[i * m + j] += s * b[k * m + j];
            }
        }
    }
}

/// General (not necessarily square) matrix-vector product: `y = a . x`
/// where `a` is `m x n`, `x` has length `n`, `y` has length `m`.
///
/// Panics on length mismatch.
pub fn vec_mul(m: usize, n: usize, y: &mut [f64], a: &[f64], x: &[f64]) {
    assert_eq!(a.len(), m * n);
    assert_eq!(x.len(), n);
    assert_eq!(y.len(), m);
    for i in 0..m {
        let mut s = 0.0;
        for j in 0..n {
            s += a[i * n + j] * x[j];
        }
        y[i] = s;
    }
}

/// Elementwise vector addition: `z = x + y`.
///
/// Panics if the three slices do not all have length `m`.
pub fn vec_add(m: usize, z: &mut [f64], x: &[f64], y: &[f64]) {
    assert_eq!(z.len(), m);
    assert_eq!(x.len(), m);
    assert_eq!(y.len(), m);
    for i in 0..m {
        z[i] = x[i] + y[i];
    }
}

/// Elementwise weighted fused multiply-add: `y[i] = w1[i]*x[i] + w2[i]*y[i]`.
///
/// This is the per-step associated-source refresh: `w1`/`w2` are the
/// companion weights, `x` is the freshly solved branch quantity, `y` is the
/// associated source updated in place.
///
/// Panics if the four slices do not all have length `m`.
pub fn vec_fma(m: usize, y: &mut [f64], w1: &[f64], x: &[f64], w2: &[f64]) {
    assert_eq!(y.len(), m);
    assert_eq!(w1.len(), m);
    assert_eq!(x.len(), m);
    assert_eq!(w2.len(), m);
    for i in 0..m {
        y[i] = w1[i] * x[i] + w2[i] * y[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn identity(m: usize) -> Vec<f64> {
        let mut id = vec![0.0; m * m];
        for i in 0..m {
            id[i * m + i] = 1.0;
        }
        id
    }

    #[test]
    fn inverts_diagonal_matrix() {
        let m = 3;
        let mut a = vec![0.0; m * m];
        a[0] = 2.0;
        a[4] = 4.0;
        a[8] = 0.5;
        mat_inv(m, &mut a);
        assert_relative_eq!(a[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(a[4], 0.25, epsilon = 1e-12);
        assert_relative_eq!(a[8], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn round_trips_through_mat_mul() {
        let m = 4;
        #[rustfmt::skip]
        let a: Vec<f64> = vec![
            4.0, 3.0, 2.0, 1.0,
            1.0, 5.0, 0.0, 2.0,
            2.0, 1.0, 6.0, 3.0,
            0.0, 1.0, 2.0, 7.0,
        ];
        let mut inv = a.clone();
        mat_inv(m, &mut inv);
        let mut prod = vec![0.0; m * m];
        mat_mul(m, &mut prod, &a, &inv);
        let id = identity(m);
        for i in 0..m * m {
            assert_relative_eq!(prod[i], id[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn inverts_requiring_pivoting() {
        let m = 2;
        let a: Vec<f64> = vec![0.0, 1.0, 1.0, 1.0];
        let mut inv = a.clone();
        mat_inv(m, &mut inv);
        let mut prod = vec![0.0; m * m];
        mat_mul(m, &mut prod, &a, &inv);
        let id = identity(m);
        for i in 0..m * m {
            assert_relative_eq!(prod[i], id[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn vec_mul_computes_general_product() {
        let mut y = vec![0.0; 2];
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
        let x = vec![1.0, 1.0, 1.0];
        vec_mul(2, 3, &mut y, &a, &x);
        assert_relative_eq!(y[0], 6.0, epsilon = 1e-12);
        assert_relative_eq!(y[1], 15.0, epsilon = 1e-12);
    }

    #[test]
    fn vec_add_is_elementwise() {
        let mut z = vec![0.0; 3];
        vec_add(3, &mut z, &[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0]);
        assert_eq!(z, vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn random_matrices_invert_within_tolerance() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        for m in [1, 2, 3, 5, 8, 13, 16] {
            // Diagonally dominant by construction, so guaranteed non-singular
            // regardless of the off-diagonal draws.
            let mut a = vec![0.0f64; m * m];
            for i in 0..m {
                for j in 0..m {
                    if i != j {
                        a[i * m + j] = rng.gen_range(-1.0..1.0);
                    }
                }
            }
            for i in 0..m {
                let row_abs_sum: f64 = (0..m).map(|j| a[i * m + j].abs()).sum();
                a[i * m + i] = row_abs_sum + 1.0 + rng.gen_range(0.0..1.0);
            }

            let mut inv = a.clone();
            mat_inv(m, &mut inv);
            let mut prod = vec![0.0; m * m];
            mat_mul(m, &mut prod, &a, &inv);
            let id = identity(m);
            let max_err = prod
                .iter()
                .zip(id.iter())
                .map(|(p, e)| (p - e).abs())
                .fold(0.0, f64::max);
            assert!(max_err < 1e-9, "m={m} max-norm error {max_err}");
        }
    }

    #[test]
    fn vec_fma_matches_formula() {
        let mut y = vec![2.0, 3.0];
        let w1 = vec![1.0, 0.5];
        let x = vec![10.0, 10.0];
        let w2 = vec![0.0, 1.0];
        vec_fma(2, &mut y, &w1, &x, &w2);
        assert_relative_eq!(y[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(y[1], 8.0, epsilon = 1e-12);
    }
}
