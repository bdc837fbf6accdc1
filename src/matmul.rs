//! Small GEMM wrapper used by the batched forward/backward passes.
//!
//! - default: a simple, safe triple-loop implementation
//! - optional: a faster backend via the `matrixmultiply` feature
//!
//! Operands are described by [`View`] (a slice plus row/column strides) so the
//! same routine serves `X·Wᵀ`, `dZᵀ·X` and `dZ·W` without materialising
//! transposes. The output is always a contiguous row-major `(m, n)` buffer.

#[derive(Debug, Clone, Copy)]
pub(crate) struct View<'a> {
    data: &'a [f32],
    rs: usize,
    cs: usize,
}

impl<'a> View<'a> {
    /// Row-major matrix with `cols` columns.
    #[inline]
    pub(crate) fn row_major(data: &'a [f32], cols: usize) -> Self {
        Self {
            data,
            rs: cols,
            cs: 1,
        }
    }

    /// Transpose of a row-major matrix that has `cols` columns.
    #[inline]
    pub(crate) fn transposed(data: &'a [f32], cols: usize) -> Self {
        Self {
            data,
            rs: 1,
            cs: cols,
        }
    }
}

/// `c = a · b + beta * c` with `a: (m, k)`, `b: (k, n)`, `c: (m, n)`.
#[inline]
pub(crate) fn gemm(m: usize, n: usize, k: usize, a: View<'_>, b: View<'_>, beta: f32, c: &mut [f32]) {
    debug_assert!(c.len() >= m * n);
    if m == 0 || n == 0 {
        return;
    }
    if k == 0 {
        for v in c[..m * n].iter_mut() {
            *v *= beta;
        }
        return;
    }

    #[cfg(feature = "matrixmultiply")]
    {
        debug_assert!(a.data.len() >= (m - 1) * a.rs + (k - 1) * a.cs + 1);
        debug_assert!(b.data.len() >= (k - 1) * b.rs + (n - 1) * b.cs + 1);
        // SAFETY: the extents asserted above cover every element sgemm reads,
        // and `c` holds at least `m * n` row-major elements.
        unsafe {
            matrixmultiply::sgemm(
                m,
                k,
                n,
                1.0,
                a.data.as_ptr(),
                a.rs as isize,
                a.cs as isize,
                b.data.as_ptr(),
                b.rs as isize,
                b.cs as isize,
                beta,
                c.as_mut_ptr(),
                n as isize,
                1,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        let a0 = i * a.rs;
        for j in 0..n {
            let b0 = j * b.cs;
            let mut acc = 0.0_f32;
            for p in 0..k {
                acc = a.data[a0 + p * a.cs].mul_add(b.data[b0 + p * b.rs], acc);
            }
            let idx = i * n + j;
            c[idx] = if beta == 0.0 { acc } else { acc + beta * c[idx] };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplies_with_transposed_operand() {
        // a: (2, 3), w: (2, 3) row-major; c = a · wᵀ is (2, 2).
        let a = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let w = [1.0_f32, 0.0, -1.0, 0.5, 0.5, 0.5];
        let mut c = [0.0_f32; 4];
        gemm(
            2,
            2,
            3,
            View::row_major(&a, 3),
            View::transposed(&w, 3),
            0.0,
            &mut c,
        );
        assert_eq!(c, [-2.0, 3.0, -2.0, 7.5]);
    }

    #[test]
    fn beta_accumulates_into_output() {
        let a = [1.0_f32, 2.0];
        let b = [3.0_f32, 4.0];
        let mut c = [10.0_f32];
        gemm(1, 1, 2, View::row_major(&a, 2), View::row_major(&b, 1), 1.0, &mut c);
        assert_eq!(c, [21.0]);
    }
}
