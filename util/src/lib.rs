use nalgebra::DVectorView;

/// Poor man's approx assertion for slices of floating point values
#[macro_export]
macro_rules! assert_approx_slice_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: &[f64] = &$x;
        let y: &[f64] = &$y;
        assert_eq!(x.len(), y.len(), "Slices must have the same length");
        let max_absdiff = $crate::max_abs_diff(x, y);
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {:?}", x);
            println!("right: {:?}", y);
            println!("max absdiff: {:e}", max_absdiff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Largest absolute difference between corresponding entries.
pub fn max_abs_diff(x: &[f64], y: &[f64]) -> f64 {
    let x = DVectorView::from_slice(x, x.len());
    let y = DVectorView::from_slice(y, y.len());
    (x - y).amax()
}

/// Central finite difference approximation of the derivative of `f` at `x` in direction `k`.
pub fn central_difference(mut f: impl FnMut(&[f64]) -> Vec<f64>, x: &[f64], k: usize, h: f64) -> Vec<f64> {
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();
    x_plus[k] += h;
    x_minus[k] -= h;
    f(&x_plus)
        .iter()
        .zip(f(&x_minus))
        .map(|(plus, minus)| (plus - minus) / (2.0 * h))
        .collect()
}
