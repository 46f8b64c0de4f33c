//! Faddeeva function `w(z) = exp(-z²)·erfc(-iz)`.
//!
//! Humlicek's four-region rational approximation (W4), accurate to about
//! 1e-4 relative over the whole upper half plane, which is well below the
//! noise of a measured spectrum.

use num_complex::Complex64;

/// Evaluate the Faddeeva function at `z`.
///
/// Points in the lower half plane use `w(z) = 2·exp(-z²) - w(-z)`.
pub fn faddeeva(z: Complex64) -> Complex64 {
    if z.im < 0.0 {
        return 2.0 * (-z * z).exp() - humlicek(-z);
    }
    humlicek(z)
}

/// Real part of `w(x + iy)` for `y ≥ 0`, the only part the Voigt profile uses.
pub fn faddeeva_re(x: f64, y: f64) -> f64 {
    faddeeva(Complex64::new(x, y)).re
}

fn humlicek(z: Complex64) -> Complex64 {
    let (x, y) = (z.re, z.im);
    let t = Complex64::new(y, -x);
    let s = x.abs() + y;

    if s >= 15.0 {
        // Region I
        t * 0.5641896 / (0.5 + t * t)
    } else if s >= 5.5 {
        // Region II
        let u = t * t;
        t * (1.410474 + u * 0.5641896) / (0.75 + u * (3.0 + u))
    } else if y >= 0.195 * x.abs() - 0.176 {
        // Region III
        let num = 16.4955 + t * (20.20933 + t * (11.96482 + t * (3.778987 + t * 0.5642236)));
        let den = 16.4955
            + t * (38.82363 + t * (39.27121 + t * (21.69274 + t * (6.699398 + t))));
        num / den
    } else {
        // Region IV
        let u = t * t;
        let num = t
            * (36183.31
                - u * (3321.9905
                    - u * (1540.787
                        - u * (219.0313 - u * (35.76683 - u * (1.320522 - u * 0.56419))))));
        let den = 32066.6
            - u * (24322.84
                - u * (9022.228
                    - u * (2186.181 - u * (364.2191 - u * (61.57037 - u * (1.841439 - u))))));
        u.exp() - num / den
    }
}
