//! Tolerance-aware floating point ordering.
//!
//! Every floating-point comparison the reduction and comparison code makes
//! goes through these helpers so that near-degenerate lattices order the
//! same way on every platform.

/// Default comparison tolerance.
pub const STABLE_TOL: f64 = 1e-5;

pub fn lt(v1: f64, v2: f64, prec: f64) -> bool {
    v1 < v2 - prec
}

pub fn gt(v1: f64, v2: f64, prec: f64) -> bool {
    v2 < v1 - prec
}

pub fn eq(v1: f64, v2: f64, prec: f64) -> bool {
    !(lt(v1, v2, prec) || gt(v1, v2, prec))
}

pub fn neq(v1: f64, v2: f64, prec: f64) -> bool {
    !eq(v1, v2, prec)
}

pub fn leq(v1: f64, v2: f64, prec: f64) -> bool {
    !gt(v1, v2, prec)
}

pub fn geq(v1: f64, v2: f64, prec: f64) -> bool {
    !lt(v1, v2, prec)
}

/// Sign of `v`, with 0 counted as positive.
pub fn sign(v: f64) -> f64 {
    if v >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Round half away from zero to `dec` decimal places.
pub fn round(v: f64, dec: i32) -> f64 {
    let shift = 10.0_f64.powi(dec);
    (v * shift).round() / shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let tol = 1e-5;
        assert!(lt(1.0, 1.1, tol));
        assert!(!lt(1.0, 1.0 + 0.5e-5, tol));
        assert!(gt(1.1, 1.0, tol));
        assert!(eq(1.0, 1.0 + 0.5e-5, tol));
        assert!(neq(1.0, 1.1, tol));
        assert!(leq(1.0, 1.0 + 0.5e-5, tol));
        assert!(leq(1.0, 2.0, tol));
        assert!(geq(1.0 + 0.5e-5, 1.0, tol));
    }

    #[test]
    fn test_sign() {
        assert_eq!(sign(3.0), 1.0);
        assert_eq!(sign(0.0), 1.0);
        assert_eq!(sign(-2.0), -1.0);
    }

    #[test]
    fn test_round() {
        assert_eq!(round(1.2345, 2), 1.23);
        assert_eq!(round(1.235, 2), 1.24);
        assert_eq!(round(-1.235, 2), -1.24);
        assert_eq!(round(2.5, 0), 3.0);
    }
}
