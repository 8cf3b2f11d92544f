//! # Bickley-Naylor functions
//!
//! The Bickley-Naylor functions appear when the 3D point kernel `exp(-τ)/4πr²`
//! is integrated along the axis of an infinite cylinder:
//!
//! ```text
//! Ki_n(x) = ∫_0^{π/2} cos^{n-1}(θ) exp(-x / cos θ) dθ
//! ```
//!
//! with `Ki_n' = -Ki_{n-1}`, `Ki_1(0) = π/2`, `Ki_2(0) = 1`, `Ki_3(0) = π/4`.
//!
//! [`Ki3`] is the workhorse of the collision-probability integrals. On
//! `[0, KI_TABLE_MAX]` it interpolates a table of `Ki3` and `Ki2` (the
//! negated derivative) with cubic Hermite polynomials. The table is computed
//! once, on first use, by [`Kin_quad`]. Beyond the table the quadrature is
//! evaluated directly.
#![allow(non_snake_case)]
use super::quadrature::{GaussKronrodRule, adaptive_integrate};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::sync::OnceLock;

/// upper end of the interpolation table
pub const KI_TABLE_MAX: f64 = 10.0;
const KI_TABLE_STEP: f64 = 1.0 / 128.0;
/// exp(-x) underflows past this point
const KI_UNDERFLOW: f64 = 745.0;

struct KiTable {
    ki3: Vec<f64>,
    ki2: Vec<f64>,
}

static KI_TABLE: OnceLock<KiTable> = OnceLock::new();

fn ki_table() -> &'static KiTable {
    KI_TABLE.get_or_init(|| {
        let npoints = (KI_TABLE_MAX / KI_TABLE_STEP).round() as usize + 1;
        let mut ki3 = Vec::with_capacity(npoints);
        let mut ki2 = Vec::with_capacity(npoints);
        for n in 0..npoints {
            let x = n as f64 * KI_TABLE_STEP;
            ki3.push(Kin_quad(3, x));
            ki2.push(Kin_quad(2, x));
        }
        // exact limits at the origin
        ki3[0] = FRAC_PI_4;
        ki2[0] = 1.0;
        log::debug!("Bickley-Naylor table built with {} points", npoints);
        KiTable { ki3, ki2 }
    })
}

/// Bickley-Naylor function of order `n` by adaptive quadrature.
///
/// The integrand is scaled by `exp(x)` so that the relative tolerance stays
/// meaningful for large arguments.
pub fn Kin_quad(n: u32, x: f64) -> f64 {
    let x = x.max(0.0);
    if x > KI_UNDERFLOW {
        return 0.0;
    }
    let power = n.saturating_sub(1) as i32;
    let mut integrand = |theta: f64| {
        let c = theta.cos();
        if c <= 0.0 {
            return 0.0;
        }
        c.powi(power) * (-x * (1.0 - c) / c).exp()
    };
    let rule = GaussKronrodRule::g10k21();
    let result = adaptive_integrate(&rule, &mut integrand, 0.0, FRAC_PI_2, 1e-300, 1e-13, 200);
    (-x).exp() * result.value
}

/// Ki3 evaluated by quadrature.
pub fn Ki3_quad(x: f64) -> f64 {
    if x <= 0.0 {
        return FRAC_PI_4;
    }
    Kin_quad(3, x)
}

/// Ki2 evaluated by quadrature.
pub fn Ki2_quad(x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    Kin_quad(2, x)
}

/// Third order Bickley-Naylor function.
///
/// Returns `π/4` for `x <= 0`, and is strictly decreasing for `x > 0`.
pub fn Ki3(x: f64) -> f64 {
    if x <= 0.0 {
        return FRAC_PI_4;
    }
    if x >= KI_TABLE_MAX {
        return Ki3_quad(x);
    }

    let table = ki_table();
    let t = x / KI_TABLE_STEP;
    let n = (t.floor() as usize).min(table.ki3.len() - 2);
    let u = t - n as f64;

    let f0 = table.ki3[n];
    let f1 = table.ki3[n + 1];
    // d/dx Ki3 = -Ki2, scaled to the unit interval
    let d0 = -table.ki2[n] * KI_TABLE_STEP;
    let d1 = -table.ki2[n + 1] * KI_TABLE_STEP;

    let u2 = u * u;
    let u3 = u2 * u;
    let h00 = 2.0 * u3 - 3.0 * u2 + 1.0;
    let h10 = u3 - 2.0 * u2 + u;
    let h01 = -2.0 * u3 + 3.0 * u2;
    let h11 = u3 - u2;

    h00 * f0 + h10 * d0 + h01 * f1 + h11 * d1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_values_at_origin() {
        assert_eq!(Ki3(0.0), FRAC_PI_4);
        assert_eq!(Ki3(-1.0), FRAC_PI_4);
        assert_relative_eq!(Kin_quad(3, 0.0), FRAC_PI_4, epsilon = 1e-13);
        assert_relative_eq!(Kin_quad(2, 0.0), 1.0, epsilon = 1e-13);
        assert_relative_eq!(Kin_quad(1, 0.0), FRAC_PI_2, epsilon = 1e-13);
    }

    #[test]
    fn test_derivative_relation() {
        // Ki3' = -Ki2, checked with a central difference
        for &x in &[0.05, 0.3, 1.0, 2.5, 7.0] {
            let h = 1e-4;
            let d = (Ki3_quad(x + h) - Ki3_quad(x - h)) / (2.0 * h);
            assert_relative_eq!(d, -Ki2_quad(x), max_relative = 1e-6);
        }
    }

    #[test]
    fn test_table_matches_quadrature() {
        let mut x = 1e-3;
        while x < KI_TABLE_MAX {
            assert_relative_eq!(Ki3(x), Ki3_quad(x), max_relative = 2e-8, epsilon = 1e-12);
            x *= 1.37;
        }
    }

    #[test]
    fn test_monotonically_decreasing() {
        let mut previous = Ki3(0.0);
        let mut x = 0.0;
        for _ in 0..600 {
            x += 0.05;
            let value = Ki3(x);
            assert!(value < previous, "Ki3 not decreasing at x = {}", x);
            assert!(value > 0.0);
            previous = value;
        }
        // across the end of the table
        assert!(Ki3(KI_TABLE_MAX - 1e-3) > Ki3(KI_TABLE_MAX + 1e-3));
    }

    #[test]
    fn test_large_arguments() {
        // leading asymptotic term sqrt(π/2x) exp(-x)
        let x: f64 = 40.0;
        let asymptotic = (std::f64::consts::PI / (2.0 * x)).sqrt() * (-x).exp();
        assert_relative_eq!(Ki3(x), asymptotic, max_relative = 0.1);
        assert_eq!(Ki3(1e4), 0.0);
    }
}
