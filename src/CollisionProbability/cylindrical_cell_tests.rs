#[cfg(test)]
mod tests {
    use super::super::cylindrical_cell::*;
    use crate::CrossSections::MGCrossSections;
    use crate::errors::LatticeError;
    use crate::settings::{QuadratureRuleKind, QuadratureSettings};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use std::f64::consts::PI;
    use std::sync::Arc;

    fn one_group(etr: f64, ea: f64) -> Arc<MGCrossSections> {
        Arc::new(MGCrossSections::new(vec![etr], vec![ea], vec![vec![etr - ea]]).unwrap())
    }

    fn two_group_fuel() -> Arc<MGCrossSections> {
        Arc::new(
            MGCrossSections::new_fissile(
                vec![0.3, 1.0],
                vec![0.01, 0.1],
                vec![vec![0.25, 0.04], vec![0.0, 0.9]],
                vec![0.005, 0.08],
                vec![2.5, 2.4],
                vec![1.0, 0.0],
            )
            .unwrap(),
        )
    }

    fn two_group_water() -> Arc<MGCrossSections> {
        Arc::new(
            MGCrossSections::new(
                vec![0.4, 1.6],
                vec![0.0005, 0.02],
                vec![vec![0.33, 0.0695], vec![0.001, 1.579]],
            )
            .unwrap(),
        )
    }

    fn solved(radii: Vec<f64>, mats: Vec<Arc<MGCrossSections>>) -> CylindricalCell {
        let mut cell = CylindricalCell::new(radii, mats).unwrap();
        cell.solve().unwrap();
        cell
    }

    #[test]
    fn test_geometry() {
        let m = one_group(0.5, 0.1);
        let cell = CylindricalCell::new(vec![0.4, 0.7], vec![m.clone(), m]).unwrap();
        assert_eq!(cell.nregions(), 2);
        assert_eq!(cell.ngroups(), 1);
        assert_relative_eq!(cell.volume(0).unwrap(), PI * 0.16, max_relative = 1e-14);
        assert_relative_eq!(cell.volume(1).unwrap(), PI * (0.49 - 0.16), max_relative = 1e-14);
        assert_relative_eq!(cell.S(), 2.0 * PI * 0.7, max_relative = 1e-14);
        assert_eq!(cell.radius(1), Some(0.7));
        assert_eq!(cell.radius(2), None);
        assert!(!cell.solved());
        assert_eq!(cell.p(0, 0, 0), None);
        assert_eq!(cell.Gamma(0), None);
        assert!(cell.p_tensor().is_none());
    }

    #[test]
    fn test_configuration_errors() {
        let m = one_group(0.5, 0.1);
        let two = || vec![m.clone(), m.clone()];

        let err = CylindricalCell::new(vec![0.4, 0.7, 0.9], two()).unwrap_err();
        assert!(err.is_configuration());
        assert!(CylindricalCell::new(vec![0.4], vec![m.clone()]).is_err());
        assert!(CylindricalCell::new(vec![0.3, 0.2], two()).is_err());
        assert!(CylindricalCell::new(vec![0.3, 0.3], two()).is_err());
        assert!(CylindricalCell::new(vec![0.0, 0.2], two()).is_err());
        assert!(CylindricalCell::new(vec![-0.1, 0.2], two()).is_err());
        assert!(CylindricalCell::new(vec![0.1, f64::INFINITY], two()).is_err());

        let err = CylindricalCell::from_optional(vec![0.4, 0.7], vec![Some(m.clone()), None])
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(CylindricalCell::from_optional(vec![0.4, 0.7], vec![Some(m.clone()), Some(m.clone())]).is_ok());

        // group count mismatch
        let err = CylindricalCell::new(vec![0.4, 0.7], vec![m.clone(), two_group_water()])
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_symmetry_and_escape() {
        let cell = solved(
            vec![0.2, 0.41, 0.6, 0.71],
            vec![two_group_fuel(), two_group_fuel(), two_group_water(), two_group_water()],
        );
        assert!(cell.solved());
        for g in 0..2 {
            for i in 0..4 {
                for j in 0..4 {
                    let pij = cell.p(g, i, j).unwrap();
                    assert_eq!(pij, cell.p(g, j, i).unwrap());
                    assert!(pij > 0.0);
                }
                let escape = cell.escape_probability(g, i).unwrap();
                assert!(escape > 0.0 && escape < 1.0, "escape = {}", escape);
            }
            let gamma = cell.Gamma(g).unwrap();
            assert!(gamma > 0.0 && gamma < 1.0);
        }
        assert_eq!(cell.escape_probability(2, 0), None);
        assert_eq!(cell.p(0, 4, 0), None);
        assert_eq!(cell.p_tensor().unwrap().shape(), &[2, 4, 4]);
        assert_eq!(cell.y_tensor().unwrap().shape(), &[2, 4]);
    }

    #[test]
    fn test_black_core_view_factor() {
        // thin outer annulus around a black core: the collision probability
        // in the core is the fraction of directions pointing at it
        let (a, b): (f64, f64) = (0.5, 0.7);
        let cell = solved(vec![a, b], vec![one_group(1e3, 1e3), one_group(1e-4, 1e-4)]);
        let reduced = cell.p(0, 0, 1).unwrap() / (cell.volume(1).unwrap() * 1e-4);
        let view_factor = (b * b * (a / b).asin() + a * (b * b - a * a).sqrt() - PI * a * a / 2.0)
            / (PI * (b * b - a * a));
        assert_relative_eq!(reduced, view_factor, max_relative = 1e-3);
    }

    #[test]
    fn test_thick_absorber_is_black() {
        let m = one_group(5.0, 5.0);
        let cell = solved(vec![0.4, 0.7], vec![m.clone(), m]);
        let gamma = cell.Gamma(0).unwrap();
        assert!(gamma > 0.98 && gamma <= 1.0, "gamma = {}", gamma);
    }

    #[test]
    fn test_repeated_solve_is_identical() {
        let mut cell = CylindricalCell::new(
            vec![0.3, 0.5, 0.8],
            vec![two_group_fuel(), two_group_water(), two_group_water()],
        )
        .unwrap();
        cell.solve().unwrap();
        let first = (
            cell.p_tensor().unwrap().clone(),
            cell.x_tensor().unwrap().clone(),
            cell.gamma().unwrap().clone(),
        );
        cell.solve().unwrap();
        assert_eq!(cell.p_tensor().unwrap(), &first.0);
        assert_eq!(cell.x_tensor().unwrap(), &first.1);
        assert_eq!(cell.gamma().unwrap(), &first.2);
    }

    #[test]
    fn test_optical_scaling() {
        // Σ -> cΣ and R -> R/c keep every chord's optical length
        let c = 2.5;
        let sigmas = [0.8, 0.2, 1.5];
        let radii = [0.3, 0.6, 0.8];
        let base = solved(radii.to_vec(), sigmas.iter().map(|s| one_group(*s, 0.5 * s)).collect());
        let scaled = solved(
            radii.iter().map(|r| r / c).collect(),
            sigmas.iter().map(|s| one_group(c * s, 0.5 * c * s)).collect(),
        );
        for i in 0..3 {
            for j in 0..3 {
                let p1 = base.p(0, i, j).unwrap();
                let p2 = scaled.p(0, i, j).unwrap();
                let reduced1 = p1 / (base.volume(i).unwrap() * sigmas[i]);
                let reduced2 = p2 / (scaled.volume(i).unwrap() * c * sigmas[i]);
                assert_relative_eq!(reduced1, reduced2, max_relative = 1e-6, epsilon = 1e-9);
                assert_relative_eq!(p2 * c, p1, max_relative = 1e-6, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_splitting_a_homogeneous_region() {
        // collision rates of one material add up over sub-regions
        let m = one_group(0.6, 0.2);
        let split = solved(vec![0.3, 0.5, 0.8], vec![m.clone(), m.clone(), m.clone()]);
        let merged = solved(vec![0.3, 0.8], vec![m.clone(), m]);
        let p = |i, j| split.p(0, i, j).unwrap();

        assert_relative_eq!(merged.p(0, 0, 0).unwrap(), p(0, 0), max_relative = 1e-6);
        assert_relative_eq!(merged.p(0, 0, 1).unwrap(), p(0, 1) + p(0, 2), max_relative = 1e-6);
        assert_relative_eq!(
            merged.p(0, 1, 1).unwrap(),
            p(1, 1) + p(1, 2) + p(2, 1) + p(2, 2),
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_fixed_rule_close_to_adaptive() {
        let m = [one_group(0.5, 0.1), one_group(0.9, 0.3)];
        let adaptive = solved(vec![0.4, 0.7], m.to_vec());

        let mut fixed = CylindricalCell::new(vec![0.4, 0.7], m.to_vec()).unwrap();
        fixed
            .set_quadrature_settings(QuadratureSettings {
                rule: QuadratureRuleKind::G15K31,
                adaptive: false,
                ..QuadratureSettings::default()
            })
            .unwrap();
        fixed.solve().unwrap();
        for i in 0..2 {
            assert_relative_eq!(
                fixed.p(0, i, i).unwrap(),
                adaptive.p(0, i, i).unwrap(),
                max_relative = 1e-3
            );
        }
    }

    #[test]
    fn test_unconverged_integral_leaves_cell_unsolved() {
        let mut cell = solved(vec![0.5, 0.7], vec![one_group(1e3, 1e3), one_group(1e-4, 1e-4)]);
        assert!(cell.solved());
        cell.set_quadrature_settings(QuadratureSettings {
            abs_tolerance: 1e-300,
            rel_tolerance: 1e-15,
            max_subdivisions: 1,
            ..QuadratureSettings::default()
        })
        .unwrap();
        assert!(!cell.solved());
        let err = cell.solve().unwrap_err();
        assert!(err.is_numerical());
        assert!(!cell.solved());
        assert_eq!(cell.X(0, 0, 0), None);
    }

    #[test]
    fn test_over_scattering_material_never_reaches_the_solver() {
        // c = Es/Etr close to the inverse of the largest eigenvalue of the
        // reduced P matrix would make the group system nearly singular
        let err = MGCrossSections::new(vec![1.0], vec![0.0], vec![vec![1.98010]]).unwrap_err();
        assert!(err.is_configuration());

        // the limiting pure scatterer is still well posed
        let scatterer = one_group(1.0, 0.0);
        let cell = solved(vec![0.4, 0.7], vec![scatterer.clone(), scatterer]);
        assert!(cell.solved());
        let gamma = cell.Gamma(0).unwrap();
        assert!((0.0..=1.0).contains(&gamma), "gamma = {}", gamma);
        assert!(cell.Y(0, 0).unwrap() > 0.0);
    }

    #[test]
    fn test_singular_group_system_is_numerical_error() {
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let err = factor_system(3, singular).unwrap_err();
        assert!(err.is_numerical());
        assert!(matches!(err, LatticeError::Numerical { group: 3, .. }));

        let nearly = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0 + 1e-14]);
        assert!(factor_system(0, nearly).unwrap_err().is_numerical());

        let zero = DMatrix::<f64>::zeros(2, 2);
        assert!(factor_system(0, zero).unwrap_err().is_numerical());

        let fine = DMatrix::from_row_slice(2, 2, &[2.0, -0.5, -0.5, 3.0]);
        assert!(factor_system(0, fine).is_ok());
    }
}
