//! # Multigroup cross sections
//!
//! Macroscopic cross sections of one material, in `1/cm`, for `G` energy
//! groups. Group 0 is the fastest group.
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `Etr` | transport-corrected total cross section |
//! | `Et` | total cross section (equal to `Etr` when not given) |
//! | `Ea` | absorption |
//! | `Ef` | fission |
//! | `nu` | neutrons per fission |
//! | `chi` | fission spectrum |
//! | `Es_tr` | transport-corrected scattering matrix, `Es_tr[g][g']` is `g -> g'` |
//!
//! Materials are validated on construction and on deserialization, so a
//! [`MGCrossSections`] value is always consistent. In JSON the fission data
//! may be left out for non-fissile materials:
//! ```json
//! { "Etr": [0.5], "Ea": [0.1], "Es_tr": [[0.4]] }
//! ```
#![allow(non_snake_case)]
use crate::errors::{LatticeError, LatticeResult};
use serde::{Deserialize, Serialize};

/// Plain serialized form of [`MGCrossSections`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MGCrossSectionsData {
    pub Etr: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub Et: Vec<f64>,
    pub Ea: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub Ef: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nu: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chi: Vec<f64>,
    pub Es_tr: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MGCrossSectionsData", into = "MGCrossSectionsData")]
pub struct MGCrossSections {
    Etr: Vec<f64>,
    Et: Vec<f64>,
    Ea: Vec<f64>,
    Ef: Vec<f64>,
    nu: Vec<f64>,
    chi: Vec<f64>,
    Es_tr: Vec<Vec<f64>>,
    fissile: bool,
}

/// rounding allowance for homogenized pure scatterers
const SCATTERING_SLACK: f64 = 1e-12;

fn check_values(name: &str, values: &[f64], ngroups: usize) -> LatticeResult<()> {
    if values.len() != ngroups {
        return Err(LatticeError::config(format!(
            "Cross section {} has {} groups, expected {}.",
            name,
            values.len(),
            ngroups
        )));
    }
    if let Some(v) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(LatticeError::config(format!(
            "Cross section {} contains invalid value {}.",
            name, v
        )));
    }
    Ok(())
}

impl MGCrossSections {
    /// Non-fissile material.
    pub fn new(Etr: Vec<f64>, Ea: Vec<f64>, Es_tr: Vec<Vec<f64>>) -> LatticeResult<Self> {
        Self::try_from(MGCrossSectionsData {
            Etr,
            Ea,
            Es_tr,
            ..Default::default()
        })
    }

    /// Fissile material; `nu` and `chi` are required.
    pub fn new_fissile(
        Etr: Vec<f64>,
        Ea: Vec<f64>,
        Es_tr: Vec<Vec<f64>>,
        Ef: Vec<f64>,
        nu: Vec<f64>,
        chi: Vec<f64>,
    ) -> LatticeResult<Self> {
        Self::try_from(MGCrossSectionsData {
            Etr,
            Ea,
            Es_tr,
            Ef,
            nu,
            chi,
            ..Default::default()
        })
    }

    /// Replaces the total cross section, which otherwise equals `Etr`.
    pub fn with_total(self, Et: Vec<f64>) -> LatticeResult<Self> {
        let mut data = MGCrossSectionsData::from(self);
        data.Et = Et;
        Self::try_from(data)
    }

    pub fn ngroups(&self) -> usize {
        self.Etr.len()
    }

    pub fn Etr(&self, g: usize) -> f64 {
        self.Etr[g]
    }

    pub fn Et(&self, g: usize) -> f64 {
        self.Et[g]
    }

    pub fn Ea(&self, g: usize) -> f64 {
        self.Ea[g]
    }

    pub fn Ef(&self, g: usize) -> f64 {
        self.Ef[g]
    }

    pub fn nu(&self, g: usize) -> f64 {
        self.nu[g]
    }

    pub fn chi(&self, g: usize) -> f64 {
        self.chi[g]
    }

    pub fn nu_Ef(&self, g: usize) -> f64 {
        self.nu[g] * self.Ef[g]
    }

    /// within-group scattering `g -> g`
    pub fn Es_tr(&self, g: usize) -> f64 {
        self.Es_tr[g][g]
    }

    /// scattering from `gin` to `gout`
    pub fn Es_tr_gg(&self, gin: usize, gout: usize) -> f64 {
        self.Es_tr[gin][gout]
    }

    /// all scattering out of `g`, the within-group term included
    pub fn Es_tr_out(&self, g: usize) -> f64 {
        self.Es_tr[g].iter().sum()
    }

    /// removal: everything that takes a neutron out of group `g`
    pub fn Er_tr(&self, g: usize) -> f64 {
        self.Etr[g] - self.Es_tr[g][g]
    }

    pub fn fissile(&self) -> bool {
        self.fissile
    }

    pub fn scattering_matrix(&self) -> &[Vec<f64>] {
        &self.Es_tr
    }
}

impl TryFrom<MGCrossSectionsData> for MGCrossSections {
    type Error = LatticeError;

    fn try_from(data: MGCrossSectionsData) -> LatticeResult<Self> {
        let ngroups = data.Etr.len();
        if ngroups == 0 {
            return Err(LatticeError::config("Cross sections need at least one group."));
        }
        check_values("Etr", &data.Etr, ngroups)?;
        if let Some(g) = data.Etr.iter().position(|e| *e <= 0.0) {
            return Err(LatticeError::config(format!(
                "Etr must be > 0, group {} has {}.",
                g, data.Etr[g]
            )));
        }
        check_values("Ea", &data.Ea, ngroups)?;

        if data.Es_tr.len() != ngroups {
            return Err(LatticeError::config(format!(
                "Scattering matrix has {} rows, expected {}.",
                data.Es_tr.len(),
                ngroups
            )));
        }
        for (g, row) in data.Es_tr.iter().enumerate() {
            check_values("Es_tr", row, ngroups)?;
            // scattering out of a group cannot exceed its transport cross section
            let out: f64 = row.iter().sum();
            if out > data.Etr[g] * (1.0 + SCATTERING_SLACK) {
                return Err(LatticeError::config(format!(
                    "Scattering out of group {} is {}, larger than Etr = {}.",
                    g, out, data.Etr[g]
                )));
            }
        }

        let Et = if data.Et.is_empty() {
            data.Etr.clone()
        } else {
            check_values("Et", &data.Et, ngroups)?;
            data.Et
        };

        let zeros = vec![0.0; ngroups];
        let Ef = if data.Ef.is_empty() {
            zeros.clone()
        } else {
            check_values("Ef", &data.Ef, ngroups)?;
            data.Ef
        };
        let fissile = Ef.iter().any(|f| *f > 0.0);
        let nu = if data.nu.is_empty() && !fissile {
            zeros.clone()
        } else {
            check_values("nu", &data.nu, ngroups)?;
            data.nu
        };
        let chi = if data.chi.is_empty() && !fissile {
            zeros
        } else {
            check_values("chi", &data.chi, ngroups)?;
            data.chi
        };

        Ok(Self {
            Etr: data.Etr,
            Et,
            Ea: data.Ea,
            Ef,
            nu,
            chi,
            Es_tr: data.Es_tr,
            fissile,
        })
    }
}

impl From<MGCrossSections> for MGCrossSectionsData {
    fn from(xs: MGCrossSections) -> Self {
        let Et = if xs.Et == xs.Etr { Vec::new() } else { xs.Et };
        let (Ef, nu, chi) = if xs.fissile {
            (xs.Ef, xs.nu, xs.chi)
        } else {
            (Vec::new(), Vec::new(), Vec::new())
        };
        MGCrossSectionsData {
            Etr: xs.Etr,
            Et,
            Ea: xs.Ea,
            Ef,
            nu,
            chi,
            Es_tr: xs.Es_tr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_group_fuel() -> MGCrossSections {
        MGCrossSections::new_fissile(
            vec![0.3, 1.0],
            vec![0.01, 0.1],
            vec![vec![0.25, 0.04], vec![0.0, 0.9]],
            vec![0.005, 0.08],
            vec![2.5, 2.4],
            vec![1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_accessors() {
        let xs = two_group_fuel();
        assert_eq!(xs.ngroups(), 2);
        assert!(xs.fissile());
        assert_eq!(xs.Es_tr(0), 0.25);
        assert_eq!(xs.Es_tr_gg(0, 1), 0.04);
        assert_relative_eq!(xs.Es_tr_out(0), 0.29, epsilon = 1e-15);
        assert_relative_eq!(xs.Er_tr(0), 0.05, epsilon = 1e-15);
        assert_relative_eq!(xs.nu_Ef(1), 0.192, epsilon = 1e-15);
        // total defaults to transport
        assert_eq!(xs.Et(1), xs.Etr(1));
        let matrix = xs.scattering_matrix();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0], vec![0.25, 0.04]);
        assert_eq!(matrix[1][0], 0.0);
    }

    #[test]
    fn test_non_fissile_defaults() {
        let water = MGCrossSections::new(vec![0.5], vec![0.1], vec![vec![0.4]]).unwrap();
        assert!(!water.fissile());
        assert_eq!(water.nu_Ef(0), 0.0);
        assert_eq!(water.chi(0), 0.0);
        let water = water.with_total(vec![0.7]).unwrap();
        assert_eq!(water.Et(0), 0.7);
        assert_eq!(water.Etr(0), 0.5);
    }

    #[test]
    fn test_invalid_data_rejected() {
        assert!(MGCrossSections::new(vec![], vec![], vec![]).is_err());
        assert!(MGCrossSections::new(vec![0.0], vec![0.1], vec![vec![0.4]]).is_err());
        assert!(MGCrossSections::new(vec![1.0, 1.0], vec![0.1], vec![vec![0.4]]).is_err());
        assert!(MGCrossSections::new(vec![1.0], vec![-0.1], vec![vec![0.4]]).is_err());
        assert!(MGCrossSections::new(vec![1.0], vec![0.1], vec![vec![0.4, 0.1]]).is_err());
        assert!(MGCrossSections::new(vec![f64::NAN], vec![0.1], vec![vec![0.4]]).is_err());
        // fission without a spectrum
        let err = MGCrossSections::new_fissile(
            vec![1.0],
            vec![0.1],
            vec![vec![0.8]],
            vec![0.05],
            vec![2.4],
            vec![],
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_scattering_above_transport_rejected() {
        // within-group scattering larger than Etr
        let err = MGCrossSections::new(vec![1.0], vec![0.0], vec![vec![1.9801]]).unwrap_err();
        assert!(err.is_configuration());
        // each term is fine but the row sum is not
        let err = MGCrossSections::new(
            vec![0.3, 1.0],
            vec![0.01, 0.1],
            vec![vec![0.25, 0.1], vec![0.0, 0.9]],
        )
        .unwrap_err();
        assert!(err.is_configuration());
        let json = r#"{ "Etr": [1.0], "Ea": [0.0], "Es_tr": [[1.5]] }"#;
        assert!(serde_json::from_str::<MGCrossSections>(json).is_err());
        // a pure scatterer is allowed
        assert!(MGCrossSections::new(vec![1.0], vec![0.0], vec![vec![1.0]]).is_ok());
    }

    #[test]
    fn test_json_forms() {
        let json = r#"{ "Etr": [0.5], "Ea": [0.1], "Es_tr": [[0.4]] }"#;
        let water: MGCrossSections = serde_json::from_str(json).unwrap();
        assert_eq!(water.Es_tr(0), 0.4);
        assert!(!water.fissile());

        let fuel = two_group_fuel();
        let text = serde_json::to_string(&fuel).unwrap();
        assert!(!text.contains("\"Et\""));
        let back: MGCrossSections = serde_json::from_str(&text).unwrap();
        assert_eq!(back, fuel);

        let bad = r#"{ "Etr": [0.5, 0.2], "Ea": [0.1], "Es_tr": [[0.4]] }"#;
        assert!(serde_json::from_str::<MGCrossSections>(bad).is_err());
    }
}
