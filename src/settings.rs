//! # Settings Module
//!
//! ## Purpose
//! Collects every numerical knob of the crate in serializable structs so that a
//! calculation can be reproduced from a JSON file. The cell solver reads
//! [`QuadratureSettings`], the flux solver reads [`FluxSolverSettings`], and
//! [`SolverConfig`] bundles both for task files.
//!
//! ## Configuration Format
//! ```json
//! {
//!   "quadrature": {
//!     "rule": "G7K15",
//!     "adaptive": true,
//!     "abs_tolerance": 1e-11,
//!     "rel_tolerance": 1e-9,
//!     "max_subdivisions": 2000
//!   },
//!   "flux": {
//!     "keff_tolerance": 1e-5,
//!     "flux_tolerance": 1e-5,
//!     "max_outer_iterations": 1000,
//!     "max_inner_iterations": 100,
//!     "albedo": 1.0
//!   }
//! }
//! ```
//! Missing fields fall back to their defaults.
//!
//! ## Usage Pattern
//! ```rust
//! use LatticeCP::settings::SolverConfig;
//!
//! let mut config = SolverConfig::default();
//! config.flux.keff_tolerance = 1e-6;
//! assert!(config.validate().is_ok());
//! ```
use crate::errors::{LatticeError, LatticeResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Gauss-Kronrod rule used for the chord integrals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QuadratureRuleKind {
    #[default]
    G7K15,
    G10K21,
    G15K31,
}

/// Settings of the quadrature used for the collision-probability integrals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadratureSettings {
    pub rule: QuadratureRuleKind,
    /// bisect sub-intervals until the tolerance is met; otherwise one rule
    /// application per annular shell
    pub adaptive: bool,
    pub abs_tolerance: f64,
    pub rel_tolerance: f64,
    pub max_subdivisions: usize,
}

impl Default for QuadratureSettings {
    fn default() -> Self {
        Self {
            rule: QuadratureRuleKind::G7K15,
            adaptive: true,
            abs_tolerance: 1e-11,
            rel_tolerance: 1e-9,
            max_subdivisions: 2000,
        }
    }
}

impl QuadratureSettings {
    pub fn validate(&self) -> LatticeResult<()> {
        if !(self.abs_tolerance > 0.0) || !(self.rel_tolerance > 0.0) {
            return Err(LatticeError::config(
                "Quadrature tolerances must be > 0.",
            ));
        }
        if self.adaptive && self.max_subdivisions == 0 {
            return Err(LatticeError::config(
                "Adaptive quadrature needs max_subdivisions > 0.",
            ));
        }
        Ok(())
    }
}

/// Settings of the multigroup flux iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxSolverSettings {
    /// relative change of keff between outer iterations
    pub keff_tolerance: f64,
    /// max relative change of any region flux between outer iterations
    pub flux_tolerance: f64,
    pub max_outer_iterations: usize,
    /// Gauss-Seidel sweeps over the groups per outer iteration
    pub max_inner_iterations: usize,
    /// fraction of the outgoing current returned isotropically, in [0, 1]
    pub albedo: f64,
}

impl Default for FluxSolverSettings {
    fn default() -> Self {
        Self {
            keff_tolerance: 1e-5,
            flux_tolerance: 1e-5,
            max_outer_iterations: 1000,
            max_inner_iterations: 100,
            albedo: 1.0,
        }
    }
}

impl FluxSolverSettings {
    pub fn validate(&self) -> LatticeResult<()> {
        check_tolerance("keff", self.keff_tolerance)?;
        check_tolerance("flux", self.flux_tolerance)?;
        check_albedo(self.albedo)?;
        if self.max_outer_iterations == 0 || self.max_inner_iterations == 0 {
            return Err(LatticeError::config(
                "Iteration limits must be at least 1.",
            ));
        }
        Ok(())
    }
}

pub(crate) fn check_tolerance(name: &str, tol: f64) -> LatticeResult<()> {
    if !(tol > 0.0) {
        return Err(LatticeError::config(format!(
            "The {} tolerance must be > 0.",
            name
        )));
    }
    if tol >= 0.1 {
        return Err(LatticeError::config(format!(
            "The {} tolerance must be < 0.1.",
            name
        )));
    }
    Ok(())
}

pub(crate) fn check_albedo(albedo: f64) -> LatticeResult<()> {
    if !(0.0..=1.0).contains(&albedo) {
        return Err(LatticeError::config(format!(
            "Albedo {} is invalid. Must be in range [0, 1].",
            albedo
        )));
    }
    Ok(())
}

/// Complete solver configuration as stored in task and config files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SolverConfig {
    pub quadrature: QuadratureSettings,
    pub flux: FluxSolverSettings,
}

impl SolverConfig {
    pub fn validate(&self) -> LatticeResult<()> {
        self.quadrature.validate()?;
        self.flux.validate()
    }

    /// Reads and validates a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> LatticeResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: SolverConfig = serde_json::from_str(&content)?;
        config.validate()?;
        info!("Loaded solver configuration from '{}'", path.as_ref().display());
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> LatticeResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        info!("Saved solver configuration to '{}'", path.as_ref().display());
        Ok(())
    }
}
