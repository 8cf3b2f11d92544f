//! # Task Parser
//!
//! ## Purpose
//! Describes a complete cell calculation in one JSON document: the materials,
//! the annular regions, the solver settings and, optionally, an external
//! source. [`CellTask::run`] builds and solves the cell, runs the flux solver
//! and collects the results in a [`CellReport`].
//!
//! ## Task Format
//! ```json
//! {
//!   "name": "pin cell",
//!   "materials": {
//!     "fuel":  { "Etr": [0.5], "Ea": [0.1], "Es_tr": [[0.4]],
//!                "Ef": [0.05], "nu": [2.5], "chi": [1.0] },
//!     "water": { "Etr": [0.6], "Ea": [0.01], "Es_tr": [[0.59]] }
//!   },
//!   "regions": [
//!     { "radius": 0.41, "material": "fuel" },
//!     { "radius": 0.71, "material": "water" }
//!   ],
//!   "config": { "flux": { "keff_tolerance": 1e-6 } },
//!   "homogenize": true
//! }
//! ```
//! `config` falls back to [`SolverConfig::default`]. `external_source`, when
//! present, is indexed `[group][region]` and switches the flux solver to
//! fixed-source mode.
//!
//! ## Main Methods
//! - **`from_file()`** / **`parse()`**: read and check a task
//! - **`build_cell()`**: radii and shared materials to an unsolved [`CylindricalCell`]
//! - **`run()`**: cell, flux and homogenization in one call
//! - **`uo2_pin_cell()`**: built-in 7-group UO2 pin in light water
use crate::CollisionProbability::cylindrical_cell::CylindricalCell;
use crate::CollisionProbability::cylindrical_flux_solver::CylindricalFluxSolver;
use crate::CrossSections::{MGCrossSections, MGCrossSectionsData};
use crate::errors::{LatticeError, LatticeResult};
use crate::settings::SolverConfig;
use log::info;
use ndarray::Array2;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// outer radius, cm
    pub radius: f64,
    pub material: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTask {
    pub name: String,
    pub materials: BTreeMap<String, MGCrossSections>,
    pub regions: Vec<RegionSpec>,
    #[serde(default)]
    pub config: SolverConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_source: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub homogenize: bool,
}

/// Results of [`CellTask::run`].
#[derive(Debug, Clone, Serialize)]
pub struct CellReport {
    pub name: String,
    /// `None` in fixed-source mode
    pub keff: Option<f64>,
    pub outer_iterations: usize,
    pub radii: Vec<f64>,
    pub materials: Vec<String>,
    pub volumes: Vec<f64>,
    /// `[group][region]`
    pub flux: Vec<Vec<f64>>,
    pub avg_flux: Vec<f64>,
    pub gamma: Vec<f64>,
    pub j_in: Vec<f64>,
    pub homogenized: Option<MGCrossSections>,
}

impl CellTask {
    /// Parses a task from a JSON string and checks its settings.
    pub fn parse(content: &str) -> LatticeResult<Self> {
        let task: CellTask = serde_json::from_str(content)?;
        task.config.validate()?;
        Ok(task)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> LatticeResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let task = Self::parse(&content)?;
        info!(
            "Loaded task '{}' with {} regions from '{}'",
            task.name,
            task.regions.len(),
            path.as_ref().display()
        );
        Ok(task)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> LatticeResult<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        info!("Saved task '{}' to '{}'", self.name, path.as_ref().display());
        Ok(())
    }

    /// Unsolved cell with the task's quadrature settings. Regions naming the
    /// same material share one `Arc`.
    pub fn build_cell(&self) -> LatticeResult<CylindricalCell> {
        let shared: HashMap<&str, Arc<MGCrossSections>> = self
            .materials
            .iter()
            .map(|(name, xs)| (name.as_str(), Arc::new(xs.clone())))
            .collect();

        let mut mats = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            match shared.get(region.material.as_str()) {
                Some(xs) => mats.push(Some(xs.clone())),
                None => {
                    return Err(LatticeError::config(format!(
                        "Unknown material '{}' in task '{}'.",
                        region.material, self.name
                    )));
                }
            }
        }
        let radii = self.regions.iter().map(|r| r.radius).collect();

        let mut cell = CylindricalCell::from_optional(radii, mats)?;
        cell.set_quadrature_settings(self.config.quadrature)?;
        Ok(cell)
    }

    fn source_array(&self, ngroups: usize, nregions: usize) -> LatticeResult<Option<Array2<f64>>> {
        let Some(source) = &self.external_source else {
            return Ok(None);
        };
        if source.len() != ngroups || source.iter().any(|row| row.len() != nregions) {
            return Err(LatticeError::config(format!(
                "External source must have {} groups of {} regions.",
                ngroups, nregions
            )));
        }
        Ok(Some(Array2::from_shape_fn((ngroups, nregions), |(g, i)| {
            source[g][i]
        })))
    }

    pub fn run(&self) -> LatticeResult<CellReport> {
        info!("Running task '{}'", self.name);
        self.config.validate()?;
        let mut cell = self.build_cell()?;
        cell.solve()?;
        let cell = Arc::new(cell);

        let mut solver = CylindricalFluxSolver::with_settings(cell.clone(), self.config.flux)?;
        if let Some(source) = self.source_array(cell.ngroups(), cell.nregions())? {
            solver.set_external_source(source)?;
        }
        solver.solve()?;

        let homogenized = if self.homogenize {
            Some(solver.homogenize()?)
        } else {
            None
        };
        let ng = cell.ngroups();
        Ok(CellReport {
            name: self.name.clone(),
            keff: if solver.fixed_source() { None } else { Some(solver.keff()) },
            outer_iterations: solver.outer_iterations(),
            radii: cell.radii().to_vec(),
            materials: self.regions.iter().map(|r| r.material.clone()).collect(),
            volumes: cell.volumes().to_vec(),
            flux: solver.flux_tensor().outer_iter().map(|row| row.to_vec()).collect(),
            avg_flux: (0..ng).filter_map(|g| solver.avg_flux(g)).collect(),
            gamma: cell.gamma().map(|g| g.to_vec()).unwrap_or_default(),
            j_in: (0..ng).filter_map(|g| solver.j_in(g)).collect(),
            homogenized,
        })
    }

    /// 7-group UO2 pin in light water, square pitch 1.26 cm turned into an
    /// equal-area cylinder.
    pub fn uo2_pin_cell() -> LatticeResult<Self> {
        let split = |flat: &[f64]| -> Vec<Vec<f64>> { flat.chunks(7).map(|c| c.to_vec()).collect() };

        #[rustfmt::skip]
        let uo2_scattering = [
            1.27537E-01, 4.23780E-02, 9.43740E-06, 5.51630E-09, 0.0, 0.0, 0.0,
            0.0, 3.24456E-01, 1.63140E-03, 3.14270E-09, 0.0, 0.0, 0.0,
            0.0, 0.0, 4.50940E-01, 2.67920E-03, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 4.52565E-01, 5.56640E-03, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.25250E-04, 2.71401E-01, 1.02550E-02, 1.00210E-08,
            0.0, 0.0, 0.0, 0.0, 1.29680E-03, 2.65802E-01, 1.68090E-02,
            0.0, 0.0, 0.0, 0.0, 0.0, 8.54580E-03, 2.73080E-01,
        ];
        #[rustfmt::skip]
        let h2o_scattering = [
            4.44777E-02, 1.13400E-01, 7.23470E-04, 3.74990E-06, 5.31840E-08, 0.0, 0.0,
            0.0, 2.82334E-01, 1.29940E-01, 6.23400E-04, 4.80020E-05, 7.44860E-06, 1.04550E-06,
            0.0, 0.0, 3.45256E-01, 2.24570E-01, 1.69990E-02, 2.64430E-03, 5.03440E-04,
            0.0, 0.0, 0.0, 9.10284E-02, 4.15510E-01, 6.37320E-02, 1.21390E-02,
            0.0, 0.0, 0.0, 7.14370E-05, 1.39138E-01, 5.11820E-01, 6.12290E-02,
            0.0, 0.0, 0.0, 0.0, 2.21570E-03, 6.99913E-01, 5.37320E-01,
            0.0, 0.0, 0.0, 0.0, 0.0, 1.32440E-01, 2.48070E+00,
        ];

        let uo2 = MGCrossSectionsData {
            Etr: vec![1.77949E-01, 3.29805E-01, 4.80388E-01, 5.54367E-01, 3.11801E-01, 3.95168E-01, 5.64406E-01],
            Ea: vec![8.02480E-03, 3.71740E-03, 2.67690E-02, 9.62360E-02, 3.00200E-02, 1.11260E-01, 2.82780E-01],
            Ef: vec![7.21206E-03, 8.19301E-04, 6.45320E-03, 1.85648E-02, 1.78084E-02, 8.30348E-02, 2.16004E-01],
            nu: vec![2.78145, 2.47443, 2.43383, 2.43380, 2.43380, 2.43380, 2.43380],
            chi: vec![5.87910E-01, 4.11760E-01, 3.39060E-04, 1.17610E-07, 0.0, 0.0, 0.0],
            Es_tr: split(&uo2_scattering),
            ..Default::default()
        };
        let h2o = MGCrossSectionsData {
            Etr: vec![1.59206E-01, 4.12970E-01, 5.90310E-01, 5.84350E-01, 7.18000E-01, 1.25445E+00, 2.65038E+00],
            Ea: vec![6.01050E-04, 1.57930E-05, 3.37160E-04, 1.94060E-03, 5.74160E-03, 1.50010E-02, 3.72390E-02],
            Es_tr: split(&h2o_scattering),
            ..Default::default()
        };

        let mut materials = BTreeMap::new();
        materials.insert("UO2".to_string(), MGCrossSections::try_from(uo2)?);
        materials.insert("H2O".to_string(), MGCrossSections::try_from(h2o)?);

        let radii = [0.1, 0.2, 0.3, 0.4, 0.45, 0.5, 0.54, 0.58, 0.61, 0.65, 1.26 / PI.sqrt()];
        let regions = radii
            .iter()
            .enumerate()
            .map(|(i, r)| RegionSpec {
                radius: *r,
                material: if i < 7 { "UO2" } else { "H2O" }.to_string(),
            })
            .collect();

        Ok(CellTask {
            name: "UO2 pin cell, 7 groups".to_string(),
            materials,
            regions,
            config: SolverConfig::default(),
            external_source: None,
            homogenize: true,
        })
    }
}

impl CellReport {
    pub fn print(&self) {
        println!("Task: {}", self.name);
        match self.keff {
            Some(k) => println!("keff = {:.6} ({} outer iterations)", k, self.outer_iterations),
            None => println!("fixed-source solution ({} outer iterations)", self.outer_iterations),
        }

        let mut regions = Table::new();
        let mut header = row!["Region", "Radius", "Material", "Volume"];
        for g in 0..self.flux.len() {
            header.add_cell(prettytable::Cell::new(&format!("phi_{}", g + 1)));
        }
        regions.add_row(header);
        for (i, radius) in self.radii.iter().enumerate() {
            let mut r = row![i, format!("{:.4}", radius), self.materials[i], format!("{:.5}", self.volumes[i])];
            for group in &self.flux {
                r.add_cell(prettytable::Cell::new(&format!("{:.5e}", group[i])));
            }
            regions.add_row(r);
        }
        regions.printstd();

        let mut groups = Table::new();
        groups.add_row(row!["Group", "Avg flux", "Gamma", "j_in"]);
        for g in 0..self.gamma.len() {
            groups.add_row(row![
                g + 1,
                format!("{:.5e}", self.avg_flux.get(g).copied().unwrap_or(f64::NAN)),
                format!("{:.5}", self.gamma[g]),
                format!("{:.5e}", self.j_in.get(g).copied().unwrap_or(f64::NAN))
            ]);
        }
        groups.printstd();

        if let Some(xs) = &self.homogenized {
            let mut hom = Table::new();
            hom.add_row(row!["Group", "Etr", "Ea", "nu*Ef", "chi"]);
            for g in 0..xs.ngroups() {
                hom.add_row(row![
                    g + 1,
                    format!("{:.5e}", xs.Etr(g)),
                    format!("{:.5e}", xs.Ea(g)),
                    format!("{:.5e}", xs.nu_Ef(g)),
                    format!("{:.5e}", xs.chi(g))
                ]);
            }
            println!("Homogenized cross sections");
            hom.printstd();
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> LatticeResult<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        info!("Saved report to '{}'", path.as_ref().display());
        Ok(())
    }
}
