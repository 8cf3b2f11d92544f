//! # Cylindrical flux solver
//!
//! Multigroup flux in a solved [`CylindricalCell`]. In every group the flux
//! responds to the isotropic source `q` (fission, scattering from the other
//! groups, external source) and to the current entering through the outer
//! surface:
//!
//! ```text
//! φ_i  = Σ_k X[g,i,k] q_k + Y[g,i] j_in
//! j_in = a (Σ_k V_k q_k - Σ_i Er_i V_i (Xq)_i) / (1 - a (1 - Γ_g))
//! ```
//!
//! where `a` is the albedo of the boundary: 1 reflects every neutron back
//! isotropically, 0 is a vacuum boundary.
//!
//! ## Iteration scheme
//! - outer power iteration on the fission source,
//!   `k_new = k_old · F_new / F_old` with `F = Σ_i V_i Σ_g νΣf φ`;
//! - inside each outer iteration, Gauss-Seidel sweeps over the groups (fast
//!   to thermal) until the flux changes by less than the flux tolerance,
//!   which also settles upscattering;
//! - converged when both `|Δk|/k` and the max relative flux change are below
//!   their tolerances. Eigenvalue fluxes are normalized to one fission
//!   neutron per unit height of the cell.
//!
//! With an external source the same loop runs with `k = 1`, which gives the
//! subcritical multiplication of fissile regions.
#![allow(non_snake_case)]
use super::cylindrical_cell::CylindricalCell;
use crate::CrossSections::{MGCrossSections, MGCrossSectionsData};
use crate::errors::{LatticeError, LatticeResult};
use crate::settings::{FluxSolverSettings, check_albedo, check_tolerance};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Array3, ArrayViewMut1, Axis};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CylindricalFluxSolver {
    cell: Arc<CylindricalCell>,
    settings: FluxSolverSettings,
    external_source: Option<Array2<f64>>,
    /// `[groups, regions]`
    flux: Array2<f64>,
    j_in: Array1<f64>,
    keff: f64,
    outer_iterations: usize,
    solved: bool,
}

/// max over all entries of `|new - old| / |new|`, zero entries skipped
fn max_relative_change(new: &Array2<f64>, old: &Array2<f64>) -> f64 {
    new.iter()
        .zip(old.iter())
        .filter(|(n, _)| **n != 0.0)
        .map(|(n, o)| ((n - o) / n).abs())
        .fold(0.0, f64::max)
}

impl CylindricalFluxSolver {
    pub fn new(cell: Arc<CylindricalCell>) -> LatticeResult<Self> {
        Self::with_settings(cell, FluxSolverSettings::default())
    }

    pub fn with_settings(
        cell: Arc<CylindricalCell>,
        settings: FluxSolverSettings,
    ) -> LatticeResult<Self> {
        if !cell.solved() {
            return Err(LatticeError::config(
                "The flux solver needs a solved cylindrical cell.",
            ));
        }
        settings.validate()?;
        let (ng, n) = (cell.ngroups(), cell.nregions());
        Ok(Self {
            cell,
            settings,
            external_source: None,
            flux: Array2::zeros((ng, n)),
            j_in: Array1::zeros(ng),
            keff: 1.0,
            outer_iterations: 0,
            solved: false,
        })
    }

    pub fn cell(&self) -> &Arc<CylindricalCell> {
        &self.cell
    }

    pub fn settings(&self) -> &FluxSolverSettings {
        &self.settings
    }

    pub fn keff_tolerance(&self) -> f64 {
        self.settings.keff_tolerance
    }

    pub fn flux_tolerance(&self) -> f64 {
        self.settings.flux_tolerance
    }

    pub fn albedo(&self) -> f64 {
        self.settings.albedo
    }

    pub fn max_outer_iterations(&self) -> usize {
        self.settings.max_outer_iterations
    }

    pub fn max_inner_iterations(&self) -> usize {
        self.settings.max_inner_iterations
    }

    pub fn set_keff_tolerance(&mut self, tolerance: f64) -> LatticeResult<()> {
        check_tolerance("keff", tolerance)?;
        self.settings.keff_tolerance = tolerance;
        self.solved = false;
        Ok(())
    }

    pub fn set_flux_tolerance(&mut self, tolerance: f64) -> LatticeResult<()> {
        check_tolerance("flux", tolerance)?;
        self.settings.flux_tolerance = tolerance;
        self.solved = false;
        Ok(())
    }

    pub fn set_albedo(&mut self, albedo: f64) -> LatticeResult<()> {
        check_albedo(albedo)?;
        self.settings.albedo = albedo;
        self.solved = false;
        Ok(())
    }

    pub fn set_max_outer_iterations(&mut self, iterations: usize) -> LatticeResult<()> {
        if iterations == 0 {
            return Err(LatticeError::config("max_outer_iterations must be >= 1."));
        }
        self.settings.max_outer_iterations = iterations;
        self.solved = false;
        Ok(())
    }

    pub fn set_max_inner_iterations(&mut self, iterations: usize) -> LatticeResult<()> {
        if iterations == 0 {
            return Err(LatticeError::config("max_inner_iterations must be >= 1."));
        }
        self.settings.max_inner_iterations = iterations;
        self.solved = false;
        Ok(())
    }

    /// Switches to fixed-source mode. `source` is the isotropic source
    /// density, shape `[groups, regions]`.
    pub fn set_external_source(&mut self, source: Array2<f64>) -> LatticeResult<()> {
        let expected = [self.cell.ngroups(), self.cell.nregions()];
        if source.shape() != &expected[..] {
            return Err(LatticeError::config(format!(
                "External source has shape {:?}, expected {:?}.",
                source.shape(),
                expected
            )));
        }
        if source.iter().any(|q| !q.is_finite() || *q < 0.0) {
            return Err(LatticeError::config(
                "External source must be finite and non-negative.",
            ));
        }
        if source.iter().all(|q| *q == 0.0) {
            warn!("External source is zero everywhere");
        }
        self.external_source = Some(source);
        self.solved = false;
        Ok(())
    }

    /// Back to eigenvalue mode.
    pub fn clear_external_source(&mut self) {
        self.external_source = None;
        self.solved = false;
    }

    pub fn fixed_source(&self) -> bool {
        self.external_source.is_some()
    }

    pub fn solve(&mut self) -> LatticeResult<()> {
        self.solved = false;
        let cell = Arc::clone(&self.cell);
        let (ng, n) = (cell.ngroups(), cell.nregions());
        let mats = cell.materials();
        let volumes = cell.volumes();
        let (Some(x), Some(y), Some(gamma)) = (cell.x_tensor(), cell.y_tensor(), cell.gamma())
        else {
            return Err(LatticeError::config(
                "The flux solver needs a solved cylindrical cell.",
            ));
        };

        let fissile = mats.iter().any(|m| m.fissile());
        let fixed = self.external_source.is_some();
        if !fissile && !fixed {
            return Err(LatticeError::config(
                "Eigenvalue problem without fissile material; set an external source.",
            ));
        }
        let albedo = self.settings.albedo;
        if !fixed && albedo == 0.0 {
            warn!("Albedo 0 in an eigenvalue calculation: all leaking neutrons are lost");
        }

        let mut denominators = Array1::<f64>::zeros(ng);
        for g in 0..ng {
            let d = 1.0 - albedo * (1.0 - gamma[g]);
            if !(d > 0.0) {
                return Err(LatticeError::numerical(
                    g,
                    "no removal in a reflected cell, the flux is unbounded",
                ));
            }
            denominators[g] = d;
        }

        let production = |flux: &Array2<f64>| -> f64 {
            (0..n)
                .map(|i| {
                    let rate: f64 = (0..ng).map(|g| mats[i].nu_Ef(g) * flux[[g, i]]).sum();
                    volumes[i] * rate
                })
                .sum()
        };

        info!(
            "Starting {} flux iteration, albedo {}",
            if fixed { "fixed-source" } else { "eigenvalue" },
            albedo
        );
        let mut flux = Array2::<f64>::ones((ng, n));
        let mut j_in = Array1::<f64>::zeros(ng);
        let mut k = 1.0;
        let mut keff_residual = f64::INFINITY;
        let mut flux_residual = f64::INFINITY;

        for outer in 1..=self.settings.max_outer_iterations {
            let old = flux.clone();
            let f_old = production(&old);
            let k_source = if fixed { 1.0 } else { k };
            let fission_density: Vec<f64> = (0..n)
                .map(|i| (0..ng).map(|g| mats[i].nu_Ef(g) * old[[g, i]]).sum::<f64>() / k_source)
                .collect();

            for inner in 0..self.settings.max_inner_iterations {
                let previous = flux.clone();
                for g in 0..ng {
                    let q: Array1<f64> = (0..n)
                        .map(|i| {
                            let m = &mats[i];
                            let mut q = m.chi(g) * fission_density[i];
                            for gp in (0..ng).filter(|gp| *gp != g) {
                                q += m.Es_tr_gg(gp, g) * flux[[gp, i]];
                            }
                            if let Some(source) = &self.external_source {
                                q += source[[g, i]];
                            }
                            q
                        })
                        .collect();
                    j_in[g] = group_flux(
                        g,
                        &q,
                        mats,
                        volumes,
                        x,
                        y,
                        albedo,
                        denominators[g],
                        flux.index_axis_mut(Axis(0), g),
                    );
                }
                let change = max_relative_change(&flux, &previous);
                if change < self.settings.flux_tolerance {
                    debug!("outer {}: inner sweeps converged after {}", outer, inner + 1);
                    break;
                }
            }

            if let Some(g) = flux
                .axis_iter(Axis(0))
                .position(|row| row.iter().any(|v| !v.is_finite()))
            {
                return Err(LatticeError::numerical(g, "non-finite flux in the iteration"));
            }

            if fixed {
                keff_residual = 0.0;
                flux_residual = max_relative_change(&flux, &old);
            } else {
                let f_new = production(&flux);
                if !(f_new > 0.0) {
                    return Err(LatticeError::breakdown(outer, "fission source vanished"));
                }
                let k_new = k * f_new / f_old;
                keff_residual = ((k_new - k) / k_new).abs();
                k = k_new;
                flux /= f_new;
                let old_normalized = old / f_old;
                flux_residual = max_relative_change(&flux, &old_normalized);
            }
            debug!(
                "outer {}: keff = {:.6}, dk/k = {:e}, dphi = {:e}",
                outer, k, keff_residual, flux_residual
            );

            self.outer_iterations = outer;
            if keff_residual < self.settings.keff_tolerance
                && flux_residual < self.settings.flux_tolerance
            {
                self.flux = flux;
                self.j_in = j_in;
                self.keff = k;
                self.solved = true;
                if fixed {
                    info!("Fixed-source flux converged in {} iterations", outer);
                } else {
                    info!("keff = {:.6} after {} outer iterations", k, outer);
                }
                return Ok(());
            }
        }

        self.flux = flux;
        self.j_in = j_in;
        self.keff = k;
        let err = LatticeError::ConvergenceFailure {
            iterations: self.outer_iterations,
            keff: k,
            keff_residual,
            flux_residual,
        };
        log::error!("{}", err);
        Err(err)
    }

    pub fn solved(&self) -> bool {
        self.solved
    }

    /// Multiplication factor; 1 in fixed-source mode.
    pub fn keff(&self) -> f64 {
        self.keff
    }

    pub fn outer_iterations(&self) -> usize {
        self.outer_iterations
    }

    /// Flux in region `i`, group `g`.
    pub fn flux(&self, i: usize, g: usize) -> Option<f64> {
        self.flux.get([g, i]).copied()
    }

    /// `[groups, regions]`
    pub fn flux_tensor(&self) -> &Array2<f64> {
        &self.flux
    }

    /// Volume-averaged flux of group `g` over the cell.
    pub fn avg_flux(&self, g: usize) -> Option<f64> {
        if g >= self.cell.ngroups() {
            return None;
        }
        let volumes = self.cell.volumes();
        let total: f64 = volumes.iter().sum();
        let weighted: f64 = volumes
            .iter()
            .zip(self.flux.index_axis(Axis(0), g))
            .map(|(v, f)| v * f)
            .sum();
        Some(weighted / total)
    }

    /// Current entering the cell in group `g`, per unit height.
    pub fn j_in(&self, g: usize) -> Option<f64> {
        self.j_in.get(g).copied()
    }

    /// Flux-volume weighted cross sections of the whole cell.
    pub fn homogenize(&self) -> LatticeResult<MGCrossSections> {
        let regions: Vec<usize> = (0..self.cell.nregions()).collect();
        self.homogenize_regions(&regions)
    }

    /// Flux-volume weighted cross sections of the listed regions.
    pub fn homogenize_regions(&self, regions: &[usize]) -> LatticeResult<MGCrossSections> {
        if !self.solved {
            return Err(LatticeError::config(
                "Homogenization needs a converged flux solution.",
            ));
        }
        if regions.is_empty() {
            return Err(LatticeError::config("No regions to homogenize."));
        }
        let n = self.cell.nregions();
        if let Some(r) = regions.iter().find(|r| **r >= n) {
            return Err(LatticeError::config(format!(
                "Region {} does not exist, the cell has {} regions.",
                r, n
            )));
        }

        let ng = self.cell.ngroups();
        let mats = self.cell.materials();
        let volumes = self.cell.volumes();

        // weights[g][r]: flux-volume, volume alone where a group has no flux
        let mut weights = Array2::<f64>::zeros((ng, regions.len()));
        for g in 0..ng {
            for (r, &i) in regions.iter().enumerate() {
                weights[[g, r]] = volumes[i] * self.flux[[g, i]];
            }
            if weights.row(g).sum() <= 0.0 {
                for (r, &i) in regions.iter().enumerate() {
                    weights[[g, r]] = volumes[i];
                }
            }
        }
        let average = |g: usize, value: &dyn Fn(&MGCrossSections) -> f64| -> f64 {
            let total: f64 = weights.row(g).sum();
            regions
                .iter()
                .enumerate()
                .map(|(r, &i)| weights[[g, r]] * value(mats[i].as_ref()))
                .sum::<f64>()
                / total
        };

        let per_group = |value: &dyn Fn(&MGCrossSections, usize) -> f64| -> Vec<f64> {
            (0..ng).map(|g| average(g, &|m: &MGCrossSections| value(m, g))).collect()
        };
        let Etr = per_group(&MGCrossSections::Etr);
        let Et = per_group(&MGCrossSections::Et);
        let Ea = per_group(&MGCrossSections::Ea);
        let Ef = per_group(&MGCrossSections::Ef);
        let nu_Ef = per_group(&MGCrossSections::nu_Ef);
        let Es_tr: Vec<Vec<f64>> = (0..ng)
            .map(|gin| {
                (0..ng)
                    .map(|gout| average(gin, &|m: &MGCrossSections| m.Es_tr_gg(gin, gout)))
                    .collect()
            })
            .collect();

        let fissile = Ef.iter().any(|f| *f > 0.0);
        let mut data = MGCrossSectionsData {
            Etr,
            Et,
            Ea,
            Es_tr,
            ..Default::default()
        };
        if fissile {
            data.nu = nu_Ef
                .iter()
                .zip(&Ef)
                .map(|(nf, f)| if *f > 0.0 { nf / f } else { 0.0 })
                .collect();
            // spectrum weighted by the fission production of each region
            let mut chi = vec![0.0; ng];
            let mut total = 0.0;
            for &i in regions {
                let m = &mats[i];
                let rate: f64 =
                    volumes[i] * (0..ng).map(|g| m.nu_Ef(g) * self.flux[[g, i]]).sum::<f64>();
                for (g, c) in chi.iter_mut().enumerate() {
                    *c += rate * m.chi(g);
                }
                total += rate;
            }
            if total > 0.0 {
                chi.iter_mut().for_each(|c| *c /= total);
            } else {
                chi = regions
                    .iter()
                    .map(|&i| &mats[i])
                    .find(|m| m.fissile())
                    .map(|m| (0..ng).map(|g| m.chi(g)).collect())
                    .unwrap_or_else(|| vec![0.0; ng]);
            }
            data.chi = chi;
            data.Ef = Ef;
        }
        info!("Homogenized regions {:?}", regions);
        MGCrossSections::try_from(data)
    }
}

/// Flux of group `g` for the source `q`; returns the entering current.
#[allow(clippy::too_many_arguments)]
fn group_flux(
    g: usize,
    q: &Array1<f64>,
    mats: &[Arc<MGCrossSections>],
    volumes: &[f64],
    x: &Array3<f64>,
    y: &Array2<f64>,
    albedo: f64,
    denominator: f64,
    mut flux_g: ArrayViewMut1<f64>,
) -> f64 {
    let x_g = x.index_axis(Axis(0), g);
    let xq = x_g.dot(q);

    let source: f64 = volumes.iter().zip(q.iter()).map(|(v, q)| v * q).sum();
    let removed: f64 = (0..volumes.len())
        .map(|i| mats[i].Er_tr(g) * volumes[i] * xq[i])
        .sum();
    let j_in = albedo * (source - removed) / denominator;

    for (i, f) in flux_g.iter_mut().enumerate() {
        *f = xq[i] + y[[g, i]] * j_in;
    }
    j_in
}
