//! # Cylindrical cell
//!
//! [`CylindricalCell`] holds the geometry and the materials of an annular
//! cell and computes, group by group, the collision-probability tensor `P`,
//! the transfer tensor `X`, the escape vector `Y` and the blackness `Gamma`.
//!
//! ```rust, no_run
//! use LatticeCP::CollisionProbability::cylindrical_cell::CylindricalCell;
//! use LatticeCP::CrossSections::MGCrossSections;
//! use std::sync::Arc;
//!
//! let water = Arc::new(MGCrossSections::new(vec![0.5], vec![0.1], vec![vec![0.4]]).unwrap());
//! let mut cell = CylindricalCell::new(vec![0.4, 0.7], vec![water.clone(), water]).unwrap();
//! cell.solve().unwrap();
//! println!("Gamma = {:?}", cell.Gamma(0));
//! ```
#![allow(non_snake_case)]
use crate::CrossSections::MGCrossSections;
use crate::Utils::quadrature::Quadrature;
use crate::Utils::special_functions::Ki3;
use crate::errors::{LatticeError, LatticeResult};
use crate::settings::QuadratureSettings;
use log::{debug, info};
use nalgebra::linalg::QR;
use nalgebra::{DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};
use std::f64::consts::PI;
use std::sync::Arc;

/// Smallest accepted ratio of the extreme pivots of the QR factor.
const MIN_PIVOT_RATIO: f64 = 1e-12;
const GAMMA_SLACK: f64 = 1e-6;

/// QR factor of a per-group system `M`. A matrix whose smallest pivot is
/// below `MIN_PIVOT_RATIO` times the largest one is treated as singular.
pub(crate) fn factor_system(g: usize, m: DMatrix<f64>) -> LatticeResult<QR<f64, Dyn, Dyn>> {
    let qr = m.qr();
    let pivots = qr.r().diagonal();
    let (min, max) = (pivots.amin(), pivots.amax());
    if !(min > MIN_PIVOT_RATIO * max) {
        return Err(LatticeError::numerical(
            g,
            format!(
                "collision-probability system is singular or ill-conditioned (pivot ratio {:e})",
                min / max
            ),
        ));
    }
    Ok(qr)
}

/// Results of a successful [`CylindricalCell::solve`].
#[derive(Debug, Clone)]
struct CellSolution {
    p: Array3<f64>,
    x: Array3<f64>,
    y: Array2<f64>,
    gamma: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct CylindricalCell {
    radii: Vec<f64>,
    volumes: Vec<f64>,
    mats: Vec<Arc<MGCrossSections>>,
    ngroups: usize,
    quadrature: Quadrature,
    solution: Option<CellSolution>,
}

impl CylindricalCell {
    /// Builds a cell from the outer radii of its regions, innermost first,
    /// and one material per region.
    pub fn new(radii: Vec<f64>, mats: Vec<Arc<MGCrossSections>>) -> LatticeResult<Self> {
        if radii.len() != mats.len() {
            return Err(LatticeError::config(format!(
                "Got {} radii but {} materials.",
                radii.len(),
                mats.len()
            )));
        }
        if radii.len() < 2 {
            return Err(LatticeError::config(
                "A cylindrical cell needs at least 2 regions.",
            ));
        }
        if let Some(r) = radii.iter().find(|r| !r.is_finite()) {
            return Err(LatticeError::config(format!("Radius {} is not finite.", r)));
        }
        if radii[0] <= 0.0 {
            return Err(LatticeError::config(format!(
                "Innermost radius {} must be > 0.",
                radii[0]
            )));
        }
        if let Some(w) = radii.windows(2).find(|w| w[1] <= w[0]) {
            return Err(LatticeError::config(format!(
                "Radii must be strictly increasing, found {} after {}.",
                w[1], w[0]
            )));
        }

        let ngroups = mats[0].ngroups();
        if ngroups == 0 {
            return Err(LatticeError::config("Materials have no energy groups."));
        }
        if let Some(i) = mats.iter().position(|m| m.ngroups() != ngroups) {
            return Err(LatticeError::config(format!(
                "Material of region {} has {} groups, region 0 has {}.",
                i,
                mats[i].ngroups(),
                ngroups
            )));
        }

        let volumes = radii
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let inner = if i == 0 { 0.0 } else { radii[i - 1] };
                PI * (r * r - inner * inner)
            })
            .collect();

        info!(
            "Cylindrical cell with {} regions and {} groups, outer radius {}",
            radii.len(),
            ngroups,
            radii[radii.len() - 1]
        );
        Ok(Self {
            radii,
            volumes,
            mats,
            ngroups,
            quadrature: Quadrature::default(),
            solution: None,
        })
    }

    /// Same as [`CylindricalCell::new`] but accepts missing materials, which
    /// are reported as configuration errors.
    pub fn from_optional(
        radii: Vec<f64>,
        mats: Vec<Option<Arc<MGCrossSections>>>,
    ) -> LatticeResult<Self> {
        if let Some(i) = mats.iter().position(|m| m.is_none()) {
            return Err(LatticeError::config(format!(
                "Region {} has no material.",
                i
            )));
        }
        Self::new(radii, mats.into_iter().flatten().collect())
    }

    /// Changes the quadrature of the chord integrals. The cell has to be
    /// solved again afterwards.
    pub fn set_quadrature_settings(&mut self, settings: QuadratureSettings) -> LatticeResult<()> {
        settings.validate()?;
        self.quadrature = Quadrature::new(settings);
        self.solution = None;
        Ok(())
    }

    pub fn quadrature_settings(&self) -> &QuadratureSettings {
        self.quadrature.settings()
    }

    /// Computes `P`, `X`, `Y` and `Gamma` for every group. Any previous
    /// results are discarded first, so after an error the cell is unsolved.
    pub fn solve(&mut self) -> LatticeResult<()> {
        self.solution = None;
        let n = self.nregions();
        let ng = self.ngroups;

        info!("Computing collision probabilities");
        let mut p = Array3::<f64>::zeros((ng, n, n));
        for (g, p_g) in p.axis_iter_mut(Axis(0)).enumerate() {
            self.collision_probabilities(g, p_g)?;
        }

        info!("Solving the transfer and escape systems");
        let mut x = Array3::<f64>::zeros((ng, n, n));
        let mut y = Array2::<f64>::zeros((ng, n));
        let mut gamma = Array1::<f64>::zeros(ng);
        for (g, (x_g, y_g)) in x
            .axis_iter_mut(Axis(0))
            .zip(y.axis_iter_mut(Axis(0)))
            .enumerate()
        {
            gamma[g] = self.linear_systems(g, p.index_axis(Axis(0), g), x_g, y_g)?;
        }

        debug!("Gamma = {:?}", gamma);
        self.solution = Some(CellSolution { p, x, y, gamma });
        info!("Cylindrical cell solved");
        Ok(())
    }

    /// `S_ij` of group `g` for `i <= j`, summed over the shells `k <= i`.
    fn s_ij(&self, g: usize, i: usize, j: usize, etr: &[f64]) -> LatticeResult<f64> {
        let mut total = 0.0;
        for k in 0..=i {
            let r_max = self.radii[k];
            let r_min = if k == 0 { 0.0 } else { self.radii[k - 1] };
            let width = r_max - r_min;

            // y = r_max - width * w^2 spreads the nodes towards the rim of the shell
            let mut integrand = |w: f64| {
                let y = r_max - width * w * w;
                let y2 = y * y;
                let mut tau_plus = 0.0;
                let mut tau_minus = 0.0;
                let mut x_prev = 0.0;
                for r in k..=j {
                    let x = (self.radii[r] * self.radii[r] - y2).max(0.0).sqrt();
                    let dtau = (x - x_prev) * etr[r];
                    x_prev = x;
                    if r <= i {
                        tau_plus += 2.0 * dtau;
                    } else {
                        tau_plus += dtau;
                        tau_minus += dtau;
                    }
                }
                2.0 * width * w * (Ki3(tau_plus) - Ki3(tau_minus))
            };

            let result = self.quadrature.integrate(&mut integrand, 0.0, 1.0);
            if !result.converged {
                return Err(LatticeError::numerical(
                    g,
                    format!(
                        "chord integral S[{}][{}] over shell {} did not converge, error estimate {:e}",
                        i, j, k, result.error
                    ),
                ));
            }
            if !result.value.is_finite() {
                return Err(LatticeError::numerical(
                    g,
                    format!("chord integral S[{}][{}] is not finite", i, j),
                ));
            }
            total += result.value;
        }
        Ok(total)
    }

    fn collision_probabilities(&self, g: usize, mut p_g: ArrayViewMut2<f64>) -> LatticeResult<()> {
        let n = self.nregions();
        let etr: Vec<f64> = self.mats.iter().map(|m| m.Etr(g)).collect();

        let mut s = Array2::<f64>::zeros((n, n));
        for j in 0..n {
            for i in 0..=j {
                let value = self.s_ij(g, i, j, &etr)?;
                s[[i, j]] = value;
                s[[j, i]] = value;
            }
        }

        for j in 0..n {
            for i in 0..=j {
                let mut value = 2.0 * s[[i, j]];
                if i > 0 && j > 0 {
                    value += 2.0 * s[[i - 1, j - 1]];
                }
                if i > 0 {
                    value -= 2.0 * s[[i - 1, j]];
                }
                if j > 0 {
                    value -= 2.0 * s[[i, j - 1]];
                }
                if i == j {
                    value += self.volumes[i] * etr[i];
                }
                p_g[[i, j]] = value;
                p_g[[j, i]] = value;
            }
        }
        debug!("group {}: P diagonal = {:?}", g, p_g.diag());
        Ok(())
    }

    /// Fills `X` and `Y` of group `g` and returns `Gamma`.
    fn linear_systems(
        &self,
        g: usize,
        p_g: ArrayView2<f64>,
        mut x_g: ArrayViewMut2<f64>,
        mut y_g: ArrayViewMut1<f64>,
    ) -> LatticeResult<f64> {
        let n = self.nregions();
        let etr: Vec<f64> = self.mats.iter().map(|m| m.Etr(g)).collect();

        let m = DMatrix::from_fn(n, n, |i, j| {
            let c_j = self.mats[j].Es_tr(g) / etr[j];
            let diagonal = if i == j { etr[i] * self.volumes[i] } else { 0.0 };
            diagonal - c_j * p_g[[j, i]]
        });
        let qr = factor_system(g, m)?;

        let b_x = DMatrix::from_fn(n, n, |i, k| p_g[[k, i]] / etr[k]);
        let surface = self.S();
        let b_y = DVector::from_fn(n, |i, _| {
            let collided: f64 = p_g.row(i).sum();
            4.0 / surface * (etr[i] * self.volumes[i] - collided)
        });

        let (Some(x), Some(y)) = (qr.solve(&b_x), qr.solve(&b_y)) else {
            return Err(LatticeError::numerical(
                g,
                "collision-probability system could not be solved",
            ));
        };
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(LatticeError::numerical(
                g,
                "non-finite transfer or escape probabilities",
            ));
        }

        for i in 0..n {
            for k in 0..n {
                x_g[[i, k]] = x[(i, k)];
            }
            y_g[i] = y[i];
        }

        let gamma: f64 = (0..n)
            .map(|i| self.mats[i].Er_tr(g) * self.volumes[i] * y[i])
            .sum();
        if !(-GAMMA_SLACK..=1.0 + GAMMA_SLACK).contains(&gamma) {
            return Err(LatticeError::numerical(
                g,
                format!("blackness {} outside [0, 1]", gamma),
            ));
        }
        Ok(gamma)
    }

    pub fn ngroups(&self) -> usize {
        self.ngroups
    }

    pub fn nregions(&self) -> usize {
        self.radii.len()
    }

    pub fn radius(&self, i: usize) -> Option<f64> {
        self.radii.get(i).copied()
    }

    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    pub fn volume(&self, i: usize) -> Option<f64> {
        self.volumes.get(i).copied()
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    pub fn xs(&self, i: usize) -> Option<&Arc<MGCrossSections>> {
        self.mats.get(i)
    }

    pub fn materials(&self) -> &[Arc<MGCrossSections>] {
        &self.mats
    }

    /// outer surface per unit height
    pub fn S(&self) -> f64 {
        2.0 * PI * self.radii[self.radii.len() - 1]
    }

    pub fn solved(&self) -> bool {
        self.solution.is_some()
    }

    pub fn p(&self, g: usize, i: usize, j: usize) -> Option<f64> {
        self.solution.as_ref()?.p.get([g, i, j]).copied()
    }

    pub fn X(&self, g: usize, i: usize, k: usize) -> Option<f64> {
        self.solution.as_ref()?.x.get([g, i, k]).copied()
    }

    pub fn Y(&self, g: usize, i: usize) -> Option<f64> {
        self.solution.as_ref()?.y.get([g, i]).copied()
    }

    pub fn Gamma(&self, g: usize) -> Option<f64> {
        self.solution.as_ref()?.gamma.get(g).copied()
    }

    pub fn p_tensor(&self) -> Option<&Array3<f64>> {
        self.solution.as_ref().map(|s| &s.p)
    }

    pub fn x_tensor(&self) -> Option<&Array3<f64>> {
        self.solution.as_ref().map(|s| &s.x)
    }

    pub fn y_tensor(&self) -> Option<&Array2<f64>> {
        self.solution.as_ref().map(|s| &s.y)
    }

    pub fn gamma(&self) -> Option<&Array1<f64>> {
        self.solution.as_ref().map(|s| &s.gamma)
    }

    /// Probability that a neutron born in region `i` leaves the cell
    /// without colliding.
    pub fn escape_probability(&self, g: usize, i: usize) -> Option<f64> {
        let p = &self.solution.as_ref()?.p;
        if g >= self.ngroups || i >= self.nregions() {
            return None;
        }
        let collided: f64 = p.index_axis(Axis(0), g).row(i).sum();
        let born = self.volumes[i] * self.mats[i].Etr(g);
        Some(1.0 - collided / born)
    }
}
