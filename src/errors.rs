//! # Error types
//!
//! One error enum is shared by every solver of the crate. Construction checks
//! produce [`LatticeError::Configuration`], failures inside the numerical
//! kernels produce [`LatticeError::Numerical`], or [`LatticeError::Breakdown`]
//! when no single group is at fault, and the flux iteration reports
//! [`LatticeError::ConvergenceFailure`] when it runs out of outer iterations.
//! I/O and JSON errors only come from the settings and task files.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Numerical error in group {group}: {message}")]
    Numerical { group: usize, message: String },

    #[error("Breakdown in outer iteration {iteration}: {message}")]
    Breakdown { iteration: usize, message: String },

    #[error(
        "No convergence after {iterations} outer iterations: keff = {keff}, keff residual = {keff_residual:e}, flux residual = {flux_residual:e}"
    )]
    ConvergenceFailure {
        iterations: usize,
        keff: f64,
        keff_residual: f64,
        flux_residual: f64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LatticeResult<T> = Result<T, LatticeError>;

impl LatticeError {
    /// Builds a configuration error and logs it where it was detected.
    pub fn config(message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("{}", message);
        LatticeError::Configuration(message)
    }

    /// Builds a numerical error for energy group `group` and logs it.
    pub fn numerical(group: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("group {}: {}", group, message);
        LatticeError::Numerical { group, message }
    }

    /// Builds an error for a failure of the whole outer iteration, not
    /// tied to one group, and logs it.
    pub fn breakdown(iteration: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("outer iteration {}: {}", iteration, message);
        LatticeError::Breakdown { iteration, message }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, LatticeError::Configuration(_))
    }

    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            LatticeError::Numerical { .. } | LatticeError::Breakdown { .. }
        )
    }

    pub fn is_convergence_failure(&self) -> bool {
        matches!(self, LatticeError::ConvergenceFailure { .. })
    }
}
