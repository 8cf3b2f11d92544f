//! # Collision Probability Module
//!
//! Integral transport in an infinitely long cylindrical cell made of `N`
//! concentric annular regions. Each region has a flat flux and a flat
//! isotropic source.
//!
//! ## Nomenclature
//!
//! | Symbol | Description |
//! |--------|-------------|
//! | `R_i` | outer radius of region `i` |
//! | `V_i` | area of region `i` (volume per unit height) |
//! | `Σ_i(g)` | transport cross section of region `i` in group `g` |
//! | `P[g,i,j]` | collision rate in `j` from a unit source density in `i`, times `Σ_i(g)` |
//! | `X[g,i,k]` | flux in `i` from a unit isotropic source density in `k` |
//! | `Y[g,i]` | flux in `i` from a unit isotropic current entering the cell |
//! | `Γ(g)` | fraction of the entering current removed inside the cell |
//!
//! ## Method
//!
//! The reduced collision probabilities come from Carlvik's chord integrals
//! over the Bickley-Naylor function `Ki3`:
//!
//! ```text
//! S_ij = Σ_{k<=i} ∫_{R_{k-1}}^{R_k} [Ki3(τ+(y)) - Ki3(τ-(y))] dy
//! P_ij = 2(S_ij + S_{i-1,j-1} - S_{i-1,j} - S_{i,j-1}) + δ_ij V_i Σ_i
//! ```
//!
//! With the within-group scattering eliminated, `X` and `Y` follow from one
//! dense linear system per group:
//!
//! ```text
//! Σ_i(g) V_i φ_i = sum_k P[g,k,i] / Σ_k(g) · (q_k + c_k Σ_k(g) φ_k),   c_k = Es_k(g->g) / Σ_k(g)
//! ```
//!
//! [`cylindrical_flux_solver`] couples the groups through fission and group
//! transfer, closes the boundary with an albedo and iterates for `keff`.
pub mod cylindrical_cell;
mod cylindrical_cell_tests;
pub mod cylindrical_flux_solver;
