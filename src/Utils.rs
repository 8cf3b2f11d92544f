//! Numerical building blocks shared by the solvers.
pub mod quadrature;
pub mod special_functions;
