//! Integer constraint systems.
//!
//! This module provides the arithmetic behind the dependence test:
//! - Linear inequalities over named integer variables
//! - Fourier-Motzkin elimination for feasibility

pub mod constraint;
pub mod fourier_motzkin;

pub use constraint::{Constraint, ConstraintSystem};
pub use fourier_motzkin::{FourierMotzkin, DEFAULT_MAX_ROWS};
