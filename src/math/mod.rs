//! Mathematical utilities: plane solves, residuals, nonlinear refinement and
//! root finding.

pub mod lm;
pub mod ols;
pub mod residuals;
pub mod roots;
pub mod stats;

pub use lm::*;
pub use ols::*;
pub use residuals::*;
pub use roots::*;
pub use stats::*;
