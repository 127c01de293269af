//! `lts-planefit` library crate.
//!
//! Robust fitting of a hyperplane `z = a + Σ b_j (x_j - pivot_j)` when every
//! coordinate carries its own measurement error, the relation has unknown
//! intrinsic scatter, and an unknown fraction of the points are outliers.
//!
//! The pipeline is:
//!
//! - FAST-LTS search over random minimal subsets (`fit::lts`)
//! - inside-out clipping of the remaining outliers (`fit::trim`)
//! - intrinsic scatter from a root find on the reduced chi2 (`fit::scatter`)
//! - orchestration and validation (`fit::plane`)
//!
//! ```rust,ignore
//! use lts_planefit::{fit_plane, FitConfig, Observations};
//!
//! let obs = Observations::new(x_rows, z, sigx_rows, sigz)?;
//! let config = FitConfig { pivot: Some(obs.median_pivot()), ..FitConfig::default() };
//! let fit = fit_plane(&obs, &config)?;
//! println!("slopes = {:?}, outliers = {:?}", &fit.abc[1..], fit.outliers());
//! ```

pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;

pub use domain::{FitConfig, FitOutcome, FitResult, Observations};
pub use error::FitError;
pub use fit::{fit_line, fit_plane};
