//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the validated observation set (`Observations`)
//! - fit configuration (`FitConfig`)
//! - per-refinement outcomes (`FitOutcome`) and the final `FitResult`

pub mod types;

pub use types::*;
