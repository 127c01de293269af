//! Robust fitting pipeline.
//!
//! Responsibilities:
//!
//! - FAST-LTS search for the best `h`-subset (parallel over random starts)
//! - inside-out clipping of the remaining outliers
//! - intrinsic scatter estimation by root finding on the reduced chi2
//! - orchestration into a final `FitResult`

pub mod lts;
pub mod options;
pub mod plane;
pub mod scatter;
pub mod trim;

pub use lts::{LtsFit, best_subset, fast_lts, full_fit};
pub use options::SearchOptions;
pub use plane::{fit_line, fit_plane, inlier_count};
pub use scatter::{ScatterEstimate, estimate_scatter};
pub use trim::{TrimmedFit, clip_outliers, find_outliers};
