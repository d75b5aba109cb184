//! Global fitting.
//!
//! Responsibilities:
//!
//! - assemble the joint residual vector over every active dataset
//! - minimize it stage by stage (bounded Levenberg–Marquardt)
//! - split stages into independent clusters when possible
//! - compute statistics and uncertainties for the final result

pub mod clusters;
pub mod engine;
pub mod optimizer;
pub mod residuals;
pub mod result;
pub mod statistics;

pub use clusters::*;
pub use engine::*;
pub use optimizer::*;
pub use residuals::*;
pub use result::*;
pub use statistics::*;
