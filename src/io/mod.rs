//! Output helpers.
//!
//! - fit results (`results`)
//! - simulated profiles (`profiles`)

pub mod profiles;
pub mod results;

pub use profiles::*;
pub use results::*;
