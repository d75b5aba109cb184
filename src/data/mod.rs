//! Experimental data.
//!
//! - experiment descriptor files (`descriptor`)
//! - datasets and their points (`dataset`)
//! - the collection of every loaded dataset (`collection`)
//! - synthetic profiles for simulation (`synthetic`)

pub mod collection;
pub mod dataset;
pub mod descriptor;
pub mod synthetic;

pub use collection::*;
pub use dataset::*;
pub use descriptor::*;
pub use synthetic::*;
