//! Shared parameters.
//!
//! - sharing-class arena with constraint merging (`registry`)
//! - name/group patterns (`selector`)
//! - parameter descriptor files (`descriptor`)

pub mod descriptor;
pub mod registry;
pub mod selector;

pub use descriptor::*;
pub use registry::*;
pub use selector::*;
