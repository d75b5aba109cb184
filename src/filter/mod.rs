//! Residue selection.
//!
//! `-r` (exclude) and `+r` (include) group lists narrow the loaded datasets to an
//! [`ActiveSet`]. Only parameters referenced by an active point take part in the
//! optimization.

pub mod selection;

pub use selection::*;
