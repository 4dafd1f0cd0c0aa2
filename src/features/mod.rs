//! Feature construction
//!
//! - `binning`: windowed series → per-position occurrence counts
//! - `assemble`: counts + taxon abundance → dense design for the engine

pub mod assemble;
pub mod binning;

pub use assemble::{assemble, AbundanceTable, JoinedSample};
pub use binning::{bin, breakpoints, BinningPolicy, FrequencyTable};
