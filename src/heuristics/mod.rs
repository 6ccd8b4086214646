//! Heuristics module.
//!
//! Population-based engines and the 2-opt local search they share.

pub mod local_search;
pub mod genetic;
pub mod swarm;

pub use local_search::*;
pub use genetic::*;
pub use swarm::*;
