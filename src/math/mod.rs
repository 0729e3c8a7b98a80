//! Dense linear algebra: truncated SVD, low-rank inverses, and the sensitivity solve.

pub mod ensemble;
pub mod lowrank;
pub mod svd;

pub use ensemble::*;
pub use lowrank::*;
pub use svd::*;
