//! Domain Services
//!
//! Pure logic shared by the application layer: history trimming,
//! similarity ranking, chunking and cost estimation.

mod chunking;
mod pricing;
mod similarity;
mod token_budget;

pub use chunking::*;
pub use pricing::*;
pub use similarity::*;
pub use token_budget::*;
