//! Consensus rules: the puzzle, difficulty, and the block validator.

pub mod dict;
pub mod difficulty;
pub mod pow;
pub mod validator;

pub use validator::{validate_block, BlockEval};
