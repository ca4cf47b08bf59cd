//! Consensus core of a proof-of-work cryptocurrency node: block
//! validation, ledger state transition, tagged-address resolution, and
//! chain-tip selection under contention.

pub mod arith;
pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod database;
pub mod error;
pub mod network;

pub use blockchain::{Address, BlockTrailer, ChainTip};
pub use consensus::{validate_block, BlockEval};
pub use error::{Result, ValidateError};
