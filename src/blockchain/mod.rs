//! Block model, reward schedule, chain-tip state, and neogenesis.

pub mod block;
pub mod chain;
pub mod neogen;
pub mod reward;

pub use block::{Address, BlockHeader, BlockTrailer, TxRecord};
pub use chain::ChainTip;
