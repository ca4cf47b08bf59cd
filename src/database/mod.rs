//! Durable state: the ledger store, the delta applier, and the tag
//! index derived from the ledger.

pub mod apply;
pub mod ledger;
pub mod tags;

pub use apply::{Delta, DeltaOp, DeltaWriter};
pub use ledger::{Ledger, LedgerEntry, LedgerLock};
pub use tags::TagIndex;
