//! Wire framing, peer bookkeeping, and the tip controller.

pub mod peers;
pub mod protocol;
pub mod sync;

pub use peers::{PeerRing, Peers, TxFingerprints};
pub use protocol::{Opcode, Packet};
pub use sync::{Advert, Decision, FetchOutcome, TipController, TipState};
