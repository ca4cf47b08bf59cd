use thiserror::Error;

/// Consensus-facing failure classes.
///
/// Every stage of block handling resolves into one of three kinds, each
/// with its own propagation policy:
///
/// - `Fault`: I/O or resource trouble. Global state is untouched and the
///   caller may retry. Never promoted to a consensus decision.
/// - `Invalid`: the block is well-formed but fails a rule. Dropped; the
///   source peer is not penalized (it could be a propagation race).
/// - `Hostile`: structure a well-behaved node cannot emit. Dropped and
///   the source peer is pinklisted for the epoch.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("fault: {0}")]
    Fault(#[from] std::io::Error),

    #[error("invalid block: {0}")]
    Invalid(&'static str),

    #[error("hostile block: {0}")]
    Hostile(&'static str),
}

impl ValidateError {
    /// Exit code for the validator subprocess interface:
    /// 0 is success, 1 retryable fault, 2 silent drop, 3 punish the peer.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Fault(_) => 1,
            ValidateError::Invalid(_) => 2,
            ValidateError::Hostile(_) => 3,
        }
    }

    pub fn is_hostile(&self) -> bool {
        matches!(self, ValidateError::Hostile(_))
    }

    /// A fault that did not originate in a `std::io` call.
    pub fn fault(msg: &'static str) -> Self {
        ValidateError::Fault(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }
}

pub type Result<T> = std::result::Result<T, ValidateError>;

/// Errors raised while framing or parsing wire packets. All of these are
/// hostile by definition: an honest peer cannot produce them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("short packet: {0} bytes")]
    ShortPacket(usize),

    #[error("bad network magic")]
    BadMagic,

    #[error("bad end-of-transmission trailer")]
    BadTrailer,

    #[error("crc16 mismatch")]
    BadCrc,

    #[error("unknown opcode {0}")]
    BadOpcode(u16),
}
