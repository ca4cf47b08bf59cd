//! Protocol constants and node configuration.
//!
//! The constants below are consensus-critical: two nodes disagreeing on
//! any of them will fork. The `NodeConfig` section is operational tuning
//! only and round-trips through TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::arith::Value64;

/// Protocol version byte carried in every wire packet.
pub const PVERSION: u8 = 1;

/// Network magic in every packet header.
pub const TX_NETWORK: u16 = 0x0539;

/// End-of-transmission marker at the end of every packet.
pub const TX_EOT: u16 = 0xabcd;

/// Main TCP listening port.
pub const PORT1: u16 = 2095;

/// Secondary port.
pub const PORT2: u16 = 2096;

/// Full address length: WOTS verification key vector plus two salts.
pub const TX_ADDR_LEN: usize = 2208;

/// WOTS signature length (and key vector length).
pub const TX_SIG_LEN: usize = 2144;

/// All amounts are 64-bit little-endian.
pub const TX_AMOUNT_LEN: usize = 8;

pub const HASH_LEN: usize = 32;

/// Tag field overlays the trailing bytes of an address.
pub const TAG_LEN: usize = 12;
pub const TAG_OFFSET: usize = 2196;

/// An address whose byte at `TAG_OFFSET` equals this sentinel carries no tag.
pub const NOTAG_BYTE: u8 = 0x42;

/// Leading transaction bytes covered by the signature digest:
/// three addresses and three amounts, signature excluded.
pub const SIG_HASH_LEN: usize = TX_ADDR_LEN * 3 + TX_AMOUNT_LEN * 3;

/// In-block transaction record length.
pub const TX_RECORD_LEN: usize = SIG_HASH_LEN + TX_SIG_LEN + HASH_LEN;

/// Fixed block header length: 4-byte header-length field, miner address,
/// miner reward.
pub const BLOCK_HEADER_LEN: usize = 4 + TX_ADDR_LEN + TX_AMOUNT_LEN;

/// Fixed block trailer length.
pub const BLOCK_TRAILER_LEN: usize = 160;

/// Ledger entry record length (address + balance).
pub const LEDGER_ENTRY_LEN: usize = TX_ADDR_LEN + TX_AMOUNT_LEN;

/// Ledger delta record length (address + op byte + amount).
pub const DELTA_RECORD_LEN: usize = TX_ADDR_LEN + 1 + TX_AMOUNT_LEN;

/// Transaction buffer inside a wire packet.
pub const TRAN_BUFF_LEN: usize = TX_ADDR_LEN * 3 + TX_AMOUNT_LEN * 3 + TX_SIG_LEN;

/// Full wire packet length: five 16-bit header words, two 64-bit block
/// numbers, three 32-byte hashes, the 16-bit buffer length, the
/// transaction buffer, CRC and EOT.
pub const PACKET_LEN: usize = 10 + 16 + HASH_LEN * 3 + 2 + TRAN_BUFF_LEN + 4;

/// Maximum transactions in one block.
pub const MAXBLTX: u32 = 32768;

/// Protocol mining fee, satoshi.
pub const MFEE: u32 = 500;

/// Difficulty drops when a block took longer than this many seconds.
pub const HIGHSOLVE: u32 = 506;

/// Difficulty rises when a block solved faster than this many seconds.
pub const LOWSOLVE: u32 = 253;

/// Seconds competing tip advertisements are aggregated before resolving
/// contention.
pub const LULL: u32 = 30;

/// Recent peer ring capacity.
pub const RPLIST_LEN: usize = 200;

/// Current peer ring capacity.
pub const CPLIST_LEN: usize = 8;

/// Epoch pink list capacity.
pub const EPINK_LEN: usize = 100;

/// Recent transaction fingerprint ring capacity.
pub const FPLIST_LEN: usize = 1024;

/// Pink lists roll when `bnum & EPOCHMASK == 0`.
pub const EPOCHMASK: u32 = 15;

/// The protocol fee as a limb value.
pub fn mining_fee() -> Value64 {
    Value64::from_u32s(MFEE, 0)
}

/// Well-known file names inside the data directory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
}

impl Paths {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Sorted flat file of (address, balance) entries.
    pub fn ledger(&self) -> PathBuf {
        self.data_dir.join("ledger.dat")
    }

    /// Rebuild target; renamed over `ledger.dat` on commit.
    pub fn ledger_tmp(&self) -> PathBuf {
        self.data_dir.join("ledger.tmp")
    }

    /// Advisory lock taken while the ledger is rebuilt and swapped.
    pub fn ledger_lock(&self) -> PathBuf {
        self.data_dir.join("txq1.lck")
    }

    /// Unsorted delta records emitted during validation.
    pub fn delta_tmp(&self) -> PathBuf {
        self.data_dir.join("delta.tmp")
    }

    /// Sorted delta file consumed by the applier.
    pub fn delta(&self) -> PathBuf {
        self.data_dir.join("delta.dat")
    }

    /// Append-only trailer history.
    pub fn trailers(&self) -> PathBuf {
        self.data_dir.join("trailers.dat")
    }

    /// Packed chain-tip state.
    pub fn tip(&self) -> PathBuf {
        self.data_dir.join("tip.dat")
    }

    /// Persisted recent-peer list.
    pub fn peers(&self) -> PathBuf {
        self.data_dir.join("peers.lst")
    }

    /// Archive directory for committed blocks.
    pub fn blocks_dir(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

/// Operational (non-consensus) node settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    /// Per-peer read timeout, seconds.
    pub peer_read_timeout_secs: u64,
    /// Acknowledged-send timeout, seconds.
    pub peer_send_timeout_secs: u64,
    /// Contention aggregation window, seconds.
    pub lull_secs: u32,
    /// Fetch retries before an advertised block is abandoned.
    pub fetch_retries: u8,
    pub listen_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("./data"))
            .join("chi-node");

        Self {
            data_dir,
            peer_read_timeout_secs: 3,
            peer_send_timeout_secs: 10,
            lull_secs: LULL,
            fetch_retries: 3,
            listen_port: PORT1,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn paths(&self) -> Paths {
        Paths::new(&self.data_dir)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_read_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_send_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialize error: {0}")]
    Serialize(String),
}
