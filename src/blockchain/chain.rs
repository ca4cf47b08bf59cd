//! Chain-tip state and the commit path.
//!
//! The tip hash, block number, difficulty and weight travel together as
//! one aggregate passed into every operation. The commit is the
//! serialization point: a validation result produced against one tip is
//! discarded if the tip has moved.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::arith::{add64, Value64};
use crate::blockchain::block::{self, BlockTrailer};
use crate::config::{self, Paths, HASH_LEN};
use crate::consensus::difficulty::{add_weight, retarget};
use crate::consensus::validator::BlockEval;
use crate::database::{apply, Ledger, TagIndex};
use crate::error::{Result, ValidateError};

/// Everything the node knows about its current tip.
#[derive(Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub bnum: [u8; 8],
    pub bhash: [u8; HASH_LEN],
    pub phash: [u8; HASH_LEN],
    /// Cumulative proof of work, 256-bit little-endian.
    pub weight: [u8; HASH_LEN],
    pub difficulty: u32,
    pub time0: u32,
    pub mfee: [u8; 8],
    /// Epoch counter, bumped on each neogenesis block.
    pub eon: u32,
    /// Peer the last honored advertisement came from.
    pub peer: Option<Ipv4Addr>,
}

impl std::fmt::Debug for ChainTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChainTip(bnum={} diff={} hash={}..)",
            Value64::from_bytes(&self.bnum),
            self.difficulty,
            hex::encode(&self.bhash[..4])
        )
    }
}

impl ChainTip {
    /// A fresh tip at block zero with protocol defaults.
    pub fn genesis() -> ChainTip {
        ChainTip {
            bnum: [0; 8],
            bhash: [0; HASH_LEN],
            phash: [0; HASH_LEN],
            weight: [0; HASH_LEN],
            difficulty: 1,
            time0: 0,
            mfee: config::mining_fee().to_bytes(),
            eon: 0,
            peer: None,
        }
    }

    /// The block number the next candidate must carry.
    pub fn next_bnum(&self) -> Result<[u8; 8]> {
        let mut next = Value64::zero();
        if add64(Value64::from_bytes(&self.bnum), Value64::one(), &mut next) {
            return Err(ValidateError::fault("block number overflow"));
        }
        Ok(next.to_bytes())
    }

    /// Fold a committed trailer into the tip: advance the number and
    /// hashes, accumulate weight at the block's own difficulty, then
    /// retarget from its solve time.
    pub fn advance(&mut self, bt: &BlockTrailer) -> Result<()> {
        self.bnum = self.next_bnum()?;
        self.phash = self.bhash;
        self.bhash = bt.bhash;

        let difficulty = bt.difficulty();
        add_weight(&mut self.weight, difficulty);
        let solve = bt.stime().wrapping_sub(bt.time0()) as i32;
        self.difficulty = retarget(difficulty, solve);
        self.time0 = bt.stime();
        log::info!(
            "tip advanced to block {} difficulty {} (solve {}s)",
            Value64::from_bytes(&self.bnum),
            self.difficulty,
            solve
        );
        Ok(())
    }

    /// Fold a neogenesis trailer into the tip: hashes and number move,
    /// the eon rolls, weight and difficulty stay.
    pub fn advance_neogenesis(&mut self, bt: &BlockTrailer) -> Result<()> {
        if !bt.is_neogenesis() {
            return Err(ValidateError::Invalid("not a neogenesis trailer"));
        }
        self.bnum = self.next_bnum()?;
        self.phash = self.bhash;
        self.bhash = bt.bhash;
        self.eon += 1;
        Ok(())
    }

    /// Packed on-disk form:
    /// bnum ‖ bhash ‖ phash ‖ weight ‖ difficulty ‖ time0 ‖ mfee ‖ eon.
    pub fn store(&self, path: &Path) -> io::Result<()> {
        let mut fp = File::create(path)?;
        fp.write_all(&self.bnum)?;
        fp.write_all(&self.bhash)?;
        fp.write_all(&self.phash)?;
        fp.write_all(&self.weight)?;
        fp.write_all(&self.difficulty.to_le_bytes())?;
        fp.write_all(&self.time0.to_le_bytes())?;
        fp.write_all(&self.mfee)?;
        fp.write_all(&self.eon.to_le_bytes())?;
        fp.sync_all()
    }

    pub fn load(path: &Path) -> io::Result<ChainTip> {
        let mut fp = File::open(path)?;
        let mut tip = ChainTip::genesis();
        fp.read_exact(&mut tip.bnum)?;
        fp.read_exact(&mut tip.bhash)?;
        fp.read_exact(&mut tip.phash)?;
        fp.read_exact(&mut tip.weight)?;
        let mut w = [0u8; 4];
        fp.read_exact(&mut w)?;
        tip.difficulty = u32::from_le_bytes(w);
        fp.read_exact(&mut w)?;
        tip.time0 = u32::from_le_bytes(w);
        fp.read_exact(&mut tip.mfee)?;
        fp.read_exact(&mut w)?;
        tip.eon = u32::from_le_bytes(w);
        Ok(tip)
    }

    /// Load the persisted tip, or start from genesis.
    pub fn load_or_genesis(path: &Path) -> io::Result<ChainTip> {
        match ChainTip::load(path) {
            Ok(tip) => Ok(tip),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ChainTip::genesis()),
            Err(e) => Err(e),
        }
    }
}

/// Commit a validated block: apply its sorted deltas to the ledger,
/// append the trailer to the history, advance the tip, persist it, and
/// archive the block file. Exactly-once: a tip that moved since
/// validation discards the result untouched.
pub fn commit_block(
    paths: &Paths,
    tip: &mut ChainTip,
    eval: &BlockEval,
    block_path: &Path,
) -> Result<()> {
    if eval.trailer.phash != tip.bhash {
        // The tip advanced while this block was being validated.
        let _ = std::fs::remove_file(&eval.delta_path);
        return Err(ValidateError::Invalid("tip moved during validation"));
    }

    apply::apply(paths)?;
    block::append_trailer(&paths.trailers(), &eval.trailer)?;
    tip.advance(&eval.trailer)?;
    tip.store(&paths.tip())?;
    archive_block(paths, block_path, &eval.trailer)?;
    Ok(())
}

/// Move a committed block file into the archive directory, named by its
/// block number.
fn archive_block(paths: &Paths, block_path: &Path, bt: &BlockTrailer) -> Result<()> {
    let dir = paths.blocks_dir();
    std::fs::create_dir_all(&dir)?;
    let mut name = bt.bnum;
    name.reverse();
    let target = dir.join(format!("b{}.bc", hex::encode(name)));
    if target.exists() {
        return Err(ValidateError::fault("archived block already exists"));
    }
    std::fs::rename(block_path, target)?;
    Ok(())
}

/// Rebuild the tag index after a ledger mutation.
pub fn reindex_tags(paths: &Paths) -> io::Result<TagIndex> {
    let mut ledger = Ledger::open(&paths.ledger())?;
    TagIndex::build(&mut ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn trailer(bnum: u64, difficulty: u32, time0: u32, stime: u32) -> BlockTrailer {
        let mut bt = BlockTrailer::zero();
        bt.bnum = bnum.to_le_bytes();
        bt.difficulty = difficulty.to_le_bytes();
        bt.time0 = time0.to_le_bytes();
        bt.stime = stime.to_le_bytes();
        bt.bhash = crate::crypto::sha256(&bnum.to_le_bytes());
        bt
    }

    #[test]
    fn advance_moves_hashes_weight_and_difficulty() {
        let mut tip = ChainTip::genesis();
        tip.bhash = crate::crypto::sha256(b"old");
        tip.difficulty = 10;

        // 600 seconds: slow block, difficulty decrements.
        let bt = trailer(1, 10, 1000, 1600);
        tip.advance(&bt).unwrap();

        assert_eq!(Value64::from_bytes(&tip.bnum).to_u64(), 1);
        assert_eq!(tip.phash, crate::crypto::sha256(b"old"));
        assert_eq!(tip.bhash, bt.bhash);
        assert_eq!(tip.difficulty, 9);
        assert_eq!(tip.time0, 1600);
        // weight picked up 2^10
        assert_eq!(tip.weight[1], 0x04);
    }

    #[test]
    fn advance_with_fast_solve_raises_difficulty() {
        let mut tip = ChainTip::genesis();
        let bt = trailer(1, 10, 1000, 1100);
        tip.advance(&bt).unwrap();
        assert_eq!(tip.difficulty, 11);
    }

    #[test]
    fn clock_rollover_recovers_true_elapsed_time() {
        // time0 just below the 32-bit rollover, stime just past it: the
        // wrapping difference is the real 9-second solve, which is fast
        // enough to raise the difficulty.
        let mut tip = ChainTip::genesis();
        let bt = trailer(1, 10, u32::MAX - 5, 3);
        tip.advance(&bt).unwrap();
        assert_eq!(tip.difficulty, 11);
    }

    #[test]
    fn clock_running_backwards_leaves_difficulty_alone() {
        // stime far before time0: the wrapping difference casts to a
        // negative solve, which the retarget treats as no change.
        let mut tip = ChainTip::genesis();
        let bt = trailer(1, 10, 1000, 3);
        tip.advance(&bt).unwrap();
        assert_eq!(tip.difficulty, 10);
    }

    #[test]
    fn neogenesis_rolls_eon_without_weight() {
        let mut tip = ChainTip::genesis();
        tip.bnum = 0xFFFFu64.to_le_bytes();
        let before_weight = tip.weight;

        let bt = trailer(0x10000, 12, 0, 0);
        tip.advance_neogenesis(&bt).unwrap();
        assert_eq!(tip.eon, 1);
        assert_eq!(tip.weight, before_weight);
        assert_eq!(Value64::from_bytes(&tip.bnum).to_u64(), 0x10000);

        let not_ng = trailer(0x10001, 12, 0, 0);
        assert!(tip.advance_neogenesis(&not_ng).is_err());
    }

    #[test]
    fn tip_state_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tip.dat");

        let mut tip = ChainTip::genesis();
        tip.bnum = 42u64.to_le_bytes();
        tip.difficulty = 17;
        tip.eon = 3;
        tip.weight[5] = 0xAB;
        tip.store(&path).unwrap();

        let back = ChainTip::load(&path).unwrap();
        assert_eq!(back, tip);
    }

    #[test]
    fn missing_tip_file_means_genesis() {
        let dir = tempdir().unwrap();
        let tip = ChainTip::load_or_genesis(&dir.path().join("tip.dat")).unwrap();
        assert_eq!(tip, ChainTip::genesis());
    }
}
