//! Neogenesis blocks: the periodic ledger-snapshot block that rolls an
//! epoch.
//!
//! A neogenesis block is never transmitted between peers. Each node
//! regenerates it deterministically from its own ledger and the prior
//! block's trailer, and the controller only checks that the regenerated
//! hash matches what peers announce.
//!
//! Layout: `hdrlen u32 (= 12) ‖ entry-count u64 ‖ ledger entries ‖
//! trailer`. The trailer carries no transactions, no nonce, and the
//! prior difficulty, fee and times; its Merkle root field holds the
//! hash of the snapshot entries.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::arith::{add64, Value64};
use crate::blockchain::block::{bnum_is_neogenesis, BlockTrailer};
use crate::database::Ledger;
use crate::error::{Result, ValidateError};

/// Header length of a neogenesis block: the length field plus the entry
/// count.
pub const NEOGEN_HDR_LEN: u32 = 12;

/// Construct the neogenesis block following `prev` from the current
/// ledger, writing it to `out`. Returns its trailer.
pub fn build(ledger: &mut Ledger, prev: &BlockTrailer, out: &Path) -> Result<BlockTrailer> {
    let mut bnum = Value64::zero();
    if add64(
        Value64::from_bytes(&prev.bnum),
        Value64::one(),
        &mut bnum,
    ) {
        return Err(ValidateError::fault("block number overflow"));
    }
    let bnum = bnum.to_bytes();
    if !bnum_is_neogenesis(&bnum) {
        return Err(ValidateError::Invalid("not at an epoch boundary"));
    }

    let mut snapshot_hash = Sha256::new();
    let mut body = Vec::with_capacity((ledger.len() as usize) * crate::config::LEDGER_ENTRY_LEN);
    for i in 0..ledger.len() {
        let entry = ledger.entry_at(i)?;
        let bytes = entry.to_bytes();
        snapshot_hash.update(&bytes);
        body.extend_from_slice(&bytes);
    }
    let mroot: [u8; 32] = snapshot_hash.finalize().into();

    let mut bt = BlockTrailer::zero();
    bt.phash = prev.bhash;
    bt.bnum = bnum;
    bt.mfee = prev.mfee;
    bt.tcount = [0; 4];
    bt.time0 = prev.time0;
    bt.difficulty = prev.difficulty;
    bt.mroot = mroot;
    bt.stime = prev.stime;

    let mut bctx = Sha256::new();
    bctx.update(NEOGEN_HDR_LEN.to_le_bytes());
    bctx.update((ledger.len()).to_le_bytes());
    bctx.update(&body);
    bctx.update(bt.hashed_bytes());
    bt.bhash = bctx.finalize().into();

    let mut fp = BufWriter::new(File::create(out)?);
    fp.write_all(&NEOGEN_HDR_LEN.to_le_bytes())
        .map_err(ValidateError::from)?;
    fp.write_all(&(ledger.len()).to_le_bytes())
        .map_err(ValidateError::from)?;
    fp.write_all(&body).map_err(ValidateError::from)?;
    fp.write_all(&bt.to_bytes()).map_err(ValidateError::from)?;
    fp.flush().map_err(ValidateError::from)?;
    fp.get_ref().sync_all().map_err(ValidateError::from)?;

    Ok(bt)
}

/// Regenerate the neogenesis block after `prev` and compare its hash
/// with what a peer announced.
pub fn verify_announced(
    ledger: &mut Ledger,
    prev: &BlockTrailer,
    announced: &[u8; 32],
    out: &Path,
) -> Result<bool> {
    let bt = build(ledger, prev, out)?;
    Ok(&bt.bhash == announced)
}
