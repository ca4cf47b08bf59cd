//! The block validator: the one place a candidate block becomes chain
//! state or dies.
//!
//! The pipeline is ordered so cheap checks run first: structure
//! (header length, transaction count, exact file length), then the
//! trailer fields, then the proof of work (one hash and a grammar
//! scan), then the header reward, then the per-transaction work. Each
//! stage short-circuits on the first non-OK result; the error kind
//! decides whether the fetch is retried, the block silently dropped,
//! or the source peer punished.
//!
//! On success the validator has produced a sorted ledger-delta file and
//! the candidate trailer; committing those is the caller's move.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::arith::{add64, cmp64, Value64};
use crate::blockchain::block::{read_trailer, BlockHeader, BlockTrailer, TxRecord};
use crate::blockchain::chain::ChainTip;
use crate::blockchain::reward::mining_reward;
use crate::config::{
    Paths, BLOCK_HEADER_LEN, BLOCK_TRAILER_LEN, HASH_LEN, MAXBLTX, TX_RECORD_LEN, TX_SIG_LEN,
};
use crate::consensus::pow;
use crate::crypto::wots;
use crate::database::apply::{sort_deltas, Delta, DeltaWriter};
use crate::database::{Ledger, TagIndex};
use crate::error::{Result, ValidateError};

/// A successful validation: the sorted delta file ready for the applier
/// and the trailer ready for the history.
#[derive(Debug)]
pub struct BlockEval {
    pub delta_path: PathBuf,
    pub trailer: BlockTrailer,
    pub haiku: String,
    pub tx_count: u32,
}

/// Validate a candidate block file against the current tip.
///
/// The tag index must have been rebuilt from the ledger being consulted;
/// both stay untouched. Temp files are cleaned up on any failure.
pub fn validate_block(
    block_path: &Path,
    tip: &ChainTip,
    ledger: &mut Ledger,
    tags: &TagIndex,
    paths: &Paths,
) -> Result<BlockEval> {
    let result = run(block_path, tip, ledger, tags, paths);
    if let Err(e) = &result {
        let _ = std::fs::remove_file(paths.delta_tmp());
        let _ = std::fs::remove_file(paths.delta());
        log::warn!("block rejected: {e}");
    }
    result
}

fn run(
    block_path: &Path,
    tip: &ChainTip,
    ledger: &mut Ledger,
    tags: &TagIndex,
    paths: &Paths,
) -> Result<BlockEval> {
    let mut fp = File::open(block_path)?;
    let file_len = fp.metadata()?.len();
    if file_len < (BLOCK_HEADER_LEN + BLOCK_TRAILER_LEN) as u64 {
        return Err(ValidateError::Invalid("truncated block file"));
    }

    // The trailer sits at a fixed offset from EOF; read it before the body.
    let bt = read_trailer(block_path)?;

    // Structural checks come first: a block with a bogus header length
    // or a file length that disagrees with its transaction count must
    // not cost this verifier a puzzle evaluation.
    let mut hdr_buf = vec![0u8; BLOCK_HEADER_LEN];
    fp.read_exact(&mut hdr_buf)?;
    let hdrlen = u32::from_le_bytes([hdr_buf[0], hdr_buf[1], hdr_buf[2], hdr_buf[3]]);
    if hdrlen != BLOCK_HEADER_LEN as u32 {
        return Err(ValidateError::Invalid("bad header length"));
    }

    // Neogenesis carriers are regenerated locally, never fetched, so an
    // empty or oversized transaction array is something no honest peer
    // sends.
    let tcount = bt.tcount();
    if tcount == 0 || tcount > MAXBLTX {
        return Err(ValidateError::Hostile("bad transaction count"));
    }
    let expected_len =
        BLOCK_HEADER_LEN as u64 + tcount as u64 * TX_RECORD_LEN as u64 + BLOCK_TRAILER_LEN as u64;
    if expected_len != file_len {
        return Err(ValidateError::Invalid("bad block length"));
    }

    if bt.mfee != tip.mfee {
        return Err(ValidateError::Invalid("bad mining fee"));
    }
    if bt.difficulty() != tip.difficulty {
        return Err(ValidateError::Invalid("difficulty mismatch"));
    }
    if bt.stime() <= bt.time0() {
        return Err(ValidateError::Invalid("block time too early"));
    }
    let expected_bnum = tip.next_bnum()?;
    if bt.bnum != expected_bnum {
        return Err(ValidateError::Invalid("bad block number"));
    }
    if bt.phash != tip.bhash {
        return Err(ValidateError::Invalid("previous hash mismatch"));
    }

    // Proof of work before any per-transaction expense: a bad nonce
    // costs this verifier one hash and a grammar scan.
    let haiku = pow::check(&bt.mroot, &bt.nonce, bt.difficulty(), &bt.bnum)
        .ok_or(ValidateError::Hostile("proof of work failed"))?;
    log::info!("\n{haiku}");

    let header = BlockHeader::from_bytes(&hdr_buf).expect("length checked");
    let mreward = mining_reward(&bt.bnum);
    if header.mreward != mreward.to_bytes() {
        return Err(ValidateError::Invalid("bad mining reward"));
    }

    let mut bctx = Sha256::new(); // entire block hash
    bctx.update(&hdr_buf);
    let mut mctx = Sha256::new(); // transaction array hash

    let mut deltas = DeltaWriter::create(&paths.delta_tmp())?;
    let mfee = Value64::from_bytes(&tip.mfee);
    let mut mfees = Value64::zero();
    let mut prev_tx_id = [0u8; HASH_LEN];

    let mut body = BufReader::new(fp);
    for tnum in 0..tcount {
        let tx = match TxRecord::read_from(&mut body) {
            Ok(tx) => tx,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ValidateError::Invalid("short transaction read"));
            }
            Err(e) => return Err(e.into()),
        };

        if tx.src_addr == tx.dst_addr || tx.src_addr == tx.chg_addr {
            return Err(ValidateError::Invalid("source matches destination or change"));
        }
        if tx.tx_fee != tip.mfee {
            return Err(ValidateError::Invalid("bad transaction fee"));
        }

        let bytes = tx.to_bytes();
        bctx.update(&bytes);
        mctx.update(&bytes);

        let tx_id = tx.compute_id();
        if tx_id != tx.tx_id {
            return Err(ValidateError::Invalid("bad transaction id"));
        }
        if tnum != 0 {
            match tx_id.cmp(&prev_tx_id) {
                std::cmp::Ordering::Less => {
                    return Err(ValidateError::Hostile("transaction ids unsorted"));
                }
                std::cmp::Ordering::Equal => {
                    return Err(ValidateError::Hostile("duplicate transaction id"));
                }
                std::cmp::Ordering::Greater => {}
            }
        }
        prev_tx_id = tx_id;

        let message = tx.sig_message();
        let pk = wots::pk_from_sig(
            &tx.signature,
            &message,
            &tx.src_addr.pub_seed(),
            &tx.src_addr.addr_seed(),
        );
        if pk[..] != tx.src_addr.0[..TX_SIG_LEN] {
            return Err(ValidateError::Hostile("one-time signature failed"));
        }

        let src_entry = ledger
            .find(&tx.src_addr)?
            .ok_or(ValidateError::Invalid("source address not in ledger"))?
            .0;

        let send = Value64::from_bytes(&tx.send_total);
        let change = Value64::from_bytes(&tx.change_total);
        let mut total = Value64::zero();
        let mut overflow = add64(send, change, &mut total);
        let mut with_fee = Value64::zero();
        overflow |= add64(total, mfee, &mut with_fee);
        if overflow {
            return Err(ValidateError::Invalid("transaction total overflow"));
        }

        if cmp64(src_entry.balance_value(), with_fee) == std::cmp::Ordering::Less {
            return Err(ValidateError::Invalid("insufficient source balance"));
        }

        if !tags.tag_ok(&tx.src_addr, &tx.chg_addr) {
            return Err(ValidateError::Invalid("tag binding rejected"));
        }

        deltas.append(&Delta::debit(tx.src_addr, with_fee))?;
        if !send.is_zero() {
            deltas.append(&Delta::credit(tx.dst_addr, send))?;
        }
        if !change.is_zero() {
            deltas.append(&Delta::credit(tx.chg_addr, change))?;
        }

        let mut fee_sum = Value64::zero();
        if add64(mfees, mfee, &mut fee_sum) {
            return Err(ValidateError::Invalid("fee accumulation overflow"));
        }
        mfees = fee_sum;
    }

    let mroot: [u8; 32] = mctx.finalize().into();
    if mroot != bt.mroot {
        return Err(ValidateError::Invalid("bad merkle root"));
    }

    bctx.update(bt.hashed_bytes());
    let bhash: [u8; 32] = bctx.finalize().into();
    if bhash != bt.bhash {
        return Err(ValidateError::Invalid("bad block hash"));
    }

    // Fees plus reward mint the miner's credit.
    let mut minted = Value64::zero();
    if add64(mfees, mreward, &mut minted) {
        return Err(ValidateError::Invalid("reward overflow"));
    }
    deltas.append(&Delta::credit(header.maddr, minted))?;
    deltas.finish()?;

    sort_deltas(&paths.delta_tmp(), &paths.delta())?;

    Ok(BlockEval {
        delta_path: paths.delta(),
        trailer: bt,
        haiku,
        tx_count: tcount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::{compute_hashes, write_block, Address};
    use crate::blockchain::chain::{commit_block, reindex_tags};
    use crate::config::{TAG_LEN, TX_ADDR_LEN};
    use crate::crypto::sha256;
    use crate::database::ledger::{write_ledger, LedgerEntry};
    use tempfile::tempdir;

    /// A spendable one-time key: the full address plus its secret.
    struct Wallet {
        addr: Address,
        secret: [u8; 32],
    }

    fn wallet(name: &[u8], tag: Option<[u8; TAG_LEN]>) -> Wallet {
        let secret = sha256(&[name, b"/secret".as_slice()].concat());
        let pub_seed = sha256(&[name, b"/pub".as_slice()].concat());
        let mut addr_seed = sha256(&[name, b"/addr".as_slice()].concat());
        // The tag overlays the trailing bytes of the hash-address seed.
        match tag {
            Some(t) => addr_seed[20..].copy_from_slice(&t),
            None => addr_seed[20] = crate::config::NOTAG_BYTE,
        }

        let pk = wots::pkgen(&secret, &pub_seed, &addr_seed);
        let mut bytes = [0u8; TX_ADDR_LEN];
        bytes[..TX_SIG_LEN].copy_from_slice(&pk);
        bytes[TX_SIG_LEN..TX_SIG_LEN + 32].copy_from_slice(&pub_seed);
        bytes[TX_SIG_LEN + 32..].copy_from_slice(&addr_seed);
        Wallet {
            addr: Address(bytes),
            secret,
        }
    }

    fn signed_tx(src: &Wallet, dst: &Address, chg: &Address, send: u64, change: u64) -> TxRecord {
        let mut tx = TxRecord {
            src_addr: src.addr,
            dst_addr: *dst,
            chg_addr: *chg,
            send_total: send.to_le_bytes(),
            change_total: change.to_le_bytes(),
            tx_fee: 500u64.to_le_bytes(),
            signature: [0u8; TX_SIG_LEN],
            tx_id: [0u8; HASH_LEN],
        };
        let message = tx.sig_message();
        tx.signature = wots::sign(
            &message,
            &src.secret,
            &src.addr.pub_seed(),
            &src.addr.addr_seed(),
        );
        tx.tx_id = tx.compute_id();
        tx
    }

    fn tip_at_one() -> ChainTip {
        let mut tip = ChainTip::genesis();
        tip.bnum = 1u64.to_le_bytes();
        tip.bhash = sha256(b"block one");
        tip.difficulty = 1;
        tip.time0 = 1000;
        tip
    }

    /// Assemble a fully valid block on top of `tip`: sort transactions,
    /// compute the Merkle root, solve the puzzle, compute the hash.
    fn build_block(path: &Path, tip: &ChainTip, miner: &Address, mut txs: Vec<TxRecord>) -> BlockTrailer {
        txs.sort_by(|a, b| a.tx_id.cmp(&b.tx_id));

        let mut bt = BlockTrailer::zero();
        bt.phash = tip.bhash;
        bt.bnum = {
            let mut n = Value64::zero();
            add64(Value64::from_bytes(&tip.bnum), Value64::one(), &mut n);
            n.to_bytes()
        };
        bt.mfee = tip.mfee;
        bt.tcount = (txs.len() as u32).to_le_bytes();
        bt.time0 = tip.time0.to_le_bytes();
        bt.difficulty = tip.difficulty.to_le_bytes();
        bt.stime = (tip.time0 + 300).to_le_bytes();

        let header = BlockHeader {
            maddr: *miner,
            mreward: mining_reward(&bt.bnum).to_bytes(),
        };

        let (mroot, _) = compute_hashes(&header, &txs, &bt);
        bt.mroot = mroot;
        let (nonce, _) = pow::solve(&bt.mroot, bt.difficulty(), &bt.bnum).expect("solvable");
        bt.nonce = nonce;
        let (_, bhash) = compute_hashes(&header, &txs, &bt);
        bt.bhash = bhash;

        write_block(path, &header, &txs, &bt).unwrap();
        bt
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: Paths,
        tip: ChainTip,
        block: PathBuf,
    }

    fn fixture(entries: &[LedgerEntry]) -> Fixture {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.addr.cmp(&b.addr));
        write_ledger(&paths.ledger(), &sorted).unwrap();
        let block = dir.path().join("rblock.dat");
        Fixture {
            _dir: dir,
            paths,
            tip: tip_at_one(),
            block,
        }
    }

    fn validate(fx: &Fixture) -> Result<BlockEval> {
        let mut ledger = Ledger::open(&fx.paths.ledger()).unwrap();
        let tags = TagIndex::build(&mut ledger).unwrap();
        validate_block(&fx.block, &fx.tip, &mut ledger, &tags, &fx.paths)
    }

    fn balances(paths: &Paths, addrs: &[&Address]) -> Vec<Option<u64>> {
        let mut ledger = Ledger::open(&paths.ledger()).unwrap();
        addrs
            .iter()
            .map(|a| ledger.balance(a).unwrap().map(|v| v.to_u64()))
            .collect()
    }

    #[test]
    fn accepts_a_valid_block_and_commits_it() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        let eval = validate(&fx).expect("valid block");
        assert_eq!(eval.tx_count, 1);
        assert!(!eval.haiku.is_empty());

        let mut tip = fx.tip.clone();
        commit_block(&fx.paths, &mut tip, &eval, &fx.block).unwrap();
        reindex_tags(&fx.paths).unwrap();

        assert_eq!(Value64::from_bytes(&tip.bnum).to_u64(), 2);
        assert_eq!(tip.bhash, eval.trailer.bhash);

        // Alice spent to zero and left the ledger; Bob and the change
        // address were created; the miner minted reward plus fees.
        let got = balances(&fx.paths, &[&a.addr, &b.addr, &c.addr, &miner.addr]);
        assert_eq!(
            got,
            vec![
                None,
                Some(1_000),
                Some(499_500),
                Some(5_000_056_000 + 500),
            ]
        );
    }

    #[test]
    fn replay_after_commit_is_invalid() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        let eval = validate(&fx).unwrap();
        // Keep a copy: commit archives the original file.
        let replay = fx.paths.data_dir.join("replay.dat");
        std::fs::copy(&fx.block, &replay).unwrap();

        let mut tip = fx.tip.clone();
        commit_block(&fx.paths, &mut tip, &eval, &fx.block).unwrap();

        // Same bytes against the old tip: the source entry is gone.
        let mut ledger = Ledger::open(&fx.paths.ledger()).unwrap();
        let tags = TagIndex::build(&mut ledger).unwrap();
        let err =
            validate_block(&replay, &fx.tip, &mut ledger, &tags, &fx.paths).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("source address not in ledger")));
    }

    #[test]
    fn nonce_tamper_is_hostile() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        let bt = build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        // Overwrite the second haiku's opening token with a plural noun;
        // no frame opens with one, so the grammar predicate fails no
        // matter what the hash does.
        use crate::consensus::dict::{DICT, F_NPL};
        let npl = (1..DICT.len())
            .find(|&i| DICT[i].features == F_NPL)
            .unwrap() as u8;
        let mut bytes = std::fs::read(&fx.block).unwrap();
        let nonce_at = bytes.len() - BLOCK_TRAILER_LEN + 32 + 8 + 8 + 4 + 4 + 4 + 32;
        bytes[nonce_at + 16] = npl;
        std::fs::write(&fx.block, &bytes).unwrap();
        assert_ne!(read_trailer(&fx.block).unwrap().nonce, bt.nonce);

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Hostile("proof of work failed")));
    }

    #[test]
    fn hostile_transaction_count_in_trailer() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        let mut txs = vec![tx];
        txs.sort_by(|x, y| x.tx_id.cmp(&y.tx_id));

        // Build a block whose trailer claims MAXBLTX + 1 transactions,
        // with a matching puzzle and hash so only the count is wrong.
        let mut bt = BlockTrailer::zero();
        bt.phash = fx.tip.bhash;
        bt.bnum = 2u64.to_le_bytes();
        bt.mfee = fx.tip.mfee;
        bt.tcount = (MAXBLTX + 1).to_le_bytes();
        bt.time0 = fx.tip.time0.to_le_bytes();
        bt.difficulty = fx.tip.difficulty.to_le_bytes();
        bt.stime = (fx.tip.time0 + 300).to_le_bytes();

        let header = BlockHeader {
            maddr: miner.addr,
            mreward: mining_reward(&bt.bnum).to_bytes(),
        };
        let (mroot, _) = compute_hashes(&header, &txs, &bt);
        bt.mroot = mroot;
        let (nonce, _) = pow::solve(&bt.mroot, bt.difficulty(), &bt.bnum).unwrap();
        bt.nonce = nonce;
        let (_, bhash) = compute_hashes(&header, &txs, &bt);
        bt.bhash = bhash;
        write_block(&fx.block, &header, &txs, &bt).unwrap();

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Hostile("bad transaction count")));
    }

    #[test]
    fn unsorted_and_duplicate_tx_ids_are_hostile() {
        let a = wallet(b"alice", None);
        let d = wallet(b"dora", None);
        let b = wallet(b"bob", None);
        let ca = wallet(b"alice-change", None);
        let cd = wallet(b"dora-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[
            LedgerEntry { addr: a.addr, balance: 501_000u64.to_le_bytes() },
            LedgerEntry { addr: d.addr, balance: 501_000u64.to_le_bytes() },
        ]);
        let tx1 = signed_tx(&a, &b.addr, &ca.addr, 1_000, 499_500);
        let tx2 = signed_tx(&d, &b.addr, &cd.addr, 2_000, 498_500);
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx1.clone(), tx2.clone()]);

        // Swap the two records in place; the Merkle root still matches
        // the file the miner built, so the order check fires first.
        let mut bytes = std::fs::read(&fx.block).unwrap();
        let (r1, r2) = (BLOCK_HEADER_LEN, BLOCK_HEADER_LEN + TX_RECORD_LEN);
        let first: Vec<u8> = bytes[r1..r1 + TX_RECORD_LEN].to_vec();
        bytes.copy_within(r2..r2 + TX_RECORD_LEN, r1);
        bytes[r2..r2 + TX_RECORD_LEN].copy_from_slice(&first);
        std::fs::write(&fx.block, &bytes).unwrap();

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Hostile("transaction ids unsorted")));

        // A duplicated record is a replay within the block.
        let dup = if tx1.tx_id < tx2.tx_id { tx1 } else { tx2 };
        build_block(&fx.block, &fx.tip, &miner.addr, vec![dup.clone(), dup]);
        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Hostile("duplicate transaction id")));
    }

    #[test]
    fn forged_signature_is_hostile() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let mut tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        // Re-point the spend after signing.
        tx.send_total = 400_000u64.to_le_bytes();
        tx.change_total = 100_500u64.to_le_bytes();
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Hostile("one-time signature failed")));
    }

    #[test]
    fn insufficient_balance_is_invalid() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 400_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("insufficient source balance")));
    }

    #[test]
    fn amount_overflow_is_invalid() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        // send + change wraps past 64 bits before the fee is even added.
        let tx = signed_tx(&a, &b.addr, &c.addr, u64::MAX, 1);
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("transaction total overflow")));
    }

    #[test]
    fn wrong_fee_is_invalid() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let mut tx = TxRecord {
            src_addr: a.addr,
            dst_addr: b.addr,
            chg_addr: c.addr,
            send_total: 1_000u64.to_le_bytes(),
            change_total: 499_501u64.to_le_bytes(),
            tx_fee: 499u64.to_le_bytes(),
            signature: [0u8; TX_SIG_LEN],
            tx_id: [0u8; HASH_LEN],
        };
        let message = tx.sig_message();
        tx.signature = wots::sign(&message, &a.secret, &a.addr.pub_seed(), &a.addr.addr_seed());
        tx.tx_id = tx.compute_id();
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("bad transaction fee")));
    }

    #[test]
    fn tag_hijack_is_invalid() {
        let t1 = [0x01u8; TAG_LEN];
        let mut t2 = [0x02u8; TAG_LEN];
        t2[0] = 0x01;

        let a = wallet(b"alice", Some(t1));
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", Some(t2));
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("tag binding rejected")));
    }

    #[test]
    fn wrong_reward_is_invalid() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        let bt = build_block(&fx.block, &fx.tip, &miner.addr, vec![tx.clone()]);

        // Rewrite the header with an inflated reward and re-derive the
        // hashes so only the reward check can fire.
        let header = BlockHeader {
            maddr: miner.addr,
            mreward: (mining_reward(&bt.bnum).to_u64() + 1).to_le_bytes(),
        };
        let mut patched = bt.clone();
        let txs = [tx];
        let (_, bhash) = compute_hashes(&header, &txs, &patched);
        patched.bhash = bhash;
        write_block(&fx.block, &header, &txs, &patched).unwrap();

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("bad mining reward")));
    }

    #[test]
    fn stale_tip_fields_are_invalid() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        // A tip one block ahead: the candidate now chains to the past.
        let mut moved = fx.tip.clone();
        moved.bnum = 2u64.to_le_bytes();
        let mut ledger = Ledger::open(&fx.paths.ledger()).unwrap();
        let tags = TagIndex::build(&mut ledger).unwrap();
        let err = validate_block(&fx.block, &moved, &mut ledger, &tags, &fx.paths).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("bad block number")));

        // Same number, different hash: a fork.
        let mut forked = fx.tip.clone();
        forked.bhash = sha256(b"other branch");
        let err = validate_block(&fx.block, &forked, &mut ledger, &tags, &fx.paths).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("previous hash mismatch")));
    }

    #[test]
    fn solve_time_must_be_strictly_later() {
        let a = wallet(b"alice", None);
        let b = wallet(b"bob", None);
        let c = wallet(b"alice-change", None);
        let miner = wallet(b"miner", None);

        let fx = fixture(&[LedgerEntry {
            addr: a.addr,
            balance: 501_000u64.to_le_bytes(),
        }]);
        let tx = signed_tx(&a, &b.addr, &c.addr, 1_000, 499_500);
        build_block(&fx.block, &fx.tip, &miner.addr, vec![tx]);

        // Patch stime == time0 in the trailer.
        let mut bytes = std::fs::read(&fx.block).unwrap();
        let stime_at = bytes.len() - BLOCK_TRAILER_LEN + 32 + 8 + 8 + 4 + 4 + 4 + 32 + 32;
        bytes[stime_at..stime_at + 4].copy_from_slice(&fx.tip.time0.to_le_bytes());
        std::fs::write(&fx.block, &bytes).unwrap();

        let err = validate(&fx).unwrap_err();
        assert!(matches!(err, ValidateError::Invalid("block time too early")));
    }

    #[test]
    fn max_block_transactions_are_accepted_in_shape() {
        // Building MAXBLTX real transactions is out of reach for a unit
        // test; check the boundary arithmetic instead.
        assert!(MAXBLTX > 0);
        let expected = BLOCK_HEADER_LEN as u64
            + MAXBLTX as u64 * TX_RECORD_LEN as u64
            + BLOCK_TRAILER_LEN as u64;
        assert_eq!(expected, 2220 + 32768u64 * 8824 + 160);
    }
}
