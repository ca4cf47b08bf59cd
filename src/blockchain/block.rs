//! On-disk block model: fixed header, canonical transaction records, and
//! the fixed trailer that chains blocks together.
//!
//! Layout is bit-exact and little-endian throughout:
//!
//! `hdrlen u32 ‖ miner address ‖ miner reward` then `tcount` transaction
//! records, then the 160-byte trailer. The trailer sits exactly
//! `BLOCK_TRAILER_LEN` before EOF so a verifier can read the chaining
//! hash before touching the body.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::{
    BLOCK_HEADER_LEN, BLOCK_TRAILER_LEN, HASH_LEN, SIG_HASH_LEN, TAG_LEN, TAG_OFFSET,
    TX_ADDR_LEN, TX_RECORD_LEN, TX_SIG_LEN, NOTAG_BYTE,
};
use crate::crypto::sha256;

/// A full 2208-byte address: the WOTS key vector, a 32-byte public seed,
/// and a 32-byte hash-address seed whose trailing 12 bytes overlay the
/// optional tag.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; TX_ADDR_LEN]);

impl Address {
    pub fn zero() -> Self {
        Address([0u8; TX_ADDR_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; TX_ADDR_LEN] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != TX_ADDR_LEN {
            return None;
        }
        let mut a = [0u8; TX_ADDR_LEN];
        a.copy_from_slice(bytes);
        Some(Address(a))
    }

    /// WOTS verification key vector.
    pub fn key_vector(&self) -> &[u8] {
        &self.0[..TX_SIG_LEN]
    }

    /// Seed keying the WOTS chain function.
    pub fn pub_seed(&self) -> [u8; 32] {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0[TX_SIG_LEN..TX_SIG_LEN + 32]);
        s
    }

    /// Seed for the WOTS hash addressing scheme.
    pub fn addr_seed(&self) -> [u8; 32] {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0[TX_SIG_LEN + 32..TX_SIG_LEN + 64]);
        s
    }

    pub fn tag(&self) -> &[u8] {
        &self.0[TAG_OFFSET..TAG_OFFSET + TAG_LEN]
    }

    pub fn has_tag(&self) -> bool {
        self.0[TAG_OFFSET] != NOTAG_BYTE
    }

    /// Mark the address as untagged.
    pub fn clear_tag(&mut self) {
        self.0[TAG_OFFSET] = NOTAG_BYTE;
    }

    pub fn set_tag(&mut self, tag: &[u8; TAG_LEN]) {
        self.0[TAG_OFFSET..TAG_OFFSET + TAG_LEN].copy_from_slice(tag);
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({}..)", hex::encode(&self.0[..4]))
    }
}

/// One canonical in-block transaction record.
#[derive(Clone)]
pub struct TxRecord {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub chg_addr: Address,
    pub send_total: [u8; 8],
    pub change_total: [u8; 8],
    pub tx_fee: [u8; 8],
    pub signature: [u8; TX_SIG_LEN],
    pub tx_id: [u8; HASH_LEN],
}

impl TxRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TX_RECORD_LEN);
        out.extend_from_slice(&self.src_addr.0);
        out.extend_from_slice(&self.dst_addr.0);
        out.extend_from_slice(&self.chg_addr.0);
        out.extend_from_slice(&self.send_total);
        out.extend_from_slice(&self.change_total);
        out.extend_from_slice(&self.tx_fee);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.tx_id);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<TxRecord> {
        if buf.len() != TX_RECORD_LEN {
            return None;
        }
        let (a0, a1, a2) = (0, TX_ADDR_LEN, TX_ADDR_LEN * 2);
        let amounts = TX_ADDR_LEN * 3;
        let sig_at = amounts + 24;
        let id_at = sig_at + TX_SIG_LEN;

        let src_addr = Address::from_slice(&buf[a0..a0 + TX_ADDR_LEN])?;
        let dst_addr = Address::from_slice(&buf[a1..a1 + TX_ADDR_LEN])?;
        let chg_addr = Address::from_slice(&buf[a2..a2 + TX_ADDR_LEN])?;
        let mut send_total = [0u8; 8];
        send_total.copy_from_slice(&buf[amounts..amounts + 8]);
        let mut change_total = [0u8; 8];
        change_total.copy_from_slice(&buf[amounts + 8..amounts + 16]);
        let mut tx_fee = [0u8; 8];
        tx_fee.copy_from_slice(&buf[amounts + 16..amounts + 24]);
        let mut signature = [0u8; TX_SIG_LEN];
        signature.copy_from_slice(&buf[sig_at..sig_at + TX_SIG_LEN]);
        let mut tx_id = [0u8; HASH_LEN];
        tx_id.copy_from_slice(&buf[id_at..id_at + HASH_LEN]);
        Some(TxRecord {
            src_addr,
            dst_addr,
            chg_addr,
            send_total,
            change_total,
            tx_fee,
            signature,
            tx_id,
        })
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<TxRecord> {
        let mut buf = vec![0u8; TX_RECORD_LEN];
        r.read_exact(&mut buf)?;
        Ok(TxRecord::from_bytes(&buf).expect("length checked"))
    }

    /// Digest covered by the one-time signature: the leading bytes of the
    /// record, signature and id excluded.
    pub fn sig_message(&self) -> [u8; 32] {
        let bytes = self.to_bytes();
        sha256(&bytes[..SIG_HASH_LEN])
    }

    /// The canonical transaction id: SHA-256 of the source address.
    pub fn compute_id(&self) -> [u8; HASH_LEN] {
        sha256(&self.src_addr.0)
    }
}

/// The fixed block header (after the 4-byte header-length field).
#[derive(Clone)]
pub struct BlockHeader {
    pub maddr: Address,
    pub mreward: [u8; 8],
}

impl BlockHeader {
    /// Serialize including the leading header-length field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_HEADER_LEN);
        out.extend_from_slice(&(BLOCK_HEADER_LEN as u32).to_le_bytes());
        out.extend_from_slice(&self.maddr.0);
        out.extend_from_slice(&self.mreward);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<BlockHeader> {
        if buf.len() != BLOCK_HEADER_LEN {
            return None;
        }
        let maddr = Address::from_slice(&buf[4..4 + TX_ADDR_LEN])?;
        let mut mreward = [0u8; 8];
        mreward.copy_from_slice(&buf[4 + TX_ADDR_LEN..]);
        Some(BlockHeader { maddr, mreward })
    }
}

/// The fixed trailer at the end of every block file. Fields stay in wire
/// form; accessors decode the little-endian scalars.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockTrailer {
    pub phash: [u8; HASH_LEN],
    pub bnum: [u8; 8],
    pub mfee: [u8; 8],
    pub tcount: [u8; 4],
    pub time0: [u8; 4],
    pub difficulty: [u8; 4],
    pub mroot: [u8; HASH_LEN],
    pub nonce: [u8; HASH_LEN],
    pub stime: [u8; 4],
    pub bhash: [u8; HASH_LEN],
}

impl BlockTrailer {
    pub fn zero() -> Self {
        BlockTrailer {
            phash: [0; HASH_LEN],
            bnum: [0; 8],
            mfee: [0; 8],
            tcount: [0; 4],
            time0: [0; 4],
            difficulty: [0; 4],
            mroot: [0; HASH_LEN],
            nonce: [0; HASH_LEN],
            stime: [0; 4],
            bhash: [0; HASH_LEN],
        }
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_TRAILER_LEN] {
        let mut out = [0u8; BLOCK_TRAILER_LEN];
        let mut at = 0;
        let mut put = |bytes: &[u8]| {
            out[at..at + bytes.len()].copy_from_slice(bytes);
            at += bytes.len();
        };
        put(&self.phash);
        put(&self.bnum);
        put(&self.mfee);
        put(&self.tcount);
        put(&self.time0);
        put(&self.difficulty);
        put(&self.mroot);
        put(&self.nonce);
        put(&self.stime);
        put(&self.bhash);
        out
    }

    pub fn from_bytes(buf: &[u8; BLOCK_TRAILER_LEN]) -> BlockTrailer {
        let mut t = BlockTrailer::zero();
        let mut at = 0;
        let mut get = |bytes: &mut [u8]| {
            let n = bytes.len();
            bytes.copy_from_slice(&buf[at..at + n]);
            at += n;
        };
        get(&mut t.phash);
        get(&mut t.bnum);
        get(&mut t.mfee);
        get(&mut t.tcount);
        get(&mut t.time0);
        get(&mut t.difficulty);
        get(&mut t.mroot);
        get(&mut t.nonce);
        get(&mut t.stime);
        get(&mut t.bhash);
        t
    }

    /// The bytes covered by the block hash: everything except `bhash`.
    pub fn hashed_bytes(&self) -> [u8; BLOCK_TRAILER_LEN - HASH_LEN] {
        let all = self.to_bytes();
        let mut out = [0u8; BLOCK_TRAILER_LEN - HASH_LEN];
        out.copy_from_slice(&all[..BLOCK_TRAILER_LEN - HASH_LEN]);
        out
    }

    pub fn tcount(&self) -> u32 {
        u32::from_le_bytes(self.tcount)
    }

    pub fn time0(&self) -> u32 {
        u32::from_le_bytes(self.time0)
    }

    pub fn difficulty(&self) -> u32 {
        u32::from_le_bytes(self.difficulty)
    }

    pub fn stime(&self) -> u32 {
        u32::from_le_bytes(self.stime)
    }

    /// True when the block number's low 16 bits are zero: a neogenesis
    /// block that rolls the epoch and carries no transactions.
    pub fn is_neogenesis(&self) -> bool {
        self.bnum[0] == 0 && self.bnum[1] == 0
    }
}

/// True when the low 16 bits of a block number are zero.
pub fn bnum_is_neogenesis(bnum: &[u8; 8]) -> bool {
    bnum[0] == 0 && bnum[1] == 0
}

/// Seek to the end of `path` and read the trailer.
pub fn read_trailer(path: &Path) -> io::Result<BlockTrailer> {
    let mut fp = File::open(path)?;
    fp.seek(SeekFrom::End(-(BLOCK_TRAILER_LEN as i64)))?;
    let mut buf = [0u8; BLOCK_TRAILER_LEN];
    fp.read_exact(&mut buf)?;
    Ok(BlockTrailer::from_bytes(&buf))
}

/// Append a committed trailer to the trailer history file.
pub fn append_trailer(history: &Path, bt: &BlockTrailer) -> io::Result<()> {
    let mut fp = OpenOptions::new().create(true).append(true).open(history)?;
    fp.write_all(&bt.to_bytes())?;
    fp.sync_all()
}

/// Iterate the trailer history in file order.
pub fn scan_trailers(history: &Path) -> io::Result<Vec<BlockTrailer>> {
    let mut fp = File::open(history)?;
    let len = fp.metadata()?.len();
    if len % BLOCK_TRAILER_LEN as u64 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "trailer history length not a multiple of the trailer size",
        ));
    }
    let mut out = Vec::with_capacity((len / BLOCK_TRAILER_LEN as u64) as usize);
    let mut buf = [0u8; BLOCK_TRAILER_LEN];
    for _ in 0..len / BLOCK_TRAILER_LEN as u64 {
        fp.read_exact(&mut buf)?;
        out.push(BlockTrailer::from_bytes(&buf));
    }
    Ok(out)
}

/// Verify the `prev-hash` chain over a trailer history and recompute the
/// cumulative weight of its non-neogenesis entries.
pub fn audit_trailers(history: &Path) -> io::Result<Option<[u8; 32]>> {
    let trailers = scan_trailers(history)?;
    let mut weight = [0u8; 32];
    for pair in trailers.windows(2) {
        if pair[1].phash != pair[0].bhash {
            return Ok(None);
        }
    }
    for bt in &trailers {
        if !bt.is_neogenesis() {
            crate::consensus::difficulty::add_weight(&mut weight, bt.difficulty());
        }
    }
    Ok(Some(weight))
}

/// Write a complete block file: header, transactions, trailer.
pub fn write_block(
    path: &Path,
    header: &BlockHeader,
    txs: &[TxRecord],
    trailer: &BlockTrailer,
) -> io::Result<()> {
    let mut fp = File::create(path)?;
    fp.write_all(&header.to_bytes())?;
    for tx in txs {
        fp.write_all(&tx.to_bytes())?;
    }
    fp.write_all(&trailer.to_bytes())?;
    fp.sync_all()
}

/// Compute the Merkle root (running SHA-256 over the canonical
/// transaction bytes) and the block hash for a body being assembled.
pub fn compute_hashes(
    header: &BlockHeader,
    txs: &[TxRecord],
    trailer: &BlockTrailer,
) -> ([u8; 32], [u8; 32]) {
    let mut mctx = Sha256::new();
    let mut bctx = Sha256::new();
    bctx.update(header.to_bytes());
    for tx in txs {
        let bytes = tx.to_bytes();
        mctx.update(&bytes);
        bctx.update(&bytes);
    }
    let mroot: [u8; 32] = mctx.finalize().into();
    bctx.update(trailer.hashed_bytes());
    let bhash: [u8; 32] = bctx.finalize().into();
    (mroot, bhash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn addr(seed: u8) -> Address {
        let mut a = Address([seed; TX_ADDR_LEN]);
        a.clear_tag();
        a
    }

    fn sample_tx() -> TxRecord {
        TxRecord {
            src_addr: addr(1),
            dst_addr: addr(2),
            chg_addr: addr(3),
            send_total: 1000u64.to_le_bytes(),
            change_total: 499_500u64.to_le_bytes(),
            tx_fee: 500u64.to_le_bytes(),
            signature: [7u8; TX_SIG_LEN],
            tx_id: sha256(&[1u8; TX_ADDR_LEN]),
        }
    }

    #[test]
    fn tx_record_roundtrips() {
        let tx = sample_tx();
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), TX_RECORD_LEN);
        let back = TxRecord::from_bytes(&bytes).unwrap();
        assert_eq!(back.to_bytes(), bytes);
    }

    #[test]
    fn tx_id_is_hash_of_source() {
        let tx = sample_tx();
        assert_eq!(tx.compute_id(), sha256(tx.src_addr.as_bytes()));
        assert_eq!(tx.compute_id(), tx.tx_id);
    }

    #[test]
    fn sig_message_ignores_signature_bytes() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.signature = [9u8; TX_SIG_LEN];
        assert_eq!(tx.sig_message(), other.sig_message());

        let mut moved = tx.clone();
        moved.send_total = 999u64.to_le_bytes();
        assert_ne!(tx.sig_message(), moved.sig_message());
    }

    #[test]
    fn trailer_roundtrips_and_reads_from_eof() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bc");

        let mut bt = BlockTrailer::zero();
        bt.bnum = 2u64.to_le_bytes();
        bt.tcount = 1u32.to_le_bytes();
        bt.difficulty = 4u32.to_le_bytes();
        bt.bhash = sha256(b"tip");

        let header = BlockHeader {
            maddr: addr(9),
            mreward: 5_000_056_000u64.to_le_bytes(),
        };
        write_block(&path, &header, &[sample_tx()], &bt).unwrap();

        let back = read_trailer(&path).unwrap();
        assert_eq!(back, bt);
        assert_eq!(back.tcount(), 1);
        assert_eq!(back.difficulty(), 4);
    }

    #[test]
    fn neogenesis_is_low_sixteen_bits() {
        let mut bt = BlockTrailer::zero();
        bt.bnum = 0x10000u64.to_le_bytes();
        assert!(bt.is_neogenesis());
        bt.bnum = 0x10001u64.to_le_bytes();
        assert!(!bt.is_neogenesis());
        bt.bnum = 0x100u64.to_le_bytes();
        assert!(!bt.is_neogenesis());
    }

    #[test]
    fn tag_accessors() {
        let mut a = addr(5);
        assert!(!a.has_tag());
        let tag = [1u8; TAG_LEN];
        a.set_tag(&tag);
        assert!(a.has_tag());
        assert_eq!(a.tag(), &tag);
    }

    #[test]
    fn trailer_history_appends_and_audits() {
        let dir = tempdir().unwrap();
        let hist = dir.path().join("trailers.dat");

        let mut a = BlockTrailer::zero();
        a.bnum = 1u64.to_le_bytes();
        a.difficulty = 1u32.to_le_bytes();
        a.bhash = sha256(b"a");

        let mut b = BlockTrailer::zero();
        b.bnum = 2u64.to_le_bytes();
        b.difficulty = 2u32.to_le_bytes();
        b.phash = a.bhash;
        b.bhash = sha256(b"b");

        append_trailer(&hist, &a).unwrap();
        append_trailer(&hist, &b).unwrap();

        let weight = audit_trailers(&hist).unwrap().expect("chained");
        // 2^1 + 2^2
        assert_eq!(weight[0], 6);

        // Break the chain.
        let mut c = BlockTrailer::zero();
        c.bnum = 3u64.to_le_bytes();
        c.phash = sha256(b"unrelated");
        append_trailer(&hist, &c).unwrap();
        assert!(audit_trailers(&hist).unwrap().is_none());
    }
}
