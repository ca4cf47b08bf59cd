//! Ledger delta records and the atomic transition applier.
//!
//! Validation emits one delta per movement of funds into a temp file.
//! The file is then sorted by (address, op); ASCII `'+'` sorts before
//! `'-'`, so credits for an address apply before its debits. The
//! applier merges the sorted file against the old ledger into a fresh
//! file, committed by rename. A crash at any point leaves either the
//! old or the new ledger, never a blend.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::arith::{add64, cmp64, sub64, Value64};
use crate::blockchain::block::Address;
use crate::config::{DELTA_RECORD_LEN, Paths, TX_ADDR_LEN};
use crate::database::ledger::{Ledger, LedgerEntry, LedgerLock};
use crate::error::{Result, ValidateError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaOp {
    Credit,
    Debit,
}

impl DeltaOp {
    pub fn to_byte(self) -> u8 {
        match self {
            DeltaOp::Credit => b'+',
            DeltaOp::Debit => b'-',
        }
    }

    pub fn from_byte(b: u8) -> Option<DeltaOp> {
        match b {
            b'+' => Some(DeltaOp::Credit),
            b'-' => Some(DeltaOp::Debit),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Delta {
    pub addr: Address,
    pub op: DeltaOp,
    pub amount: [u8; 8],
}

impl Delta {
    pub fn credit(addr: Address, amount: Value64) -> Delta {
        Delta {
            addr,
            op: DeltaOp::Credit,
            amount: amount.to_bytes(),
        }
    }

    pub fn debit(addr: Address, amount: Value64) -> Delta {
        Delta {
            addr,
            op: DeltaOp::Debit,
            amount: amount.to_bytes(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DELTA_RECORD_LEN);
        out.extend_from_slice(&self.addr.0);
        out.push(self.op.to_byte());
        out.extend_from_slice(&self.amount);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Delta> {
        if buf.len() != DELTA_RECORD_LEN {
            return None;
        }
        let addr = Address::from_slice(&buf[..TX_ADDR_LEN])?;
        let op = DeltaOp::from_byte(buf[TX_ADDR_LEN])?;
        let mut amount = [0u8; 8];
        amount.copy_from_slice(&buf[TX_ADDR_LEN + 1..]);
        Some(Delta { addr, op, amount })
    }

    /// Flip credit to debit and back; reapplying negated deltas rolls a
    /// block back.
    pub fn negated(&self) -> Delta {
        Delta {
            addr: self.addr,
            op: match self.op {
                DeltaOp::Credit => DeltaOp::Debit,
                DeltaOp::Debit => DeltaOp::Credit,
            },
            amount: self.amount,
        }
    }

    fn sort_key(&self) -> (&[u8; TX_ADDR_LEN], u8) {
        (&self.addr.0, self.op.to_byte())
    }
}

/// Streaming writer for the unsorted delta temp file.
pub struct DeltaWriter {
    out: BufWriter<File>,
}

impl DeltaWriter {
    pub fn create(path: &Path) -> io::Result<DeltaWriter> {
        Ok(DeltaWriter {
            out: BufWriter::new(File::create(path)?),
        })
    }

    pub fn append(&mut self, delta: &Delta) -> io::Result<()> {
        self.out.write_all(&delta.to_bytes())
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()
    }
}

pub fn read_deltas(path: &Path) -> io::Result<Vec<Delta>> {
    let mut fp = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    let mut buf = vec![0u8; DELTA_RECORD_LEN];
    loop {
        match fp.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        out.push(Delta::from_bytes(&buf).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "bad delta op byte")
        })?);
    }
    Ok(out)
}

pub fn write_deltas(path: &Path, deltas: &[Delta]) -> io::Result<()> {
    let mut w = DeltaWriter::create(path)?;
    for d in deltas {
        w.append(d)?;
    }
    w.finish()
}

/// Sort the temp file into the final delta file and remove the temp.
/// The sort is stable, so records with equal (address, op) keep their
/// emission order.
pub fn sort_deltas(tmp: &Path, sorted: &Path) -> io::Result<()> {
    let mut deltas = read_deltas(tmp)?;
    deltas.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    write_deltas(sorted, &deltas)?;
    std::fs::remove_file(tmp)
}

/// Apply the sorted delta file to the ledger, atomically.
///
/// The old ledger and the delta file are walked in lock-step; per
/// address, all deltas are folded into the old balance (credits first by
/// sort order). A zero final balance drops the entry; a credit to an
/// unknown address inserts one. Any overflow or underflow aborts with
/// the old ledger untouched.
pub fn apply(paths: &Paths) -> Result<()> {
    let _lock = LedgerLock::acquire(&paths.ledger_lock(), std::time::Duration::from_secs(10))?;

    let deltas = read_deltas(&paths.delta())?;
    debug_assert!(deltas
        .windows(2)
        .all(|w| w[0].sort_key() <= w[1].sort_key()));

    let mut old = LedgerStream::open(&paths.ledger())?;
    let tmp_path = paths.ledger_tmp();
    let mut out = BufWriter::new(File::create(&tmp_path)?);

    let mut di = 0usize;
    let write_result: Result<()> = (|| {
        loop {
            let old_addr = old.peek()?.map(|e| e.addr);
            let delta_addr = deltas.get(di).map(|d| d.addr);

            let addr = match (old_addr, delta_addr) {
                (None, None) => break,
                (Some(a), None) => a,
                (None, Some(d)) => d,
                (Some(a), Some(d)) => a.min(d),
            };

            let mut balance = Value64::zero();
            if old_addr == Some(addr) {
                let entry = old.next()?.expect("peeked");
                balance = entry.balance_value();
            }

            while di < deltas.len() && deltas[di].addr == addr {
                let amount = Value64::from_bytes(&deltas[di].amount);
                match deltas[di].op {
                    DeltaOp::Credit => {
                        let mut sum = Value64::zero();
                        if add64(balance, amount, &mut sum) {
                            return Err(ValidateError::fault("balance overflow in applier"));
                        }
                        balance = sum;
                    }
                    DeltaOp::Debit => {
                        if cmp64(amount, balance) == std::cmp::Ordering::Greater {
                            return Err(ValidateError::fault("balance underflow in applier"));
                        }
                        let mut diff = Value64::zero();
                        sub64(balance, amount, &mut diff);
                        balance = diff;
                    }
                }
                di += 1;
            }

            if !balance.is_zero() {
                let entry = LedgerEntry {
                    addr,
                    balance: balance.to_bytes(),
                };
                out.write_all(&entry.to_bytes())?;
            }
        }
        Ok(())
    })();

    if let Err(e) = write_result {
        drop(out);
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    out.flush().map_err(ValidateError::from)?;
    out.get_ref().sync_all().map_err(ValidateError::from)?;
    drop(out);
    std::fs::rename(&tmp_path, paths.ledger()).map_err(ValidateError::from)?;
    Ok(())
}

/// Sequential reader over the old ledger with one entry of lookahead.
struct LedgerStream {
    reader: BufReader<File>,
    lookahead: Option<LedgerEntry>,
    primed: bool,
}

impl LedgerStream {
    fn open(path: &Path) -> io::Result<LedgerStream> {
        // Validate the length up front.
        Ledger::open(path)?;
        Ok(LedgerStream {
            reader: BufReader::new(File::open(path)?),
            lookahead: None,
            primed: false,
        })
    }

    fn prime(&mut self) -> io::Result<()> {
        if !self.primed {
            self.lookahead = self.read_one()?;
            self.primed = true;
        }
        Ok(())
    }

    fn read_one(&mut self) -> io::Result<Option<LedgerEntry>> {
        let mut buf = vec![0u8; crate::config::LEDGER_ENTRY_LEN];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => Ok(Some(LedgerEntry::from_bytes(&buf).expect("length checked"))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn peek(&mut self) -> io::Result<Option<&LedgerEntry>> {
        self.prime()?;
        Ok(self.lookahead.as_ref())
    }

    fn next(&mut self) -> io::Result<Option<LedgerEntry>> {
        self.prime()?;
        let current = self.lookahead.take();
        self.lookahead = self.read_one()?;
        Ok(current)
    }
}
