//! The ledger: a flat file of fixed-size (address, balance) entries,
//! strictly ascending by address. Point lookup is a binary search over
//! the file; bulk mutation happens only through the delta applier, which
//! rewrites the file end-to-end and swaps it in by rename.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::arith::Value64;
use crate::blockchain::block::Address;
use crate::config::{LEDGER_ENTRY_LEN, TX_ADDR_LEN};

#[derive(Clone, Debug)]
pub struct LedgerEntry {
    pub addr: Address,
    pub balance: [u8; 8],
}

impl LedgerEntry {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LEDGER_ENTRY_LEN);
        out.extend_from_slice(&self.addr.0);
        out.extend_from_slice(&self.balance);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<LedgerEntry> {
        if buf.len() != LEDGER_ENTRY_LEN {
            return None;
        }
        let addr = Address::from_slice(&buf[..TX_ADDR_LEN])?;
        let mut balance = [0u8; 8];
        balance.copy_from_slice(&buf[TX_ADDR_LEN..]);
        Some(LedgerEntry { addr, balance })
    }

    pub fn balance_value(&self) -> Value64 {
        Value64::from_bytes(&self.balance)
    }
}

/// Read handle over the sorted ledger file.
pub struct Ledger {
    file: File,
    entries: u64,
}

impl Ledger {
    pub fn open(path: &Path) -> io::Result<Ledger> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len % LEDGER_ENTRY_LEN as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "ledger length is not a multiple of the entry size",
            ));
        }
        Ok(Ledger {
            file,
            entries: len / LEDGER_ENTRY_LEN as u64,
        })
    }

    pub fn len(&self) -> u64 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn entry_at(&mut self, idx: u64) -> io::Result<LedgerEntry> {
        if idx >= self.entries {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "entry index out of range"));
        }
        self.file
            .seek(SeekFrom::Start(idx * LEDGER_ENTRY_LEN as u64))?;
        let mut buf = vec![0u8; LEDGER_ENTRY_LEN];
        self.file.read_exact(&mut buf)?;
        Ok(LedgerEntry::from_bytes(&buf).expect("length checked"))
    }

    /// Binary search for an address. Returns the entry and its index.
    pub fn find(&mut self, addr: &Address) -> io::Result<Option<(LedgerEntry, u64)>> {
        let mut lo = 0u64;
        let mut hi = self.entries;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = self.entry_at(mid)?;
            match entry.addr.cmp(addr) {
                std::cmp::Ordering::Equal => return Ok(Some((entry, mid))),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(None)
    }

    /// Balance lookup backing the BALANCE wire query.
    pub fn balance(&mut self, addr: &Address) -> io::Result<Option<Value64>> {
        Ok(self.find(addr)?.map(|(e, _)| e.balance_value()))
    }
}

/// Write a fresh ledger file from sorted entries, enforcing the store
/// invariants: strictly ascending addresses and positive balances.
pub fn write_ledger(path: &Path, entries: &[LedgerEntry]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut prev: Option<&Address> = None;
    for entry in entries {
        if entry.balance_value().is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "zero-balance ledger entry",
            ));
        }
        if let Some(p) = prev {
            if *p >= entry.addr {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "ledger entries out of order",
                ));
            }
        }
        prev = Some(&entry.addr);
        out.write_all(&entry.to_bytes())?;
    }
    out.flush()?;
    out.get_ref().sync_all()
}

/// Advisory exclusive lock guarding ledger rebuild and rename. Held for
/// the lifetime of the value.
pub struct LedgerLock {
    #[allow(dead_code)]
    file: File,
}

impl LedgerLock {
    /// Block until the lock is free, up to `timeout`.
    pub fn acquire(path: &Path, timeout: Duration) -> io::Result<LedgerLock> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let deadline = Instant::now() + timeout;
        loop {
            if try_flock(&file)? {
                return Ok(LedgerLock { file });
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "ledger lock held too long",
                ));
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

#[cfg(unix)]
fn try_flock(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn try_flock(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(unix)]
impl Drop for LedgerLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
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

    fn entry(seed: u8, balance: u64) -> LedgerEntry {
        LedgerEntry {
            addr: addr(seed),
            balance: balance.to_le_bytes(),
        }
    }

    #[test]
    fn find_hits_and_misses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.dat");
        write_ledger(&path, &[entry(1, 10), entry(3, 30), entry(5, 50)]).unwrap();

        let mut ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.len(), 3);

        let (found, idx) = ledger.find(&addr(3)).unwrap().expect("present");
        assert_eq!(found.balance_value().to_u64(), 30);
        assert_eq!(idx, 1);

        assert!(ledger.find(&addr(2)).unwrap().is_none());
        assert!(ledger.find(&addr(9)).unwrap().is_none());
        assert_eq!(ledger.balance(&addr(5)).unwrap().unwrap().to_u64(), 50);
    }

    #[test]
    fn write_rejects_invariant_breaches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.dat");

        let err = write_ledger(&path, &[entry(3, 30), entry(1, 10)]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err = write_ledger(&path, &[entry(1, 0)]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        // Duplicate addresses are also out of order.
        let err = write_ledger(&path, &[entry(1, 1), entry(1, 2)]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn open_rejects_torn_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.dat");
        std::fs::write(&path, vec![0u8; LEDGER_ENTRY_LEN + 7]).unwrap();
        assert!(Ledger::open(&path).is_err());
    }

    #[test]
    fn lock_excludes_second_holder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txq1.lck");

        let held = LedgerLock::acquire(&path, Duration::from_secs(1)).unwrap();
        // flock is per-open-file; a second handle in the same process
        // still observes the exclusion on unix.
        #[cfg(unix)]
        {
            let again = LedgerLock::acquire(&path, Duration::from_millis(120));
            assert!(again.is_err());
        }
        drop(held);
        LedgerLock::acquire(&path, Duration::from_secs(1)).unwrap();
    }
}
