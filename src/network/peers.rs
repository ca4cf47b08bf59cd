//! Peer bookkeeping: bounded rings of recent and current peers, the
//! per-epoch pink list, and the duplicate-transaction fingerprint ring.
//!
//! All rings overwrite their oldest slot on overflow. Writers are the
//! ingress workers; the controller only reads.

use std::io;
use std::net::Ipv4Addr;
use std::path::Path;

use rand::Rng;

use crate::config::{CPLIST_LEN, EPINK_LEN, EPOCHMASK, FPLIST_LEN, RPLIST_LEN};
use crate::crypto::sha256;

/// Fixed-capacity ring of peer addresses.
#[derive(Debug, Clone)]
pub struct PeerRing {
    cap: usize,
    list: Vec<Ipv4Addr>,
    next: usize,
}

impl PeerRing {
    pub fn new(cap: usize) -> PeerRing {
        PeerRing {
            cap,
            list: Vec::with_capacity(cap),
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.list.contains(&ip)
    }

    /// Insert, deduplicating; a full ring overwrites the oldest entry.
    pub fn add(&mut self, ip: Ipv4Addr) {
        if ip.is_unspecified() || self.contains(ip) {
            return;
        }
        if self.list.len() < self.cap {
            self.list.push(ip);
        } else {
            if self.next >= self.cap {
                self.next = 0;
            }
            self.list[self.next] = ip;
            self.next += 1;
        }
    }

    pub fn remove(&mut self, ip: Ipv4Addr) -> bool {
        match self.list.iter().position(|&p| p == ip) {
            Some(at) => {
                self.list.swap_remove(at);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.next = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.list.iter().copied()
    }

    /// Durstenfeld shuffle, used to randomize fetch order.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        for i in (1..self.list.len()).rev() {
            let j = rng.gen_range(0..=i);
            self.list.swap(i, j);
        }
    }

    /// Persist as packed 4-byte addresses.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut out = Vec::with_capacity(self.list.len() * 4);
        for ip in &self.list {
            out.extend_from_slice(&ip.octets());
        }
        std::fs::write(path, out)
    }

    pub fn load(path: &Path, cap: usize) -> io::Result<PeerRing> {
        let bytes = std::fs::read(path)?;
        let mut ring = PeerRing::new(cap);
        for chunk in bytes.chunks_exact(4) {
            ring.add(Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]));
        }
        Ok(ring)
    }
}

/// The three peer lists the controller consults.
#[derive(Debug, Clone)]
pub struct Peers {
    pub recent: PeerRing,
    pub current: PeerRing,
    pink: PeerRing,
}

impl Peers {
    pub fn new() -> Peers {
        Peers {
            recent: PeerRing::new(RPLIST_LEN),
            current: PeerRing::new(CPLIST_LEN),
            pink: PeerRing::new(EPINK_LEN),
        }
    }

    /// Mark a peer hostile for the current epoch.
    pub fn pinklist(&mut self, ip: Ipv4Addr) {
        log::warn!("pinklisting {ip}");
        self.pink.add(ip);
        self.recent.remove(ip);
        self.current.remove(ip);
    }

    pub fn is_pinklisted(&self, ip: Ipv4Addr) -> bool {
        self.pink.contains(ip)
    }

    /// Called on every commit; the pink list empties when the epoch
    /// counter rolls.
    pub fn epoch_roll(&mut self, bnum: &[u8; 8]) {
        let low = u32::from_le_bytes([bnum[0], bnum[1], bnum[2], bnum[3]]);
        if low & EPOCHMASK == 0 {
            self.pink.clear();
        }
    }
}

impl Default for Peers {
    fn default() -> Self {
        Peers::new()
    }
}

/// Bounded ring of source-address fingerprints used to suppress
/// duplicate loose transactions before they reach the queue.
#[derive(Debug, Clone)]
pub struct TxFingerprints {
    ring: Vec<u32>,
    next: usize,
}

impl TxFingerprints {
    pub fn new() -> TxFingerprints {
        TxFingerprints {
            ring: Vec::with_capacity(FPLIST_LEN),
            next: 0,
        }
    }

    /// Fingerprint of a source address: the leading word of its hash.
    pub fn fingerprint(addr: &[u8]) -> u32 {
        let h = sha256(addr);
        u32::from_le_bytes([h[0], h[1], h[2], h[3]])
    }

    pub fn seen(&self, fp: u32) -> bool {
        self.ring.contains(&fp)
    }

    pub fn add(&mut self, fp: u32) {
        if fp == 0 {
            return;
        }
        if self.ring.len() < FPLIST_LEN {
            self.ring.push(fp);
        } else {
            if self.next >= FPLIST_LEN {
                self.next = 0;
            }
            self.ring[self.next] = fp;
            self.next += 1;
        }
    }
}

impl Default for TxFingerprints {
    fn default() -> Self {
        TxFingerprints::new()
    }
}
