//! The tag index: 12-byte human-memorable identifiers bound to ledger
//! rows.
//!
//! The index is a flat in-memory array of the tag bytes of every ledger
//! entry, in ledger order, rebuilt by a single scan. It is rebuilt after
//! every ledger mutation; a stale index is a bug, not a tolerated state.

use std::io;

use crate::blockchain::block::Address;
use crate::config::TAG_LEN;
use crate::database::ledger::{Ledger, LedgerEntry};

pub struct TagIndex {
    tags: Vec<[u8; TAG_LEN]>,
}

impl TagIndex {
    /// Scan the ledger once and capture every entry's tag bytes.
    pub fn build(ledger: &mut Ledger) -> io::Result<TagIndex> {
        let mut tags = Vec::with_capacity(ledger.len() as usize);
        for i in 0..ledger.len() {
            let entry = ledger.entry_at(i)?;
            let mut tag = [0u8; TAG_LEN];
            tag.copy_from_slice(entry.addr.tag());
            tags.push(tag);
        }
        log::debug!("tag index rebuilt: {} entries", tags.len());
        Ok(TagIndex { tags })
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Ledger row index of the entry carrying `tag`, if any.
    pub fn position(&self, tag: &[u8]) -> Option<u64> {
        self.tags
            .iter()
            .position(|t| t[..] == tag[..])
            .map(|i| i as u64)
    }

    /// Look a tag up and return its bound ledger entry and row index.
    pub fn find(&self, ledger: &mut Ledger, tag: &[u8]) -> io::Result<Option<(LedgerEntry, u64)>> {
        match self.position(tag) {
            Some(idx) => Ok(Some((ledger.entry_at(idx)?, idx))),
            None => Ok(None),
        }
    }

    /// Resolution backing the RESOLVE wire query: tag in, full bound
    /// address and balance out.
    pub fn resolve(&self, ledger: &mut Ledger, tag: &[u8]) -> io::Result<Option<LedgerEntry>> {
        Ok(self.find(ledger, tag)?.map(|(e, _)| e))
    }

    /// The tag binding policy between a transaction's source and change
    /// addresses:
    ///
    /// - change untagged: accept;
    /// - change tag equals source tag: accept (carry-over);
    /// - source tagged but differently: reject (tag hijack);
    /// - source untagged and the change tag already bound: reject
    ///   (stealing an existing tag);
    /// - otherwise accept (a new binding is created).
    pub fn tag_ok(&self, src: &Address, chg: &Address) -> bool {
        if !chg.has_tag() {
            return true;
        }
        if src.tag() == chg.tag() {
            return true;
        }
        if src.has_tag() {
            return false;
        }
        self.position(chg.tag()).is_none()
    }
}
