//! The tip and contention controller.
//!
//! A state machine over "block found" advertisements. Simple advances
//! are fetched; anything that disagrees with the local tip is held in a
//! LULL window while competing adverts accumulate, then resolved toward
//! the heaviest advertised chain. All clock inputs are passed in, so
//! every transition is testable.

use std::cmp::Ordering;
use std::net::Ipv4Addr;

use crate::arith::{cmp64, sub64, Value64};
use crate::blockchain::block::bnum_is_neogenesis;
use crate::blockchain::chain::ChainTip;
use crate::config::{HASH_LEN, LULL};
use crate::consensus::difficulty::weight_cmp;
use crate::network::peers::Peers;

/// A peer's claim about its tip, lifted from a FOUND packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advert {
    pub peer: Ipv4Addr,
    pub bnum: [u8; 8],
    pub bhash: [u8; HASH_LEN],
    pub phash: [u8; HASH_LEN],
    pub weight: [u8; HASH_LEN],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipState {
    Idle,
    Fetching { peer: Ipv4Addr },
    Contended { since: u32, windows: u32 },
}

/// What the daemon should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do.
    Ignore,
    /// Fetch the advertised block from this peer.
    Fetch(Ipv4Addr),
    /// Regenerate the announced neogenesis block locally and compare
    /// hashes; punish the peer on mismatch.
    Regenerate(Ipv4Addr),
    /// Contention recorded; wait out the LULL window.
    HoldLull,
    /// Abandon the local tip, tear down the miner, and catch up from
    /// this peer.
    CatchUp(Ipv4Addr),
    /// Pinklist this peer.
    Punish(Ipv4Addr),
}

/// Outcome of a fetched block's validation, as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Committed,
    Fault,
    Invalid,
    Hostile,
}

pub struct TipController {
    state: TipState,
    contenders: Vec<Advert>,
    lull: u32,
    max_retries: u8,
    retries_left: u8,
}

impl TipController {
    pub fn new(lull: u32, max_retries: u8) -> TipController {
        TipController {
            state: TipState::Idle,
            contenders: Vec::new(),
            lull,
            max_retries,
            retries_left: max_retries,
        }
    }

    pub fn with_defaults() -> TipController {
        TipController::new(LULL, 3)
    }

    pub fn state(&self) -> TipState {
        self.state
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.state, TipState::Fetching { .. })
    }

    /// An in-flight fetch or validation is cancellable at any suspension
    /// point; the daemon calls this when it gives up on one.
    pub fn cancel(&mut self) {
        self.state = TipState::Idle;
    }

    /// Feed one advertisement through the state machine.
    pub fn on_advert(
        &mut self,
        tip: &ChainTip,
        peers: &Peers,
        advert: Advert,
        now: u32,
    ) -> Decision {
        if peers.is_pinklisted(advert.peer) {
            return Decision::Ignore;
        }
        // Only peers we have spoken to recently may steer the tip.
        if !peers.recent.contains(advert.peer) {
            return Decision::Ignore;
        }

        let theirs = Value64::from_bytes(&advert.bnum);
        let ours = Value64::from_bytes(&tip.bnum);
        if cmp64(theirs, ours) != Ordering::Greater {
            return Decision::Ignore;
        }

        let mut gap = Value64::zero();
        sub64(theirs, ours, &mut gap);
        let adjacent = cmp64(gap, Value64::one()) == Ordering::Equal;

        if adjacent && bnum_is_neogenesis(&advert.bnum) {
            // Epoch boundary: the carrier is never transmitted; rebuild
            // it locally and check the announced hash.
            return Decision::Regenerate(advert.peer);
        }

        if adjacent && advert.phash == tip.bhash {
            return match self.state {
                TipState::Idle => {
                    self.state = TipState::Fetching { peer: advert.peer };
                    self.retries_left = self.max_retries;
                    Decision::Fetch(advert.peer)
                }
                // Already working on this height.
                _ => Decision::Ignore,
            };
        }

        // The advert disagrees with our chain. Only a heavier claim is
        // worth holding contention over.
        if weight_cmp(&advert.weight, &tip.weight) != Ordering::Greater {
            return Decision::Ignore;
        }

        self.record_contender(advert);
        if !matches!(self.state, TipState::Contended { .. }) {
            self.state = TipState::Contended { since: now, windows: 0 };
        }
        Decision::HoldLull
    }

    fn record_contender(&mut self, advert: Advert) {
        if let Some(existing) = self
            .contenders
            .iter_mut()
            .find(|c| c.peer == advert.peer)
        {
            if weight_cmp(&advert.weight, &existing.weight) == Ordering::Greater {
                *existing = advert;
            }
            return;
        }
        self.contenders.push(advert);
    }

    /// Clock tick. Resolves an expired LULL window toward the heaviest
    /// contender. A lone contender gets one extra window before the tip
    /// is abandoned on its word.
    pub fn on_tick(&mut self, now: u32) -> Option<Decision> {
        let TipState::Contended { since, windows } = self.state else {
            return None;
        };
        if now.wrapping_sub(since) < self.lull {
            return None;
        }
        if self.contenders.is_empty() {
            self.state = TipState::Idle;
            return None;
        }
        if self.contenders.len() < 2 && windows == 0 {
            self.state = TipState::Contended { since: now, windows: 1 };
            return None;
        }

        let best = self
            .contenders
            .iter()
            .max_by(|a, b| {
                weight_cmp(&a.weight, &b.weight)
                    .then_with(|| cmp64(Value64::from_bytes(&a.bnum), Value64::from_bytes(&b.bnum)))
            })
            .expect("non-empty")
            .clone();
        self.contenders.clear();
        self.state = TipState::Idle;
        log::info!("contention resolved toward {} at block {}", best.peer, Value64::from_bytes(&best.bnum));
        Some(Decision::CatchUp(best.peer))
    }

    /// Feed the result of a fetched block back in.
    pub fn on_fetch_result(&mut self, outcome: FetchOutcome) -> Decision {
        let TipState::Fetching { peer } = self.state else {
            return Decision::Ignore;
        };
        match outcome {
            FetchOutcome::Committed => {
                self.state = TipState::Idle;
                self.contenders.clear();
                Decision::Ignore
            }
            FetchOutcome::Fault => {
                // Retry the fetch a bounded number of times, then give up.
                if self.retries_left > 0 {
                    self.retries_left -= 1;
                    Decision::Fetch(peer)
                } else {
                    self.state = TipState::Idle;
                    Decision::Ignore
                }
            }
            FetchOutcome::Invalid => {
                // Could be a propagation race; drop without punishment.
                self.state = TipState::Idle;
                Decision::Ignore
            }
            FetchOutcome::Hostile => {
                self.state = TipState::Idle;
                Decision::Punish(peer)
            }
        }
    }
}
