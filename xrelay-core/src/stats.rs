//! Per-chain processing counters.

use crate::events::Outcome;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ChainStats {
    received: AtomicU64,
    done: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    duplicate: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainStatsSnapshot {
    pub received: u64,
    pub done: u64,
    pub rejected: u64,
    pub failed: u64,
    pub duplicate: u64,
}

impl ChainStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Done { .. } => &self.done,
            Outcome::Rejected(_) => &self.rejected,
            Outcome::Failed(_) => &self.failed,
            Outcome::Duplicate => &self.duplicate,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ChainStatsSnapshot {
        ChainStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
        }
    }
}

/// Counters for every running lane, keyed by chain id.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    chains: BTreeMap<u64, Arc<ChainStats>>,
}

impl PipelineStats {
    pub(crate) fn register(&mut self, chain_id: u64) -> Arc<ChainStats> {
        self.chains.entry(chain_id).or_default().clone()
    }

    pub fn chain(&self, chain_id: u64) -> Option<ChainStatsSnapshot> {
        self.chains.get(&chain_id).map(|stats| stats.snapshot())
    }

    pub fn snapshot(&self) -> BTreeMap<u64, ChainStatsSnapshot> {
        self.chains
            .iter()
            .map(|(chain_id, stats)| (*chain_id, stats.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::validator::Rejection;

    #[test]
    fn test_outcomes_land_in_their_counter() {
        let mut stats = PipelineStats::default();
        let chain = stats.register(1);
        chain.record_received();
        chain.record_received();
        chain.record_outcome(&Outcome::Rejected(Rejection::ZeroAmount));
        chain.record_outcome(&Outcome::Duplicate);

        assert_eq!(
            stats.chain(1),
            Some(ChainStatsSnapshot {
                received: 2,
                rejected: 1,
                duplicate: 1,
                ..ChainStatsSnapshot::default()
            })
        );
        assert_eq!(stats.chain(2), None);
    }
}
