//! In-process port adapters.

use crate::ports::{
    OddsRecord, OddsStore, PortError, ProcessedEvents, ProjectionUpdater, UpsertOutcome,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::RingBuffer;
use shared_types::{EventId, MatchId};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded idempotency ledger. The oldest entries are forgotten first.
pub struct InMemoryProcessedEvents {
    capacity: usize,
    inner: Mutex<Ledger>,
}

#[derive(Default)]
struct Ledger {
    seen: HashSet<(String, EventId)>,
    order: VecDeque<(String, EventId)>,
}

impl InMemoryProcessedEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Ledger::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryProcessedEvents {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl ProcessedEvents for InMemoryProcessedEvents {
    async fn is_processed(&self, consumer: &str, event_id: EventId) -> Result<bool, PortError> {
        Ok(self
            .inner
            .lock()
            .seen
            .contains(&(consumer.to_string(), event_id)))
    }

    async fn mark_processed(&self, consumer: &str, event_id: EventId) -> Result<(), PortError> {
        let key = (consumer.to_string(), event_id);
        let mut ledger = self.inner.lock();
        if !ledger.seen.insert(key.clone()) {
            return Ok(());
        }
        ledger.order.push_back(key);
        while ledger.order.len() > self.capacity {
            if let Some(evicted) = ledger.order.pop_front() {
                ledger.seen.remove(&evicted);
            }
        }
        Ok(())
    }
}

/// Records the most recent refresh requests instead of rebuilding anything.
pub struct InMemoryProjections {
    refreshed: Mutex<RingBuffer<Vec<MatchId>>>,
    total: AtomicU64,
}

impl InMemoryProjections {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Keep at most `capacity` calls; older ones are forgotten.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            refreshed: Mutex::new(RingBuffer::new(capacity)),
            total: AtomicU64::new(0),
        }
    }

    /// Retained `refresh_matches` calls, oldest first.
    pub fn calls(&self) -> Vec<Vec<MatchId>> {
        self.refreshed.lock().to_vec()
    }

    /// Number of `refresh_matches` calls ever made.
    pub fn total_calls(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Distinct matches across the retained calls.
    pub fn refreshed_matches(&self) -> BTreeSet<MatchId> {
        self.refreshed.lock().to_vec().into_iter().flatten().collect()
    }
}

impl Default for InMemoryProjections {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectionUpdater for InMemoryProjections {
    async fn refresh_matches(&self, match_ids: &[MatchId]) -> Result<(), PortError> {
        self.refreshed.lock().push(match_ids.to_vec());
        self.total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

type QuoteKey = (String, MatchId, String, String);

/// Last known price per (provider, match, market, selection).
#[derive(Default)]
pub struct InMemoryOddsStore {
    prices: Mutex<HashMap<QuoteKey, f64>>,
}

impl InMemoryOddsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn price(&self, provider: &str, record: &OddsRecord) -> Option<f64> {
        self.prices.lock().get(&quote_key(provider, record)).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn quote_key(provider: &str, record: &OddsRecord) -> QuoteKey {
    (
        provider.to_string(),
        record.match_id.clone(),
        record.market.clone(),
        record.selection.clone(),
    )
}

#[async_trait]
impl OddsStore for InMemoryOddsStore {
    async fn upsert(
        &self,
        provider: &str,
        records: &[OddsRecord],
    ) -> Result<UpsertOutcome, PortError> {
        if let Some(bad) = records
            .iter()
            .find(|r| !r.price.is_finite() || r.price <= 0.0)
        {
            return Err(PortError(format!(
                "invalid price {} for {}/{}",
                bad.price, bad.match_id, bad.market
            )));
        }

        let mut outcome = UpsertOutcome::default();
        let mut touched_markets: HashSet<(&MatchId, &str)> = HashSet::new();
        let mut prices = self.prices.lock();

        for record in records {
            match prices.insert(quote_key(provider, record), record.price) {
                None => {
                    outcome.inserted += 1;
                    touched_markets.insert((&record.match_id, record.market.as_str()));
                }
                Some(previous) if previous == record.price => outcome.deduplicated += 1,
                Some(_) => {
                    touched_markets.insert((&record.match_id, record.market.as_str()));
                }
            }
        }
        outcome.markets_updated = touched_markets.len() as u64;
        Ok(outcome)
    }
}
