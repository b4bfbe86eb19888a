use crate::ledger::{LedgerApplied, LedgerEntry, LedgerError, LedgerUpdater};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Book {
    applied: HashSet<String>,
    paid: HashMap<(String, String), BTreeSet<u32>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    book: Arc<RwLock<Book>>,
    applications: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn paid_periods(&self, user_id: &str, fund_id: &str) -> BTreeSet<u32> {
        let book = self.book.read().await;
        book.paid
            .get(&(user_id.to_string(), fund_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of entries that actually changed the book.
    pub fn applications(&self) -> usize {
        self.applications.load(Ordering::SeqCst)
    }
}

impl LedgerUpdater for InMemoryLedger {
    async fn mark_periods_paid(&self, entry: LedgerEntry) -> Result<LedgerApplied, LedgerError> {
        if entry.periods.is_empty() {
            return Err(LedgerError::Rejected(format!(
                "{} names no periods",
                entry.transaction_id
            )));
        }
        if entry.amount_minor_units <= 0 {
            return Err(LedgerError::Rejected(format!(
                "{} has non-positive amount {}",
                entry.transaction_id, entry.amount_minor_units
            )));
        }

        let mut book = self.book.write().await;

        if !book.applied.insert(entry.transaction_id.clone()) {
            return Ok(LedgerApplied::AlreadyApplied);
        }

        book.paid
            .entry((entry.user_id, entry.fund_id))
            .or_default()
            .extend(entry.periods);
        self.applications.fetch_add(1, Ordering::SeqCst);
        Ok(LedgerApplied::Applied)
    }
}
