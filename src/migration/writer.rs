//! Idempotent batch writes with per-batch failure isolation

use std::borrow::Cow;
use std::collections::HashSet;

use super::error::MigrationError;
use super::record::CanonicalPositionRecord;
use super::store::PositionStore;

/// Terminal state of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Committed; the count excludes keys that were already stored
    Inserted(u64),
    /// Failed and rolled back; nothing from the batch was stored
    RolledBack,
}

impl BatchOutcome {
    /// Rows this batch added to the store
    pub fn inserted(&self) -> u64 {
        match self {
            BatchOutcome::Inserted(n) => *n,
            BatchOutcome::RolledBack => 0,
        }
    }
}

/// Writes batches to a [`PositionStore`]
pub struct BatchWriter<'a> {
    store: &'a dyn PositionStore,
}

impl<'a> BatchWriter<'a> {
    /// Create a writer over `store`
    pub fn new(store: &'a dyn PositionStore) -> Self {
        Self { store }
    }

    /// Write one batch.
    ///
    /// A rejected batch is logged and reported as [`BatchOutcome::RolledBack`].
    /// Only a lost destination is returned as an error.
    pub async fn write(
        &self,
        batch: &[CanonicalPositionRecord],
    ) -> Result<BatchOutcome, MigrationError> {
        if batch.is_empty() {
            return Ok(BatchOutcome::Inserted(0));
        }

        let unique = dedupe_batch(batch);
        if unique.len() < batch.len() {
            tracing::debug!(
                "Dropped {} duplicate keys within batch",
                batch.len() - unique.len()
            );
        }

        match self.store.insert_batch(&unique).await {
            Ok(inserted) => Ok(BatchOutcome::Inserted(inserted)),
            Err(e) if e.is_unreachable() => Err(e.into()),
            Err(e) => {
                tracing::error!("Batch of {} records rolled back: {}", batch.len(), e);
                Ok(BatchOutcome::RolledBack)
            }
        }
    }
}

/// Keep the first record for each `(icao, time)` key
fn dedupe_batch(batch: &[CanonicalPositionRecord]) -> Cow<'_, [CanonicalPositionRecord]> {
    let mut seen = HashSet::with_capacity(batch.len());
    if batch.iter().all(|r| seen.insert(r.key())) {
        return Cow::Borrowed(batch);
    }

    seen.clear();
    Cow::Owned(
        batch
            .iter()
            .filter(|r| seen.insert(r.key()))
            .cloned()
            .collect(),
    )
}
