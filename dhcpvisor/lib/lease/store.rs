use async_trait::async_trait;

use crate::{
    models::{LeaseRecord, LeaseUpdate},
    LeaseStoreResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed, a new one was created.
    Inserted,

    /// An existing record was updated.
    Updated,
}

/// What a delete did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record was removed.
    Deleted,

    /// No record existed. Nothing changed.
    NotFound,
}

/// Persistent lease records keyed by MAC address.
///
/// At most one record exists per MAC address. Implementations make [`upsert`](LeaseStore::upsert)
/// atomic: concurrent upserts of the same MAC never produce two records.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Finds the record for `mac_address`.
    async fn find(&self, mac_address: &str) -> LeaseStoreResult<Option<LeaseRecord>>;

    /// Lists every record, ordered by MAC address.
    async fn list(&self) -> LeaseStoreResult<Vec<LeaseRecord>>;

    /// Inserts a new record. Fails with
    /// [`LeaseStoreError::AlreadyExists`](crate::LeaseStoreError::AlreadyExists) if one exists.
    async fn insert(&self, record: &LeaseRecord) -> LeaseStoreResult<()>;

    /// Updates the record for `mac_address` with the fields `update` carries, or creates it.
    ///
    /// Absent fields leave stored values unchanged. A created record gets `*` for a missing
    /// address and an infinite expiry for a missing expiry.
    async fn upsert(&self, mac_address: &str, update: &LeaseUpdate)
        -> LeaseStoreResult<UpsertOutcome>;

    /// Removes the record for `mac_address`.
    async fn delete(&self, mac_address: &str) -> LeaseStoreResult<DeleteOutcome>;
}
