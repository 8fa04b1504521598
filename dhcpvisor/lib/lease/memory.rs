use std::{collections::BTreeMap, sync::RwLock};

use async_trait::async_trait;

use super::{DeleteOutcome, LeaseStore, UpsertOutcome};
use crate::{
    models::{LeaseRecord, LeaseUpdate},
    LeaseStoreError, LeaseStoreResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A lease store held in memory.
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    records: RwLock<BTreeMap<String, LeaseRecord>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemoryLeaseStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn find(&self, mac_address: &str) -> LeaseStoreResult<Option<LeaseRecord>> {
        let records = self.records.read().map_err(|_| LeaseStoreError::Poisoned)?;
        Ok(records.get(mac_address).cloned())
    }

    async fn list(&self) -> LeaseStoreResult<Vec<LeaseRecord>> {
        let records = self.records.read().map_err(|_| LeaseStoreError::Poisoned)?;
        Ok(records.values().cloned().collect())
    }

    async fn insert(&self, record: &LeaseRecord) -> LeaseStoreResult<()> {
        let mut records = self.records.write().map_err(|_| LeaseStoreError::Poisoned)?;
        if records.contains_key(&record.mac_address) {
            return Err(LeaseStoreError::AlreadyExists(record.mac_address.clone()));
        }

        records.insert(record.mac_address.clone(), record.clone());
        Ok(())
    }

    async fn upsert(
        &self,
        mac_address: &str,
        update: &LeaseUpdate,
    ) -> LeaseStoreResult<UpsertOutcome> {
        let mut records = self.records.write().map_err(|_| LeaseStoreError::Poisoned)?;
        match records.get_mut(mac_address) {
            Some(record) => {
                record.apply(update);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                records.insert(
                    mac_address.to_string(),
                    update.clone().into_record(mac_address),
                );
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn delete(&self, mac_address: &str) -> LeaseStoreResult<DeleteOutcome> {
        let mut records = self.records.write().map_err(|_| LeaseStoreError::Poisoned)?;
        match records.remove(mac_address) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExpiryTime;

    const MAC: &str = "aa:bb:cc:dd:ee:ff";

    #[tokio::test]
    async fn test_upsert_then_find() -> anyhow::Result<()> {
        let store = MemoryLeaseStore::new();
        let update = LeaseUpdate {
            ip_address: Some("10.0.0.5".into()),
            expiry_time: Some(ExpiryTime::At(1700000000)),
            client_hostname: Some("host1".into()),
            client_id: None,
        };

        assert_eq!(store.upsert(MAC, &update).await?, UpsertOutcome::Inserted);
        assert_eq!(store.upsert(MAC, &update).await?, UpsertOutcome::Updated);
        assert_eq!(store.find(MAC).await?, Some(update.into_record(MAC)));
        assert_eq!(store.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_refuses_duplicates() -> anyhow::Result<()> {
        let store = MemoryLeaseStore::new();
        let record = LeaseUpdate::default().into_record(MAC);

        store.insert(&record).await?;
        assert!(matches!(
            store.insert(&record).await,
            Err(LeaseStoreError::AlreadyExists(mac)) if mac == MAC
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() -> anyhow::Result<()> {
        let store = MemoryLeaseStore::new();
        store.upsert(MAC, &LeaseUpdate::default()).await?;

        assert_eq!(store.delete("11:22:33:44:55:66").await?, DeleteOutcome::NotFound);
        assert_eq!(store.list().await?.len(), 1);
        assert_eq!(store.delete(MAC).await?, DeleteOutcome::Deleted);
        assert_eq!(store.find(MAC).await?, None);
        Ok(())
    }
}
