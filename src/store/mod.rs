//! Persistence boundary.
//!
//! The onboarding pipeline hands every [`ResolvedContract`] to a
//! [`ContractStore`] and resolves event names through an [`EventRegistry`].
//! Both are traits so the relational backend can live outside this crate.
//! [`InMemoryStore`] implements both and can snapshot itself to JSON, which
//! is what the CLI uses between runs.

pub mod errors;

pub use errors::PersistenceError;

use crate::layout::StorageLayout;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

/// Identifier assigned to an onboarded contract.
pub type ContractId = u64;
/// Identifier assigned to an event name.
pub type EventId = u64;

/// Everything derived for one onboarded contract. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContract {
    pub address: Address,
    /// Display name reported by the metadata source
    pub name: String,
    pub abi: serde_json::Value,
    pub layout: StorageLayout,
    /// Event identifiers in ABI order, duplicates preserved
    pub event_ids: Vec<EventId>,
}

/// Looks up or creates event identifiers by name.
#[async_trait::async_trait]
pub trait EventRegistry: Send + Sync {
    /// Return the id for `name`, creating a registry entry if needed.
    async fn event_id(&self, name: &str) -> Result<EventId, PersistenceError>;
}

/// Accepts resolved contracts.
#[async_trait::async_trait]
pub trait ContractStore: EventRegistry {
    /// Persist a contract and return its new id.
    async fn insert_contract(&self, contract: ResolvedContract)
        -> Result<ContractId, PersistenceError>;

    /// Fetch a previously stored contract.
    async fn contract(&self, id: ContractId) -> Result<Option<ResolvedContract>, PersistenceError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_contract_id: ContractId,
    next_event_id: EventId,
    events: BTreeMap<String, EventId>,
    contracts: BTreeMap<ContractId, ResolvedContract>,
}

impl StoreState {
    fn find_by_address(&self, address: Address) -> Option<ContractId> {
        self.contracts.iter().find(|(_, c)| c.address == address).map(|(id, _)| *id)
    }
}

/// In-memory store with sequential ids starting at 1.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`Self::save`]. A missing file yields an
    /// empty store.
    pub async fn load(path: &Path) -> Result<Self, PersistenceError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(PersistenceError::Io(e.to_string())),
        };
        let state: StoreState =
            serde_json::from_slice(&raw).map_err(|e| PersistenceError::Snapshot(e.to_string()))?;
        Ok(Self { state: RwLock::new(state) })
    }

    /// Write the whole store to `path` as JSON.
    pub async fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let encoded = {
            let state = self.state.read().await;
            serde_json::to_vec_pretty(&*state)
                .map_err(|e| PersistenceError::Snapshot(e.to_string()))?
        };
        tokio::fs::write(path, encoded).await.map_err(|e| PersistenceError::Io(e.to_string()))
    }

    /// Number of stored contracts.
    pub async fn contract_count(&self) -> usize {
        self.state.read().await.contracts.len()
    }

    /// Number of registered event names.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }
}

#[async_trait::async_trait]
impl EventRegistry for InMemoryStore {
    async fn event_id(&self, name: &str) -> Result<EventId, PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(&id) = state.events.get(name) {
            return Ok(id);
        }
        state.next_event_id += 1;
        let id = state.next_event_id;
        state.events.insert(name.to_string(), id);
        Ok(id)
    }
}

#[async_trait::async_trait]
impl ContractStore for InMemoryStore {
    async fn insert_contract(
        &self,
        contract: ResolvedContract,
    ) -> Result<ContractId, PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.find_by_address(contract.address) {
            debug!(address = %contract.address, existing, "contract already onboarded");
            return Err(PersistenceError::DuplicateContract(contract.address));
        }
        state.next_contract_id += 1;
        let id = state.next_contract_id;
        state.contracts.insert(id, contract);
        Ok(id)
    }

    async fn contract(&self, id: ContractId) -> Result<Option<ResolvedContract>, PersistenceError> {
        Ok(self.state.read().await.contracts.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn contract(address: Address) -> ResolvedContract {
        ResolvedContract {
            address,
            name: "Token".into(),
            abi: serde_json::json!([]),
            layout: StorageLayout::default(),
            event_ids: vec![],
        }
    }

    #[tokio::test]
    async fn test_event_ids_dedup_by_name() {
        let store = InMemoryStore::new();
        let transfer = store.event_id("Transfer").await.unwrap();
        let approval = store.event_id("Approval").await.unwrap();
        assert_eq!(transfer, 1);
        assert_eq!(approval, 2);
        assert_eq!(store.event_id("Transfer").await.unwrap(), transfer);
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn test_contract_ids_are_sequential() {
        let store = InMemoryStore::new();
        let a = address!("00000000000000000000000000000000000000a1");
        let b = address!("00000000000000000000000000000000000000b2");
        assert_eq!(store.insert_contract(contract(a)).await.unwrap(), 1);
        assert_eq!(store.insert_contract(contract(b)).await.unwrap(), 2);
        assert_eq!(store.contract(2).await.unwrap().unwrap().address, b);
        assert_eq!(store.contract(1).await.unwrap().unwrap().address, a);
        assert!(store.contract(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_address_rejected() {
        let store = InMemoryStore::new();
        let a = address!("00000000000000000000000000000000000000a1");
        store.insert_contract(contract(a)).await.unwrap();
        assert_eq!(
            store.insert_contract(contract(a)).await.unwrap_err(),
            PersistenceError::DuplicateContract(a)
        );
        assert_eq!(store.contract_count().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_keeps_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = InMemoryStore::new();
        let a = address!("00000000000000000000000000000000000000a1");
        store.insert_contract(contract(a)).await.unwrap();
        store.event_id("Transfer").await.unwrap();
        store.save(&path).await.unwrap();

        let reloaded = InMemoryStore::load(&path).await.unwrap();
        assert_eq!(reloaded.contract_count().await, 1);
        assert_eq!(reloaded.event_id("Transfer").await.unwrap(), 1);
        let next = reloaded
            .insert_contract(contract(address!("00000000000000000000000000000000000000b2")))
            .await
            .unwrap();
        assert_eq!(next, 2);
    }

    #[tokio::test]
    async fn test_load_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(store.contract_count().await, 0);
    }
}
