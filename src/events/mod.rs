//! Event catalog builder: turns the event entries of a contract ABI into
//! registry identifiers, in ABI order.

use crate::constants::ABI_EVENT_KIND;
use crate::store::{EventId, EventRegistry, PersistenceError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AbiEntry {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Names of every event entry in `abi`, in order. Overloaded events appear
/// once per entry. Anything that is not a JSON array yields no names.
pub fn event_names(abi: &serde_json::Value) -> Vec<String> {
    let Some(entries) = abi.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| AbiEntry::deserialize(entry).ok())
        .filter(|entry| entry.kind.as_deref() == Some(ABI_EVENT_KIND))
        .filter_map(|entry| entry.name)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Resolves ABI events through an [`EventRegistry`].
pub struct EventCatalogBuilder<'a, R: ?Sized> {
    registry: &'a R,
}

impl<'a, R: EventRegistry + ?Sized> EventCatalogBuilder<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }

    /// One id per event entry of `abi`, same order and multiplicity.
    pub async fn build(&self, abi: &serde_json::Value) -> Result<Vec<EventId>, PersistenceError> {
        let names = event_names(abi);
        let mut ids = Vec::with_capacity(names.len());
        for name in &names {
            ids.push(self.registry.event_id(name).await?);
        }
        debug!(events = ids.len(), "resolved ABI events");
        Ok(ids)
    }
}
