//! In-process remote store.
//!
//! Behaves like the Firestore collection the service talks to in production:
//! server-assigned ids, `updateDoc`-style updates that fail on missing
//! documents and idempotent deletes. Clones share the same state, so several
//! services can act as separate clients of one store.

use super::{RemoteError, RemoteResult, RemoteStore, TimestampFilter};
use crate::model::item::{Item, ItemFields, ItemId};
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const AUTO_ID_LEN: usize = 20;
const AUTO_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug)]
struct MemoryState {
    documents: BTreeMap<ItemId, ItemFields>,
    available: bool,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            documents: BTreeMap::new(),
            available: true,
        }
    }
}

/// In-memory `RemoteStore` for tests, demos and embedding.
#[derive(Clone, Debug, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates connectivity loss (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Writes a document with a caller-chosen id, bypassing availability.
    ///
    /// Used to seed the store as if another client had written it.
    pub fn insert_document(&self, id: impl Into<ItemId>, fields: ItemFields) {
        self.lock().documents.insert(id.into(), fields);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a panicking test thread; the map is intact.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn available_state(&self) -> RemoteResult<MutexGuard<'_, MemoryState>> {
        let state = self.lock();
        if !state.available {
            return Err(RemoteError::Unavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(state)
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn create(&self, fields: &ItemFields) -> RemoteResult<ItemId> {
        let mut state = self.available_state()?;
        let id = loop {
            let candidate = auto_id();
            if !state.documents.contains_key(&candidate) {
                break candidate;
            }
        };
        state.documents.insert(id.clone(), fields.clone());
        debug!("event=remote_create module=remote.memory status=ok id={id}");
        Ok(id)
    }

    fn list_all(&self) -> RemoteResult<Vec<Item>> {
        let state = self.available_state()?;
        Ok(state
            .documents
            .iter()
            .map(|(id, fields)| Item::from_fields(id.clone(), fields.clone()))
            .collect())
    }

    fn list_where(&self, filter: TimestampFilter) -> RemoteResult<Vec<Item>> {
        let state = self.available_state()?;
        Ok(state
            .documents
            .iter()
            .filter(|(_, fields)| filter.matches(fields.timestamp))
            .map(|(id, fields)| Item::from_fields(id.clone(), fields.clone()))
            .collect())
    }

    fn update(&self, id: &str, fields: &ItemFields) -> RemoteResult<()> {
        let mut state = self.available_state()?;
        match state.documents.get_mut(id) {
            Some(existing) => {
                *existing = fields.clone();
                Ok(())
            }
            None => Err(RemoteError::NotFound(id.to_string())),
        }
    }

    fn delete(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.available_state()?;
        state.documents.remove(id);
        Ok(())
    }
}

/// Generates a Firestore-style 20 character alphanumeric id.
fn auto_id() -> ItemId {
    let mut id = String::with_capacity(AUTO_ID_LEN);
    while id.len() < AUTO_ID_LEN {
        for byte in Uuid::new_v4().as_bytes() {
            // Rejection sampling keeps the alphabet uniform.
            let limit = 256 - (256 % AUTO_ID_ALPHABET.len());
            if usize::from(*byte) < limit && id.len() < AUTO_ID_LEN {
                id.push(char::from(
                    AUTO_ID_ALPHABET[usize::from(*byte) % AUTO_ID_ALPHABET.len()],
                ));
            }
        }
    }
    id
}
