use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::StatusServiceError;
use crate::join::SlotUpdate;
use crate::provider::StatusProvider;
use crate::query::MergedQuery;

pub(crate) type RegistrationId = u64;
pub(crate) type QueryId = u64;

#[derive(Clone)]
pub(crate) struct RegisteredProvider {
    pub id: RegistrationId,
    pub name: String,
    pub provider: Arc<dyn StatusProvider>,
}

/// Live registration set, in registration order, together with the merge
/// state of every running query.
///
/// Each mutation recomputes every attached query before the lock is released,
/// so no registration change is merged into another one and no query can
/// publish a provider after its release returned.
#[derive(Default)]
pub(crate) struct Registry {
    entries: IndexMap<String, RegisteredProvider>,
    next_id: RegistrationId,
    queries: HashMap<QueryId, MergedQuery>,
    next_query_id: QueryId,
}

pub(crate) type SharedRegistry = Arc<Mutex<Registry>>;

pub(crate) fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    pub(crate) fn insert(
        &mut self,
        name: &str,
        provider: Arc<dyn StatusProvider>,
    ) -> Result<RegistrationId, StatusServiceError> {
        if name.is_empty() {
            return Err(StatusServiceError::InvalidName);
        }
        if self.entries.contains_key(name) {
            return Err(StatusServiceError::AlreadyRegistered {
                name: name.to_string(),
            });
        }
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(
            name.to_string(),
            RegisteredProvider {
                id,
                name: name.to_string(),
                provider,
            },
        );
        self.entries_changed();
        Ok(id)
    }

    /// Removes `name` only while it is still held by registration `id`.
    ///
    /// The removed entry is handed back so the provider is dropped after the
    /// lock is released.
    pub(crate) fn remove(&mut self, name: &str, id: RegistrationId) -> Option<RegisteredProvider> {
        if !self.contains(name, id) {
            return None;
        }
        let removed = self.entries.shift_remove(name);
        self.entries_changed();
        removed
    }

    pub(crate) fn clear(&mut self) -> Vec<RegisteredProvider> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let removed = self.entries.drain(..).map(|(_, entry)| entry).collect();
        self.entries_changed();
        removed
    }

    pub(crate) fn contains(&self, name: &str, id: RegistrationId) -> bool {
        self.entries.get(name).is_some_and(|entry| entry.id == id)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Starts merging for `query` against the current registration set.
    pub(crate) fn attach(&mut self, mut query: MergedQuery) -> QueryId {
        self.next_query_id += 1;
        let id = self.next_query_id;
        query.registry_changed(&self.entries);
        self.queries.insert(id, query);
        id
    }

    pub(crate) fn detach(&mut self, id: QueryId) {
        if let Some(query) = self.queries.remove(&id) {
            query.stop();
        }
    }

    pub(crate) fn apply(&mut self, query: QueryId, update: SlotUpdate) {
        if let Some(query) = self.queries.get_mut(&query) {
            query.slot_updated(update);
        }
    }

    fn entries_changed(&mut self) {
        for query in self.queries.values_mut() {
            query.registry_changed(&self.entries);
        }
    }
}

/// Handle returned by [`crate::StatusService::register_status_provider`].
///
/// Dropping the handle leaves the provider registered; call
/// [`StatusProviderRegistration::release`] to remove it.
#[derive(Clone, Debug)]
#[must_use = "the provider stays registered until `release` is called"]
pub struct StatusProviderRegistration {
    name: String,
    id: RegistrationId,
    registry: Weak<Mutex<Registry>>,
}

impl StatusProviderRegistration {
    pub(crate) fn new(name: String, id: RegistrationId, registry: Weak<Mutex<Registry>>) -> Self {
        Self { name, id, registry }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the provider from every merged view. Every view has taken the
    /// removal into account by the time this returns. Releasing twice, or
    /// after the service is gone, does nothing.
    pub fn release(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let removed = lock(&registry).remove(&self.name, self.id);
        if removed.is_some() {
            debug!(provider = %self.name, "status provider released");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| lock(&registry).contains(&self.name, self.id))
    }
}
