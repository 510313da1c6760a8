//! In-memory diagnostics service backing the status diagnostics join.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use futures::StreamExt;
use indexmap::IndexMap;
use statuskit_protocol::Diagnostic;
use statuskit_protocol::DiagnosticEntry;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use url::Url;

use crate::provider::DiagnosticsSource;
use crate::provider::DiagnosticsStream;

type CollectionContents = IndexMap<Url, Vec<Diagnostic>>;
type Collections = HashMap<String, Arc<watch::Sender<CollectionContents>>>;

/// Named diagnostic collections, each observable as a stream of entries.
///
/// Observing a name nobody created yields an empty list and follows the
/// collection once it is created. Such placeholders are dropped again once
/// they have no handle, no observer and no contents.
#[derive(Clone, Default)]
pub struct DiagnosticsService {
    collections: Arc<Mutex<Collections>>,
}

impl DiagnosticsService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the named collection, creating it empty on first use.
    pub fn collection(&self, name: &str) -> DiagnosticCollection {
        DiagnosticCollection {
            name: name.to_string(),
            contents: self.sender(name),
        }
    }

    /// Names of the collections that have a live handle or any contents.
    pub fn collection_names(&self) -> Vec<String> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        prune(&mut collections);
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, contents)| Arc::strong_count(contents) > 1 || !contents.borrow().is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn sender(&self, name: &str) -> Arc<watch::Sender<CollectionContents>> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        prune(&mut collections);
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(watch::Sender::new(CollectionContents::new()))),
        )
    }
}

impl DiagnosticsSource for DiagnosticsService {
    fn observe(&self, collection: &str) -> DiagnosticsStream {
        let rx = self.sender(collection).subscribe();
        WatchStream::new(rx)
            .map(|contents| Ok(to_entries(&contents)))
            .boxed()
    }
}

/// Drops collections that only exist because somebody once observed them.
fn prune(collections: &mut Collections) {
    collections.retain(|_, contents| {
        Arc::strong_count(contents) > 1
            || contents.receiver_count() > 0
            || !contents.borrow().is_empty()
    });
}

fn to_entries(contents: &CollectionContents) -> Vec<DiagnosticEntry> {
    contents
        .iter()
        .map(|(resource, diagnostics)| DiagnosticEntry::new(resource.clone(), diagnostics.clone()))
        .collect()
}

/// Mutable view of one collection. Every change is pushed to observers.
#[derive(Clone)]
pub struct DiagnosticCollection {
    name: String,
    contents: Arc<watch::Sender<CollectionContents>>,
}

impl DiagnosticCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the diagnostics for `resource`. An empty list removes it.
    pub fn set(&self, resource: Url, diagnostics: Vec<Diagnostic>) {
        self.contents.send_if_modified(|contents| {
            if diagnostics.is_empty() {
                return contents.shift_remove(&resource).is_some();
            }
            if contents.get(&resource) == Some(&diagnostics) {
                return false;
            }
            contents.insert(resource, diagnostics);
            true
        });
    }

    pub fn delete(&self, resource: &Url) {
        self.contents
            .send_if_modified(|contents| contents.shift_remove(resource).is_some());
    }

    pub fn clear(&self) {
        self.contents.send_if_modified(|contents| {
            if contents.is_empty() {
                return false;
            }
            contents.clear();
            true
        });
    }

    pub fn get(&self, resource: &Url) -> Option<Vec<Diagnostic>> {
        self.contents.borrow().get(resource).cloned()
    }

    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        to_entries(&self.contents.borrow())
    }
}
