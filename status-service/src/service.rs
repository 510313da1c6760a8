use std::sync::Arc;

use statuskit_protocol::CheckScope;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::debug;

use crate::config::StatusServiceConfig;
use crate::error::Result;
use crate::provider::DiagnosticsSource;
use crate::provider::StatusProvider;
use crate::query::MergedQuery;
use crate::query::QueryDriver;
use crate::query::QueryOutput;
use crate::query::QueryTarget;
use crate::query::StatusSubscription;
use crate::query::StatusesSubscription;
use crate::query::Subscription;
use crate::registry::SharedRegistry;
use crate::registry::StatusProviderRegistration;
use crate::registry::lock;

/// Owns the named status providers and serves merged, continuously-updated
/// views over them. Cloning shares the same registry.
#[derive(Clone)]
pub struct StatusService {
    inner: Arc<Inner>,
}

struct Inner {
    registry: SharedRegistry,
    diagnostics: Arc<dyn DiagnosticsSource>,
    config: StatusServiceConfig,
}

impl StatusService {
    pub fn new(diagnostics: Arc<dyn DiagnosticsSource>, config: StatusServiceConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: SharedRegistry::default(),
                diagnostics,
                config,
            }),
        }
    }

    pub fn config(&self) -> &StatusServiceConfig {
        &self.inner.config
    }

    /// Registers `provider` under `name`. Fails without side effects when the
    /// name is empty or already held by a live registration.
    pub fn register_status_provider<P>(
        &self,
        name: impl Into<String>,
        provider: P,
    ) -> Result<StatusProviderRegistration>
    where
        P: StatusProvider,
    {
        let name = name.into();
        let provider: Arc<dyn StatusProvider> = Arc::new(provider);
        let id = lock(&self.inner.registry).insert(&name, Arc::clone(&provider))?;
        debug!(provider = %name, id, "status provider registered");
        Ok(StatusProviderRegistration::new(
            name,
            id,
            Arc::downgrade(&self.inner.registry),
        ))
    }

    /// Releases every registration, e.g. at shutdown.
    pub fn release_all(&self) {
        let released = lock(&self.inner.registry).clear();
        if !released.is_empty() {
            debug!(count = released.len(), "all status providers released");
        }
    }

    /// Names of the live registrations, in registration order.
    pub fn registered_names(&self) -> Vec<String> {
        lock(&self.inner.registry).names()
    }

    /// Merged statuses of every registered provider whose latest value is not
    /// `None`, in registration order. Must be called within a tokio runtime.
    pub fn observe_statuses(&self, scope: CheckScope) -> StatusesSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.spawn_query(QueryTarget::All, scope, QueryOutput::Statuses(tx));
        Subscription::new(rx, cancel)
    }

    /// Status of the provider registered under `name`, or `None` while there is
    /// no such provider or it has no status. Provider failures are reported as
    /// `None`, same as for [`StatusService::observe_statuses`].
    pub fn observe_status(&self, name: &str, scope: CheckScope) -> StatusSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.spawn_query(
            QueryTarget::Named(name.to_string()),
            scope,
            QueryOutput::Status(tx),
        );
        Subscription::new(rx, cancel)
    }

    fn spawn_query(
        &self,
        target: QueryTarget,
        scope: CheckScope,
        output: QueryOutput,
    ) -> CancellationToken {
        let cancel = CancellationToken::new();
        let (tracks_tx, tracks_rx) = mpsc::unbounded_channel();
        let query = MergedQuery::new(target.clone(), output, tracks_tx, cancel.clone());
        let id = lock(&self.inner.registry).attach(query);
        let driver = QueryDriver::new(
            id,
            target,
            scope,
            Arc::downgrade(&self.inner.registry),
            Arc::clone(&self.inner.diagnostics),
            self.inner.config.log_provider_errors,
            tracks_rx,
            cancel.clone(),
        );
        tokio::spawn(driver.run().in_current_span());
        cancel
    }
}

impl std::fmt::Debug for StatusService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusService")
            .field("providers", &self.registered_names())
            .field("config", &self.inner.config)
            .finish()
    }
}
