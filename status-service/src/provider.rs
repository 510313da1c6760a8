//! Collaborator seams: status providers and the diagnostics source.

use futures::stream::BoxStream;
use statuskit_protocol::CheckScope;
use statuskit_protocol::DiagnosticEntry;
use statuskit_protocol::Status;

/// Continuously-updated status of one provider. `Ok(None)` means the provider
/// has no status right now; an `Err` ends the provider's contribution.
pub type StatusStream = BoxStream<'static, anyhow::Result<Option<Status>>>;

/// Continuously-updated contents of one diagnostic collection.
pub type DiagnosticsStream = BoxStream<'static, anyhow::Result<Vec<DiagnosticEntry>>>;

pub trait StatusProvider: Send + Sync + 'static {
    /// Called once per subscription that tracks this provider.
    fn provide_status(&self, scope: CheckScope) -> StatusStream;
}

impl<F> StatusProvider for F
where
    F: Fn(CheckScope) -> StatusStream + Send + Sync + 'static,
{
    fn provide_status(&self, scope: CheckScope) -> StatusStream {
        self(scope)
    }
}

pub trait DiagnosticsSource: Send + Sync + 'static {
    fn observe(&self, collection: &str) -> DiagnosticsStream;
}
