/*!
# Status service

Aggregates the statuses published by independently registered providers into
one continuously-updated view.

- Providers register under a unique name and publish a stream of
  `Option<Status>`; the returned handle removes them again.
- [`StatusService::observe_statuses`] merges every non-empty status in
  registration order; [`StatusService::observe_status`] follows one name.
- Statuses naming a diagnostic collection get that collection's entries
  joined in from a [`DiagnosticsSource`].
- A provider that fails simply stops contributing; the merged views keep
  running.

```rust,no_run
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use statuskit_core::DiagnosticsService;
use statuskit_core::StatusService;
use statuskit_core::StatusServiceConfig;
use statuskit_core::StatusStream;
use statuskit_protocol::CheckScope;
use statuskit_protocol::Status;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = StatusService::new(
        Arc::new(DiagnosticsService::new()),
        StatusServiceConfig::default(),
    );
    let registration = service.register_status_provider("indexer", |_scope: CheckScope| -> StatusStream {
        stream::iter([Ok(Some(Status::in_progress("Indexing")))]).boxed()
    })?;

    let mut statuses = service.observe_statuses(CheckScope::Global);
    if let Some(current) = statuses.next().await {
        println!("{} status(es)", current.len());
    }
    registration.release();
    Ok(())
}
```
*/

mod config;
mod diagnostics;
mod error;
mod join;
mod provider;
mod query;
mod registry;
mod service;

pub use config::StatusServiceConfig;
pub use diagnostics::DiagnosticCollection;
pub use diagnostics::DiagnosticsService;
pub use error::ConfigError;
pub use error::Result;
pub use error::StatusServiceError;
pub use provider::DiagnosticsSource;
pub use provider::DiagnosticsStream;
pub use provider::StatusProvider;
pub use provider::StatusStream;
pub use query::StatusSubscription;
pub use query::StatusesSubscription;
pub use query::Subscription;
pub use registry::StatusProviderRegistration;
pub use service::StatusService;
