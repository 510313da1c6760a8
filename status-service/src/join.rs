//! Per-provider feed: pumps one provider's status stream, joins diagnostics
//! into each status and converts failures into an absent contribution.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use statuskit_async_utils::CancelErr;
use statuskit_async_utils::OrCancelExt;
use statuskit_protocol::DiagnosticEntry;
use statuskit_protocol::Status;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::provider::DiagnosticsSource;
use crate::provider::DiagnosticsStream;
use crate::provider::StatusStream;
use crate::registry::RegistrationId;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SlotOutcome {
    Value(Option<Status>),
    Failed,
}

#[derive(Debug)]
pub(crate) struct SlotUpdate {
    pub id: RegistrationId,
    pub outcome: SlotOutcome,
}

pub(crate) struct ProviderFeed {
    pub id: RegistrationId,
    pub name: String,
    pub diagnostics: Arc<dyn DiagnosticsSource>,
    pub updates: mpsc::UnboundedSender<SlotUpdate>,
    pub log_errors: bool,
}

/// Status waiting on (or following) its diagnostic collection.
struct JoinedDiagnostics {
    collection: String,
    status: Status,
    stream: Option<DiagnosticsStream>,
    delivered: bool,
}

impl JoinedDiagnostics {
    fn is_live(joined: &Option<Self>) -> bool {
        joined.as_ref().is_some_and(|joined| joined.stream.is_some())
    }
}

impl ProviderFeed {
    /// Runs until the provider is done, fails, or `cancel` fires.
    pub(crate) async fn run(self, statuses: StatusStream, cancel: CancellationToken) {
        let pumped = AssertUnwindSafe(self.pump(statuses))
            .catch_unwind()
            .or_cancel(&cancel)
            .await;
        match pumped {
            Err(CancelErr::Cancelled) | Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.report_failure(&anyhow::anyhow!("status stream panicked"));
                self.send(SlotOutcome::Failed);
            }
        }
    }

    async fn pump(&self, mut statuses: StatusStream) {
        let mut joined: Option<JoinedDiagnostics> = None;
        let mut statuses_open = true;
        let mut reported = false;

        loop {
            tokio::select! {
                next = statuses.next(), if statuses_open => match next {
                    Some(Ok(Some(mut status))) => match status.diagnostic_collection_name.take() {
                        Some(collection) => {
                            let stream = self.diagnostics.observe(&collection);
                            joined = Some(JoinedDiagnostics {
                                collection,
                                status,
                                stream: Some(stream),
                                delivered: false,
                            });
                        }
                        None => {
                            joined = None;
                            reported = true;
                            self.send(SlotOutcome::Value(Some(status)));
                        }
                    },
                    Some(Ok(None)) => {
                        joined = None;
                        reported = true;
                        self.send(SlotOutcome::Value(None));
                    }
                    Some(Err(err)) => {
                        self.report_failure(&err);
                        self.send(SlotOutcome::Failed);
                        return;
                    }
                    None => {
                        statuses_open = false;
                        if !reported && joined.is_none() {
                            reported = true;
                            self.send(SlotOutcome::Value(None));
                        }
                    }
                },
                next = next_diagnostics(&mut joined), if JoinedDiagnostics::is_live(&joined) => {
                    let Some(current) = joined.as_mut() else {
                        continue;
                    };
                    let entries = match next {
                        Some(Ok(entries)) => entries,
                        Some(Err(err)) => {
                            self.report_diagnostics_failure(&current.collection, &err);
                            current.stream = None;
                            Vec::new()
                        }
                        None => {
                            current.stream = None;
                            if current.delivered {
                                continue;
                            }
                            Vec::new()
                        }
                    };
                    current.delivered = true;
                    reported = true;
                    self.send(SlotOutcome::Value(Some(with_diagnostics(&current.status, entries))));
                }
                else => return,
            }
        }
    }

    fn send(&self, outcome: SlotOutcome) {
        let _ = self.updates.send(SlotUpdate {
            id: self.id,
            outcome,
        });
    }

    fn report_failure(&self, err: &anyhow::Error) {
        if self.log_errors {
            warn!(provider = %self.name, "status provider failed: {err:#}");
        } else {
            debug!(provider = %self.name, "status provider failed: {err:#}");
        }
    }

    fn report_diagnostics_failure(&self, collection: &str, err: &anyhow::Error) {
        if self.log_errors {
            warn!(provider = %self.name, collection, "diagnostics join failed: {err:#}");
        } else {
            debug!(provider = %self.name, collection, "diagnostics join failed: {err:#}");
        }
    }
}

async fn next_diagnostics(
    joined: &mut Option<JoinedDiagnostics>,
) -> Option<anyhow::Result<Vec<DiagnosticEntry>>> {
    match joined.as_mut().and_then(|joined| joined.stream.as_mut()) {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn with_diagnostics(status: &Status, entries: Vec<DiagnosticEntry>) -> Status {
    let mut status = status.clone();
    status.diagnostics = Some(entries);
    status
}
