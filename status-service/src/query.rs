//! Merge engine. Every subscription owns a [`MergedQuery`], kept inside the
//! registry lock, and a [`QueryDriver`] task that subscribes to providers and
//! forwards their updates into it.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use indexmap::IndexMap;
use statuskit_protocol::CheckScope;
use statuskit_protocol::Status;
use statuskit_protocol::WrappedStatus;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;
use tracing::Instrument;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::join::ProviderFeed;
use crate::join::SlotOutcome;
use crate::join::SlotUpdate;
use crate::provider::DiagnosticsSource;
use crate::registry::QueryId;
use crate::registry::RegisteredProvider;
use crate::registry::RegistrationId;
use crate::registry::Registry;
use crate::registry::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QueryTarget {
    All,
    Named(String),
}

impl QueryTarget {
    fn tracks(&self, name: &str) -> bool {
        match self {
            QueryTarget::All => true,
            QueryTarget::Named(watched) => watched == name,
        }
    }
}

pub(crate) enum QueryOutput {
    Statuses(mpsc::UnboundedSender<Vec<WrappedStatus>>),
    Status(mpsc::UnboundedSender<Option<WrappedStatus>>),
}

impl QueryOutput {
    /// Returns `false` once the subscriber is gone.
    fn send(&self, merged: Vec<WrappedStatus>) -> bool {
        match self {
            QueryOutput::Statuses(tx) => tx.send(merged).is_ok(),
            QueryOutput::Status(tx) => tx.send(merged.into_iter().next()).is_ok(),
        }
    }
}

enum SlotState {
    /// Subscribed, first outcome not seen yet.
    Pending,
    Ready(Option<Status>),
}

struct Slot {
    state: SlotState,
    cancel: CancellationToken,
}

/// Tracked registrations of one registry state, in registration order.
type View = Vec<(RegistrationId, String)>;

/// Asks the driver to subscribe to a newly tracked provider.
pub(crate) struct TrackRequest {
    provider: RegisteredProvider,
    cancel: CancellationToken,
}

/// Merge state of one subscription.
///
/// Registry states are queued in the order they happened and published one
/// by one, each as soon as every provider it tracks has reported once. Queued
/// states that still contain a released provider are dropped, so nothing is
/// published for a provider after its release.
pub(crate) struct MergedQuery {
    target: QueryTarget,
    slots: HashMap<RegistrationId, Slot>,
    queued: VecDeque<View>,
    current: Option<View>,
    output: QueryOutput,
    closed: bool,
    tracks: mpsc::UnboundedSender<TrackRequest>,
    cancel: CancellationToken,
}

impl MergedQuery {
    pub(crate) fn new(
        target: QueryTarget,
        output: QueryOutput,
        tracks: mpsc::UnboundedSender<TrackRequest>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            target,
            slots: HashMap::new(),
            queued: VecDeque::new(),
            current: None,
            output,
            closed: false,
            tracks,
            cancel,
        }
    }

    pub(crate) fn registry_changed(&mut self, entries: &IndexMap<String, RegisteredProvider>) {
        let view: View = entries
            .values()
            .filter(|entry| self.target.tracks(&entry.name))
            .map(|entry| (entry.id, entry.name.clone()))
            .collect();
        if self.queued.back().or(self.current.as_ref()) == Some(&view) {
            return;
        }

        let released: Vec<RegistrationId> = self
            .slots
            .keys()
            .copied()
            .filter(|id| !view.iter().any(|(live, _)| live == id))
            .collect();
        for id in &released {
            if let Some(slot) = self.slots.remove(id) {
                slot.cancel.cancel();
            }
        }
        if !released.is_empty() {
            self.queued
                .retain(|queued| !queued.iter().any(|(id, _)| released.contains(id)));
            if self.queued.back().or(self.current.as_ref()) == Some(&view) {
                return;
            }
        }

        for entry in entries.values() {
            if !self.target.tracks(&entry.name) || self.slots.contains_key(&entry.id) {
                continue;
            }
            let cancel = self.cancel.child_token();
            self.slots.insert(
                entry.id,
                Slot {
                    state: SlotState::Pending,
                    cancel: cancel.clone(),
                },
            );
            let _ = self.tracks.send(TrackRequest {
                provider: entry.clone(),
                cancel,
            });
        }

        self.queued.push_back(view);
        self.advance();
    }

    pub(crate) fn slot_updated(&mut self, update: SlotUpdate) {
        let Some(slot) = self.slots.get_mut(&update.id) else {
            return;
        };
        slot.state = match update.outcome {
            SlotOutcome::Value(status) => SlotState::Ready(status),
            SlotOutcome::Failed => SlotState::Ready(None),
        };

        if !self.queued.is_empty() {
            self.advance();
        } else if let Some(view) = self.current.take() {
            self.publish(&view);
            self.current = Some(view);
        }
    }

    pub(crate) fn stop(self) {
        for slot in self.slots.values() {
            slot.cancel.cancel();
        }
    }

    fn advance(&mut self) {
        while let Some(view) = self.queued.front() {
            if !view.iter().all(|(id, _)| self.is_ready(*id)) {
                return;
            }
            let Some(view) = self.queued.pop_front() else {
                return;
            };
            self.publish(&view);
            self.current = Some(view);
        }
    }

    fn is_ready(&self, id: RegistrationId) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|slot| matches!(slot.state, SlotState::Ready(_)))
    }

    fn publish(&mut self, view: &View) {
        if self.closed {
            return;
        }
        let merged: Vec<WrappedStatus> = view
            .iter()
            .filter_map(|(id, name)| match self.slots.get(id).map(|slot| &slot.state) {
                Some(SlotState::Ready(Some(status))) => {
                    Some(WrappedStatus::new(name.clone(), status.clone()))
                }
                _ => None,
            })
            .collect();
        trace!(query = ?self.target, count = merged.len(), "publishing merged statuses");
        if !self.output.send(merged) {
            self.closed = true;
        }
    }
}

/// Subscribes to the providers a query tracks and feeds their updates back
/// into the query's merge state.
pub(crate) struct QueryDriver {
    id: QueryId,
    target: QueryTarget,
    scope: CheckScope,
    registry: Weak<Mutex<Registry>>,
    diagnostics: Arc<dyn DiagnosticsSource>,
    log_errors: bool,
    tracks: mpsc::UnboundedReceiver<TrackRequest>,
    updates_tx: mpsc::UnboundedSender<SlotUpdate>,
    updates_rx: mpsc::UnboundedReceiver<SlotUpdate>,
    cancel: CancellationToken,
}

impl QueryDriver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: QueryId,
        target: QueryTarget,
        scope: CheckScope,
        registry: Weak<Mutex<Registry>>,
        diagnostics: Arc<dyn DiagnosticsSource>,
        log_errors: bool,
        tracks: mpsc::UnboundedReceiver<TrackRequest>,
        cancel: CancellationToken,
    ) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            id,
            target,
            scope,
            registry,
            diagnostics,
            log_errors,
            tracks,
            updates_tx,
            updates_rx,
            cancel,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(query = ?self.target, "status query started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                track = self.tracks.recv() => match track {
                    Some(track) => self.spawn_feed(track),
                    // The registry, and with it the merge state, is gone.
                    None => break,
                },
                Some(update) = self.updates_rx.recv() => {
                    let Some(registry) = self.registry.upgrade() else {
                        break;
                    };
                    lock(&registry).apply(self.id, update);
                }
            }
        }

        self.cancel.cancel();
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).detach(self.id);
        }
        debug!(query = ?self.target, "status query stopped");
    }

    /// Calls into the provider with no lock held, so it may register or
    /// release providers itself.
    fn spawn_feed(&self, track: TrackRequest) {
        let TrackRequest { provider, cancel } = track;
        if cancel.is_cancelled() {
            return;
        }
        let scope = self.scope;
        let statuses = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            provider.provider.provide_status(scope)
        })) {
            Ok(statuses) => statuses,
            Err(_) => {
                if self.log_errors {
                    warn!(provider = %provider.name, "status provider panicked while subscribing");
                } else {
                    debug!(provider = %provider.name, "status provider panicked while subscribing");
                }
                let _ = self.updates_tx.send(SlotUpdate {
                    id: provider.id,
                    outcome: SlotOutcome::Failed,
                });
                return;
            }
        };

        let feed = ProviderFeed {
            id: provider.id,
            name: provider.name,
            diagnostics: Arc::clone(&self.diagnostics),
            updates: self.updates_tx.clone(),
            log_errors: self.log_errors,
        };
        tokio::spawn(feed.run(statuses, cancel).in_current_span());
    }
}

/// Live view returned by the status queries. Dropping it (or calling
/// [`Subscription::unsubscribe`]) stops every task behind it.
///
/// Values are queued without bound until polled; a subscriber that stops
/// polling but keeps the subscription alive accumulates every merged view.
#[derive(Debug)]
pub struct Subscription<T> {
    values: UnboundedReceiverStream<T>,
    _guard: DropGuard,
}

pub type StatusesSubscription = Subscription<Vec<WrappedStatus>>;
pub type StatusSubscription = Subscription<Option<WrappedStatus>>;

impl<T> Subscription<T> {
    pub(crate) fn new(values: mpsc::UnboundedReceiver<T>, cancel: CancellationToken) -> Self {
        Self {
            values: UnboundedReceiverStream::new(values),
            _guard: cancel.drop_guard(),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().values).poll_next(cx)
    }
}
