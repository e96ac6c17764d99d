//! Synchronous, ordered publish/subscribe for worker events.
//!
//! Listeners subscribe under an emitter identifier (or [`ANY_IDENTIFIER`])
//! and an event kind. A publish collects every listener registered under
//! any identifier the emitter advertises, then runs them highest priority
//! first, in subscription order within a priority.

use queue_core::WorkerEventKind;

use crate::event::{ListenerError, WorkerEvent};

/// Identifier matching every emitter.
pub const ANY_IDENTIFIER: &str = "*";

/// Boxed event listener.
pub type Listener = Box<dyn Fn(&mut WorkerEvent<'_>) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    id: ListenerId,
    identifier: String,
    kind: WorkerEventKind,
    priority: i32,
    listener: Listener,
}

impl Subscription {
    fn matches(&self, identifiers: &[&str], kind: WorkerEventKind) -> bool {
        self.kind == kind
            && (self.identifier == ANY_IDENTIFIER
                || identifiers.iter().any(|id| *id == self.identifier))
    }
}

/// Event bus owned by a worker.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `kind` events emitted by `identifier`.
    ///
    /// Higher priorities run first.
    pub fn subscribe<F>(
        &mut self,
        identifier: impl Into<String>,
        kind: WorkerEventKind,
        priority: i32,
        listener: F,
    ) -> ListenerId
    where
        F: Fn(&mut WorkerEvent<'_>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            identifier: identifier.into(),
            kind,
            priority,
            listener: Box::new(listener),
        });
        id
    }

    /// Register the same listener for every event kind.
    pub fn subscribe_all<F>(
        &mut self,
        identifier: impl Into<String>,
        priority: i32,
        listener: F,
    ) -> Vec<ListenerId>
    where
        F: Fn(&mut WorkerEvent<'_>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        let listener = std::sync::Arc::new(listener);
        WorkerEventKind::ALL
            .into_iter()
            .map(|kind| {
                let listener = listener.clone();
                self.subscribe(identifier.clone(), kind, priority, move |event| {
                    (*listener)(event)
                })
            })
            .collect()
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Number of listeners registered for `kind`, across all identifiers.
    pub fn listener_count(&self, kind: WorkerEventKind) -> usize {
        self.subscriptions.iter().filter(|s| s.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    /// Run every matching listener on `event`.
    ///
    /// Stops early when a listener calls
    /// [`WorkerEvent::stop_propagation`]; the first listener error is
    /// returned as-is.
    pub fn publish(
        &self,
        identifiers: &[&str],
        event: &mut WorkerEvent<'_>,
    ) -> Result<(), ListenerError> {
        let kind = event.kind();
        let mut matching: Vec<&Subscription> = self
            .subscriptions
            .iter()
            .filter(|s| s.matches(identifiers, kind))
            .collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

        for subscription in matching {
            (subscription.listener)(event)?;
            if event.is_propagation_stopped() {
                tracing::trace!("Propagation of {} stopped by listener", kind);
                break;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::{InMemoryQueue, PopParams, Queue};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(
        log: Log,
        name: &'static str,
    ) -> impl Fn(&mut WorkerEvent<'_>) -> Result<(), ListenerError> + Send + Sync + 'static {
        move |_event| {
            log.lock().unwrap().push(name);
            Ok(())
        }
    }

    fn publish(
        bus: &EventBus,
        identifiers: &[&'static str],
        kind: WorkerEventKind,
    ) -> Result<bool, ListenerError> {
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new("default"));
        let params = PopParams::new();
        let mut event = WorkerEvent::new(kind, identifiers, &queue, &params);
        bus.publish(identifiers, &mut event)?;
        Ok(event.is_propagation_stopped())
    }

    #[test]
    fn runs_higher_priority_first_then_subscription_order() {
        let log = Log::default();
        let mut bus = EventBus::new();
        bus.subscribe("w", WorkerEventKind::ProcessJobPre, 0, recorder(log.clone(), "a"));
        bus.subscribe("w", WorkerEventKind::ProcessJobPre, 10, recorder(log.clone(), "b"));
        bus.subscribe("w", WorkerEventKind::ProcessJobPre, 0, recorder(log.clone(), "c"));
        bus.subscribe("w", WorkerEventKind::ProcessJobPre, -5, recorder(log.clone(), "d"));

        publish(&bus, &["w"], WorkerEventKind::ProcessJobPre).unwrap();
        assert_eq!(*log.lock().unwrap(), ["b", "a", "c", "d"]);
    }

    #[test]
    fn only_matching_kind_and_identifier_run() {
        let log = Log::default();
        let mut bus = EventBus::new();
        bus.subscribe("w", WorkerEventKind::ProcessJobPre, 0, recorder(log.clone(), "pre"));
        bus.subscribe("w", WorkerEventKind::ProcessJobPost, 0, recorder(log.clone(), "post"));
        bus.subscribe("other", WorkerEventKind::ProcessJobPre, 0, recorder(log.clone(), "other"));

        publish(&bus, &["w"], WorkerEventKind::ProcessJobPre).unwrap();
        assert_eq!(*log.lock().unwrap(), ["pre"]);
    }

    #[test]
    fn identifiers_are_additive() {
        let log = Log::default();
        let mut bus = EventBus::new();
        bus.subscribe("broad", WorkerEventKind::ProcessQueuePre, 0, recorder(log.clone(), "broad"));
        bus.subscribe("narrow", WorkerEventKind::ProcessQueuePre, 0, recorder(log.clone(), "narrow"));
        bus.subscribe(ANY_IDENTIFIER, WorkerEventKind::ProcessQueuePre, 0, recorder(log.clone(), "any"));

        publish(&bus, &["broad", "narrow"], WorkerEventKind::ProcessQueuePre).unwrap();
        assert_eq!(*log.lock().unwrap(), ["broad", "narrow", "any"]);
    }

    #[test]
    fn stop_propagation_skips_remaining_listeners() {
        let log = Log::default();
        let mut bus = EventBus::new();
        bus.subscribe("w", WorkerEventKind::ProcessJobPre, 5, recorder(log.clone(), "first"));
        let stopper = log.clone();
        bus.subscribe("w", WorkerEventKind::ProcessJobPre, 1, move |event| {
            stopper.lock().unwrap().push("stopper");
            event.stop_propagation();
            Ok(())
        });
        bus.subscribe("w", WorkerEventKind::ProcessJobPre, 0, recorder(log.clone(), "skipped"));

        let stopped = publish(&bus, &["w"], WorkerEventKind::ProcessJobPre).unwrap();
        assert!(stopped);
        assert_eq!(*log.lock().unwrap(), ["first", "stopper"]);
    }

    #[test]
    fn listener_error_aborts_publish() {
        let log = Log::default();
        let mut bus = EventBus::new();
        bus.subscribe("w", WorkerEventKind::ProcessJobPost, 1, |_event| {
            Err(ListenerError::new("rejected"))
        });
        bus.subscribe("w", WorkerEventKind::ProcessJobPost, 0, recorder(log.clone(), "after"));

        let err = publish(&bus, &["w"], WorkerEventKind::ProcessJobPost).unwrap_err();
        assert_eq!(err.to_string(), "rejected");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let log = Log::default();
        let mut bus = EventBus::new();
        let id = bus.subscribe("w", WorkerEventKind::ProcessJobPre, 0, recorder(log.clone(), "gone"));
        assert_eq!(bus.listener_count(WorkerEventKind::ProcessJobPre), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(bus.is_empty());

        publish(&bus, &["w"], WorkerEventKind::ProcessJobPre).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn subscribe_all_covers_every_kind() {
        let log = Log::default();
        let mut bus = EventBus::new();
        let ids = bus.subscribe_all("w", 0, recorder(log.clone(), "seen"));
        assert_eq!(ids.len(), WorkerEventKind::ALL.len());

        for kind in WorkerEventKind::ALL {
            publish(&bus, &["w"], kind).unwrap();
        }
        assert_eq!(log.lock().unwrap().len(), 4);

        bus.clear();
        assert_eq!(bus.listener_count(WorkerEventKind::ProcessQueuePost), 0);
    }
}
