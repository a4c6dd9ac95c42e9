//! Online/offline tracking.
//!
//! The runtime's network signal is consumed through [`NetworkSignal`]; the
//! [`ConnectivityMonitor`] turns its events into a single `is_online` flag
//! and notifies listeners once per actual transition. There is no polling
//! and no debouncing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Identifier returned by `subscribe`, used to unsubscribe.
pub type SubscriptionId = String;

/// Reachability event emitted by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Reachable,
    Unreachable,
}

/// A state change observed by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityChange {
    pub online: bool,
}

/// Boundary with the runtime's network-state signal.
pub trait NetworkSignal: Send + Sync {
    /// Current reachability, read synchronously.
    fn is_reachable(&self) -> bool;

    /// Start receiving reachability events.
    fn subscribe(&self, sender: mpsc::UnboundedSender<NetworkEvent>) -> SubscriptionId;

    /// Stop receiving events for a subscription.
    fn unsubscribe(&self, id: &str);
}

/// A network signal driven by hand.
///
/// Embedders bridge their platform's reachability callbacks into it; tests
/// use it to simulate connectivity changes.
#[derive(Debug, Default)]
pub struct ManualSignal {
    reachable: AtomicBool,
    subscribers: DashMap<SubscriptionId, mpsc::UnboundedSender<NetworkEvent>>,
}

impl ManualSignal {
    /// Create a signal with the given initial reachability.
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            subscribers: DashMap::new(),
        }
    }

    /// Create a signal wrapped in Arc for sharing.
    pub fn new_shared(reachable: bool) -> Arc<Self> {
        Arc::new(Self::new(reachable))
    }

    /// Report a reachability change to every subscriber.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn set_reachable(&self, reachable: bool) -> usize {
        self.reachable.store(reachable, Ordering::Release);
        let event = if reachable {
            NetworkEvent::Reachable
        } else {
            NetworkEvent::Unreachable
        };

        let mut sent = 0;
        for entry in self.subscribers.iter() {
            if entry.value().send(event).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl NetworkSignal for ManualSignal {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    fn subscribe(&self, sender: mpsc::UnboundedSender<NetworkEvent>) -> SubscriptionId {
        let id = uuid::Uuid::new_v4().to_string();
        self.subscribers.insert(id.clone(), sender);
        id
    }

    fn unsubscribe(&self, id: &str) {
        self.subscribers.remove(id);
    }
}

/// Tracks whether the device is online.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    listeners: DashMap<SubscriptionId, mpsc::UnboundedSender<ConnectivityChange>>,
    source: Mutex<Option<(Arc<dyn NetworkSignal>, SubscriptionId)>>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ConnectivityMonitor {
    /// Create a monitor with a fixed initial state and no signal attached.
    ///
    /// State changes are then applied with [`ConnectivityMonitor::set_online`].
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
            listeners: DashMap::new(),
            source: Mutex::new(None),
        })
    }

    /// Create a monitor that follows a network signal.
    ///
    /// Subscribes first and only then reads the signal's current state, so
    /// a change in between arrives as an event. Every event the signal
    /// emits afterwards is applied. Must be called within a Tokio runtime.
    pub fn watch(signal: Arc<dyn NetworkSignal>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = signal.subscribe(tx);
        let monitor = Self::new(signal.is_reachable());

        if let Ok(mut source) = monitor.source.lock() {
            *source = Some((signal, subscription));
        }

        let weak: Weak<Self> = Arc::downgrade(&monitor);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                monitor.set_online(event == NetworkEvent::Reachable);
            }
        });

        tracing::debug!(online = monitor.is_online(), "Connectivity monitor attached");
        monitor
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Apply a reachability observation.
    ///
    /// Listeners are notified only when the state actually changes.
    /// Returns whether it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::AcqRel);
        if previous == online {
            return false;
        }

        tracing::info!(online, "Connectivity changed");
        let change = ConnectivityChange { online };
        self.listeners
            .retain(|_, listener| listener.send(change).is_ok());
        true
    }

    /// Register a listener for state changes.
    pub fn subscribe(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<ConnectivityChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = uuid::Uuid::new_v4().to_string();
        self.listeners.insert(id.clone(), tx);
        (id, rx)
    }

    /// Remove a listener.
    pub fn unsubscribe(&self, id: &str) {
        self.listeners.remove(id);
    }

    /// Stop following the network signal, if one is attached.
    pub fn detach(&self) {
        let source = self.source.lock().ok().and_then(|mut source| source.take());
        if let Some((signal, subscription)) = source {
            signal.unsubscribe(&subscription);
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.detach();
    }
}
