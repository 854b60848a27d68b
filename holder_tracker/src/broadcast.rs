//! Delivery of holder events to connected subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use abi::{DiffResult, InitialData, ServerEvent};
use log::{debug, error, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

pub type SubscriberId = usize;

/// Frames a subscriber may have queued before it is dropped as stalled.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Where the tracker hands its output.
pub trait BroadcastSink: Send + Sync {
    /// Full committed holder set for one newly attached subscriber.
    fn send_initial(&self, subscriber: SubscriberId, payload: &InitialData);

    /// Changes of one cycle, for every subscriber.
    fn send_diff(&self, diff: &DiffResult);
}

type Subscribers = HashMap<SubscriberId, mpsc::Sender<String>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A subscriber that is registered but may not have its initial payload yet.
///
/// Diffs are held back while this is alive, so the initial payload must be
/// built and sent before it is dropped.
pub struct Registration<'a> {
    id: SubscriberId,
    _gate: MutexGuard<'a, ()>,
}

impl Registration<'_> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

/// Registry of bounded subscriber queues carrying serialized [`ServerEvent`]
/// frames. A subscriber whose queue is full is dropped.
pub struct SubscriberHub {
    next_id: AtomicUsize,
    capacity: usize,
    gate: Mutex<()>,
    subscribers: Mutex<Subscribers>,
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            capacity: capacity.max(1),
            gate: Mutex::new(()),
            subscribers: Mutex::new(Subscribers::new()),
        }
    }

    /// Opens a queue for a new subscriber.
    pub fn channel(&self) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(self.capacity)
    }

    /// Registers `tx`. A diff sent after the returned registration is dropped
    /// reaches the subscriber; one sent before it is already in the committed
    /// snapshot the initial payload is built from. A diff already contained
    /// in the payload may still arrive once; entries carry absolute balances,
    /// so applying it twice is harmless.
    pub fn register(&self, tx: mpsc::Sender<String>) -> Registration<'_> {
        let gate = lock(&self.gate);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).insert(id, tx);
        Registration { id, _gate: gate }
    }

    pub fn remove(&self, subscriber: SubscriberId) {
        lock(&self.subscribers).remove(&subscriber);
    }

    pub fn len(&self) -> usize {
        lock(&self.subscribers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues `frame`, returning false when the subscriber has to go.
    fn offer(id: SubscriberId, tx: &mpsc::Sender<String>, frame: String) -> bool {
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("subscriber {} is not keeping up, dropping it", id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("subscriber {} closed its channel", id);
                false
            }
        }
    }
}

impl BroadcastSink for SubscriberHub {
    fn send_initial(&self, subscriber: SubscriberId, payload: &InitialData) {
        let frame = match serde_json::to_string(&ServerEvent::InitialData(payload.clone())) {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to encode initial data: {}", e);
                return;
            }
        };
        let mut subscribers = lock(&self.subscribers);
        let Some(tx) = subscribers.get(&subscriber) else {
            debug!("subscriber {} is gone", subscriber);
            return;
        };
        if !Self::offer(subscriber, tx, frame) {
            subscribers.remove(&subscriber);
        }
    }

    fn send_diff(&self, diff: &DiffResult) {
        let frame = match serde_json::to_string(&ServerEvent::Update(diff.clone())) {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to encode update: {}", e);
                return;
            }
        };
        let _gate = lock(&self.gate);
        lock(&self.subscribers).retain(|id, tx| Self::offer(*id, tx, frame.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::{Holder, RemovedHolder, TokenConfig};
    use rust_decimal::Decimal;
    use serde_json::Value;

    fn initial(holders: Vec<Holder>) -> InitialData {
        InitialData {
            holders,
            token_config: TokenConfig {
                mint: "mint".into(),
                decimals: 6,
                bonding_curve_address: None,
                liquidity_pool_address: None,
            },
            pump_data: None,
        }
    }

    fn attach(hub: &SubscriberHub, payload: InitialData) -> (SubscriberId, mpsc::Receiver<String>) {
        let (tx, rx) = hub.channel();
        let registration = hub.register(tx);
        hub.send_initial(registration.id(), &payload);
        (registration.id(), rx)
    }

    fn added(address: &str) -> DiffResult {
        DiffResult {
            added: vec![Holder::new(address, Decimal::TEN)],
            ..Default::default()
        }
    }

    #[test]
    fn initial_comes_before_updates() {
        let hub = SubscriberHub::new();
        let (id, mut rx) = attach(&hub, initial(vec![Holder::new("A", Decimal::ONE)]));
        assert_eq!(hub.len(), 1);

        hub.send_diff(&DiffResult {
            removed: vec![RemovedHolder { address: "A".into() }],
            ..Default::default()
        });

        let first: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["event"], "initial_data");
        assert_eq!(first["data"]["holders"][0]["address"], "A");
        assert_eq!(first["data"]["tokenConfig"]["mint"], "mint");

        let second: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["event"], "update");
        assert_eq!(second["data"]["removed"][0]["address"], "A");

        hub.remove(id);
        assert!(hub.is_empty());
    }

    #[test]
    fn diff_reaches_every_subscriber() {
        let hub = SubscriberHub::new();
        let (_, mut rx1) = attach(&hub, initial(vec![]));
        let (_, mut rx2) = attach(&hub, initial(vec![]));
        rx1.try_recv().unwrap();
        rx2.try_recv().unwrap();

        hub.send_diff(&added("C"));

        assert!(rx1.try_recv().unwrap().contains("\"C\""));
        assert!(rx2.try_recv().unwrap().contains("\"C\""));
    }

    #[test]
    fn closed_subscriber_is_dropped() {
        let hub = SubscriberHub::new();
        let (_, rx1) = attach(&hub, initial(vec![]));
        let (_, mut rx2) = attach(&hub, initial(vec![]));
        drop(rx1);
        rx2.try_recv().unwrap();

        hub.send_diff(&added("C"));

        assert!(rx2.try_recv().is_ok());
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn stalled_subscriber_is_dropped_when_queue_fills() {
        let hub = SubscriberHub::with_capacity(2);
        let (_, _stalled) = attach(&hub, initial(vec![]));
        let (_, mut live) = attach(&hub, initial(vec![]));

        for i in 0..3 {
            hub.send_diff(&added(&format!("holder{i}")));
            while live.try_recv().is_ok() {}
        }

        assert_eq!(hub.len(), 1);
        hub.send_diff(&added("D"));
        assert!(live.try_recv().unwrap().contains("\"D\""));
    }

    #[test]
    fn initial_to_unknown_subscriber_is_ignored() {
        let hub = SubscriberHub::new();
        hub.send_initial(42, &initial(vec![]));
        assert!(hub.is_empty());
    }
}
