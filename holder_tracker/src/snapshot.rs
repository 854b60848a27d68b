use std::collections::HashMap;
use std::sync::Arc;

use abi::Holder;
use tokio::sync::watch;

/// Owner address to aggregated holder, for one fetch cycle.
pub type Snapshot = HashMap<String, Holder>;

/// Holders ordered by balance, largest first. Ties are broken by address so
/// the listing is stable across calls.
pub fn sorted_holders(snapshot: &Snapshot) -> Vec<Holder> {
    let mut holders: Vec<Holder> = snapshot.values().cloned().collect();
    holders.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| a.address.cmp(&b.address))
    });
    holders
}

/// Publishing side of the committed snapshot. Owned by the tracker worker.
pub struct SnapshotWriter {
    tx: watch::Sender<Arc<Snapshot>>,
}

/// Read-only view of the last committed snapshot.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<Snapshot>>,
}

pub fn committed_channel() -> (SnapshotWriter, SnapshotReader) {
    let (tx, rx) = watch::channel(Arc::new(Snapshot::new()));
    (SnapshotWriter { tx }, SnapshotReader { rx })
}

impl SnapshotWriter {
    pub fn publish(&self, snapshot: Arc<Snapshot>) {
        self.tx.send_replace(snapshot);
    }
}

impl SnapshotReader {
    pub fn current(&self) -> Arc<Snapshot> {
        self.rx.borrow().clone()
    }
}
