use super::eon::Eon;
use std::sync::Arc;
use tokio::sync::watch;

/// The current eon together with the one it superseded.
#[derive(Debug, Clone)]
pub struct EonSnapshot {
    pub current: Arc<Eon>,
    /// Only read for cross eon matched amount deltas
    pub previous: Option<Arc<Eon>>,
}

/// Holds a wallet's eons as an immutable snapshot that writers swap out
/// wholesale. Readers grab one `Arc<EonSnapshot>` and never observe a
/// half applied update.
#[derive(Clone)]
pub struct Storage {
    eons: Arc<watch::Sender<Arc<EonSnapshot>>>,
}

impl Storage {
    pub fn new(current: Eon, previous: Option<Eon>) -> Self {
        let snapshot = EonSnapshot {
            current: Arc::new(current),
            previous: previous.map(Arc::new),
        };
        let (eons, _) = watch::channel(Arc::new(snapshot));
        Self {
            eons: Arc::new(eons),
        }
    }

    pub fn snapshot(&self) -> Arc<EonSnapshot> {
        self.eons.borrow().clone()
    }

    /// Notified every time a new snapshot is installed.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EonSnapshot>> {
        self.eons.subscribe()
    }

    /// Installs `update(current)` as the current eon, previous eon unchanged.
    pub fn update_current<F>(&self, update: F)
    where
        F: FnOnce(&Eon) -> Eon,
    {
        self.eons.send_modify(|snapshot| {
            let next = update(&snapshot.current);
            *snapshot = Arc::new(EonSnapshot {
                current: Arc::new(next),
                previous: snapshot.previous.clone(),
            });
        });
    }

    /// Archives the current eon as previous and installs `next`.
    pub fn roll_over(&self, next: Eon) {
        self.eons.send_modify(|snapshot| {
            *snapshot = Arc::new(EonSnapshot {
                current: Arc::new(next),
                previous: Some(snapshot.current.clone()),
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::tests::{me, other, transfer};

    #[test]
    fn readers_keep_their_snapshot() {
        let storage = Storage::new(Eon::empty(1), None);
        let before = storage.snapshot();

        storage.update_current(|eon| eon.with_transfer(transfer(1, me(), other(), 5)));
        assert!(before.current.transfers().is_empty());
        assert_eq!(storage.snapshot().current.transfers().len(), 1);
        assert!(storage.snapshot().previous.is_none());
    }

    #[test]
    fn roll_over_archives_current() {
        let storage = Storage::new(Eon::empty(1), None);
        storage.update_current(|eon| eon.with_transfer(transfer(1, me(), other(), 5)));
        let old = storage.snapshot().current.clone();

        storage.roll_over(Eon::empty(2));
        let snapshot = storage.snapshot();
        assert_eq!(snapshot.current.eon_number(), 2);
        assert!(Arc::ptr_eq(snapshot.previous.as_ref().unwrap(), &old));
    }

    #[tokio::test]
    async fn subscribers_see_new_snapshots() {
        let storage = Storage::new(Eon::empty(1), None);
        let mut rx = storage.subscribe();
        storage.roll_over(Eon::empty(2));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().current.eon_number(), 2);
    }
}
