use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per document id.
///
/// Entries hold weak references, so a document's lock disappears once no
/// writer holds or awaits it.
#[derive(Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `document_id`.
    pub async fn lock(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self.handle(document_id);
        mutex.lock_owned().await
    }

    fn handle(&self, document_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();

        if let Some(existing) = locks.get(document_id).and_then(Weak::upgrade) {
            return existing;
        }

        locks.retain(|_, weak| weak.strong_count() > 0);
        let mutex = Arc::new(AsyncMutex::new(()));
        locks.insert(document_id.to_string(), Arc::downgrade(&mutex));
        mutex
    }

    /// Number of ids with a live lock.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
