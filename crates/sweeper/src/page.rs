//! Live page - the shared document plus its mutation feed
//!
//! The host (a CDP mirror, or a test) changes the tree through
//! [`LivePage::mutate`]. Each call is one step: it runs under the document
//! lock, and the records it produced are delivered as one
//! [`MutationBatch`] to every observer before the lock is released. An
//! observer therefore never sees a half-applied batch, and batches arrive
//! in the order they were applied.
//!
//! Detached subtrees are reclaimed after delivery once enough have piled
//! up, so node ids named by an old batch may have been freed or reused by
//! the time an observer reads the document.

use dashmap::DashMap;
use dom::{DomArena, MutationBatch};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Shared, mutable document with mutation subscriptions
pub struct LivePage {
    document: Mutex<DomArena>,
    observers: DashMap<Uuid, mpsc::UnboundedSender<Arc<MutationBatch>>>,
}

impl LivePage {
    pub fn new(document: DomArena) -> Self {
        Self {
            document: Mutex::new(document),
            observers: DashMap::new(),
        }
    }

    /// Apply one mutation step and deliver its records
    pub async fn mutate<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut DomArena) -> R,
    {
        let mut document = self.document.lock().await;
        let result = f(&mut *document);

        let records = document.take_records();
        if !records.is_empty() {
            self.deliver(Arc::new(MutationBatch::new(records)));
        }

        if document.needs_reclaim() {
            let freed = document.reclaim();
            tracing::trace!("[LivePage] Reclaimed {} detached nodes", freed);
        }

        result
    }

    /// Read-only access
    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&DomArena) -> R,
    {
        let document = self.document.lock().await;
        f(&*document)
    }

    /// Subscribe to mutation batches
    pub fn observe(&self) -> MutationSubscription {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.insert(id, tx);
        tracing::debug!("[LivePage] Observer registered: {}", id);
        MutationSubscription { id, rx }
    }

    /// Drop a subscription; its receiver sees the end of the stream
    pub fn unobserve(&self, id: Uuid) {
        if self.observers.remove(&id).is_some() {
            tracing::debug!("[LivePage] Observer removed: {}", id);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn deliver(&self, batch: Arc<MutationBatch>) {
        // Receivers that went away are pruned here
        self.observers.retain(|_, tx| tx.send(batch.clone()).is_ok());
    }
}

impl Default for LivePage {
    fn default() -> Self {
        let mut document = DomArena::new();
        document.create_document();
        Self::new(document)
    }
}

/// Receiving end of [`LivePage::observe`]
pub struct MutationSubscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<Arc<MutationBatch>>,
}

impl MutationSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next batch, or None once unobserved / the page is gone
    pub async fn next(&mut self) -> Option<Arc<MutationBatch>> {
        self.rx.recv().await
    }
}
