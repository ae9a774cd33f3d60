//! Mutation watch
//!
//! Only added nodes are inspected: a removal can never introduce an ad.

use dom::{DomArena, MutationBatch};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::page::LivePage;
use crate::selector::AdSelector;

/// Does this batch add an element that is, or contains, an ad candidate?
pub fn is_ad_bearing(selector: &AdSelector, document: &DomArena, batch: &MutationBatch) -> bool {
    batch.added_nodes().any(|node_id| {
        let is_element = document
            .get(node_id)
            .map(|node| node.is_element())
            .unwrap_or(false);
        is_element && selector.matches_subtree(document, node_id)
    })
}

/// Owned handle to the page-wide mutation subscription
///
/// Dropping the handle leaves the subscription running until the page
/// itself is dropped; call [`WatchHandle::disconnect`] to end it sooner.
pub struct WatchHandle {
    pub(crate) subscription_id: Uuid,
    pub(crate) page: Weak<LivePage>,
    pub(crate) task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn subscription_id(&self) -> Uuid {
        self.subscription_id
    }

    /// Unsubscribe and wait for the watch loop to finish
    ///
    /// A sweep already scheduled by the watcher still runs.
    pub async fn disconnect(self) {
        if let Some(page) = self.page.upgrade() {
            page.unobserve(self.subscription_id);
        }
        if let Err(e) = self.task.await {
            tracing::warn!("[Watch] Watch task ended abnormally: {}", e);
        }
    }

    pub(crate) fn new(subscription_id: Uuid, page: &Arc<LivePage>, task: JoinHandle<()>) -> Self {
        Self {
            subscription_id,
            page: Arc::downgrade(page),
            task,
        }
    }
}
