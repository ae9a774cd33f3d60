//! CDP binding - sweep a real browser page
//!
//! The page's DOM is mirrored into a [`LivePage`]:
//! 1. wait for activation (URL matches, load event has fired)
//! 2. `DOM.getDocument` for the full tree
//! 3. replay DOM events onto the mirror, one mutation step per event
//!
//! The sweeper runs against the mirror as it would against any page, and
//! every element it removes is removed in the browser with `DOM.removeNode`.
//! The browser echoes that back as `DOM.childNodeRemoved` for a node the
//! mirror already detached, which is a no-op.

use async_trait::async_trait;
use dom::{DomArena, DomSerializer, DomService, RemoteId};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::client::{self, CdpClient};
use super::protocol::{events, CdpEvent, TargetInfo};
use super::session::CdpSession;
use crate::activation::ActivationPatterns;
use crate::config::SweeperConfig;
use crate::error::Result;
use crate::events::SweepEvent;
use crate::page::LivePage;
use crate::sweeper::AdSweeper;

/// What replaying one event did to the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorUpdate {
    Applied,
    /// An inserted node reported children the browser has not sent yet
    NeedsChildren(RemoteId),
    Ignored,
}

/// Replay one DOM event onto the mirror
pub fn apply_event(
    service: &DomService,
    document: &mut DomArena,
    method: &str,
    params: &Value,
) -> dom::Result<MirrorUpdate> {
    match method {
        events::CHILD_NODE_INSERTED => {
            service.apply_child_node_inserted(document, params)?;

            let node = &params["node"];
            let has_unsent_children =
                node["childNodeCount"].as_u64().unwrap_or(0) > 0 && node.get("children").is_none();
            match node["nodeId"].as_u64() {
                Some(remote_id) if has_unsent_children => {
                    Ok(MirrorUpdate::NeedsChildren(remote_id as RemoteId))
                }
                _ => Ok(MirrorUpdate::Applied),
            }
        }
        events::CHILD_NODE_REMOVED => {
            service.apply_child_node_removed(document, params)?;
            Ok(MirrorUpdate::Applied)
        }
        events::SET_CHILD_NODES => {
            service.apply_set_child_nodes(document, params)?;
            Ok(MirrorUpdate::Applied)
        }
        events::ATTRIBUTE_MODIFIED => {
            service.apply_attribute_modified(document, params)?;
            Ok(MirrorUpdate::Applied)
        }
        events::ATTRIBUTE_REMOVED => {
            service.apply_attribute_removed(document, params)?;
            Ok(MirrorUpdate::Applied)
        }
        _ => Ok(MirrorUpdate::Ignored),
    }
}

/// One page target under the sweeper
pub struct CdpBinding {
    session: CdpSession,
    config: SweeperConfig,
    patterns: ActivationPatterns,
    service: DomService,
}

impl CdpBinding {
    pub async fn attach(
        client: Arc<CdpClient>,
        target: &TargetInfo,
        config: SweeperConfig,
    ) -> Result<Self> {
        let patterns = config.activation_patterns()?;
        let session = CdpSession::attach(client, target.target_id.clone()).await?;

        Ok(Self {
            session,
            config,
            patterns,
            service: DomService::new(),
        })
    }

    pub fn session(&self) -> &CdpSession {
        &self.session
    }

    /// Mirror and sweep until the target detaches or the connection closes
    pub async fn run(self) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriptions = self.subscribe(tx);

        let outcome = self.mirror(&mut rx).await;

        let client = self.session.client();
        for (method, id) in subscriptions {
            client.unsubscribe(method, id);
        }
        if let Err(e) = &outcome {
            tracing::warn!("[CdpBinding] {} stopped: {}", self.session.target_id, e);
        }
        outcome
    }

    /// Route this session's events into one ordered channel
    fn subscribe(&self, tx: mpsc::UnboundedSender<CdpEvent>) -> Vec<(&'static str, Uuid)> {
        let client = self.session.client();
        events::MIRRORED
            .iter()
            .map(|&method| {
                let tx = tx.clone();
                let session_id = self.session.session_id.clone();
                let id = client.subscribe(
                    method,
                    Arc::new(move |event: CdpEvent| {
                        if event.is_for(&session_id) {
                            let _ = tx.send(event);
                        }
                    }),
                );
                (method, id)
            })
            .collect()
    }

    /// Next event for this page; None once it is gone
    async fn next_event(&self, inbox: &mut mpsc::UnboundedReceiver<CdpEvent>) -> Option<CdpEvent> {
        tokio::select! {
            event = inbox.recv() => match event {
                Some(event) if event.method == events::DETACHED_FROM_TARGET => {
                    tracing::info!("[CdpBinding] Detached from {}", self.session.target_id);
                    None
                }
                other => other,
            },
            _ = self.session.client().closed() => None,
        }
    }

    async fn mirror(&self, inbox: &mut mpsc::UnboundedReceiver<CdpEvent>) -> Result<()> {
        let info = self.session.target_info().await?;
        if !self.patterns.matches(&info.url) {
            tracing::info!("[CdpBinding] {} matches no activation pattern, skipping", info.url);
            return Ok(());
        }

        // document-idle
        if !self.session.is_loaded().await? {
            tracing::debug!("[CdpBinding] Waiting for load event on {}", info.url);
            loop {
                match self.next_event(inbox).await {
                    Some(event) if event.method == events::LOAD_EVENT_FIRED => break,
                    Some(_) => continue,
                    None => return Ok(()),
                }
            }
        }

        let mut document = DomArena::new();
        self.service
            .parse_document(&mut document, &self.session.get_document().await?)?;
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Ok(outline) = DomSerializer::new().serialize(&document) {
                tracing::trace!("[CdpBinding] Mirrored document:\n{}", outline);
            }
        }
        let page = Arc::new(LivePage::new(document));

        let sweeper = AdSweeper::from_config(page.clone(), &self.config);
        let forwarder = tokio::spawn(forward_removals(
            self.session.clone(),
            sweeper.events().subscribe(),
        ));

        tracing::info!("[CdpBinding] Activated on {}", info.url);
        sweeper.events().publish(SweepEvent::Activated {
            url: info.url.clone(),
        });
        sweeper.schedule_initial();
        let watch = sweeper.watch();

        while let Some(event) = self.next_event(inbox).await {
            if event.method == events::DOCUMENT_UPDATED {
                self.reload(&page, &sweeper).await;
                continue;
            }

            let update = page
                .mutate(|document| apply_event(&self.service, document, &event.method, event.params()))
                .await;

            match update {
                Ok(MirrorUpdate::NeedsChildren(remote_id)) => {
                    if let Err(e) = self.session.request_child_nodes(remote_id).await {
                        tracing::warn!(
                            "[CdpBinding] DOM.requestChildNodes failed for {}: {}",
                            remote_id,
                            e
                        );
                    }
                }
                Ok(_) => {}
                // Usually an event for a node outside the mirrored tree
                Err(e) => tracing::warn!("[CdpBinding] Failed to apply {}: {}", event.method, e),
            }
        }

        watch.disconnect().await;
        forwarder.abort();
        Ok(())
    }

    /// The browser replaced the document; rebuild the mirror and start over
    async fn reload(&self, page: &LivePage, sweeper: &AdSweeper) {
        let document = match self.session.get_document().await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("[CdpBinding] DOM.getDocument failed after update: {}", e);
                return;
            }
        };

        let rebuilt = page
            .mutate(|arena| self.service.parse_document(arena, &document))
            .await;
        match rebuilt {
            Ok(_) => {
                tracing::debug!("[CdpBinding] Document replaced, rescheduling initial sweeps");
                sweeper.schedule_initial();
            }
            Err(e) => tracing::warn!("[CdpBinding] Failed to rebuild mirror: {}", e),
        }
    }
}

/// Where removals from the mirror are replayed
#[async_trait]
pub trait NodeRemover: Send + Sync + 'static {
    async fn remove_node(&self, remote_id: RemoteId) -> client::Result<()>;
}

#[async_trait]
impl NodeRemover for CdpSession {
    async fn remove_node(&self, remote_id: RemoteId) -> client::Result<()> {
        CdpSession::remove_node(self, remote_id).await
    }
}

/// Remove from the browser whatever the sweeper removed from the mirror
///
/// Elements without a remote id were never in the browser and are skipped.
async fn forward_removals<R: NodeRemover>(remover: R, mut events: broadcast::Receiver<SweepEvent>) {
    loop {
        match events.recv().await {
            Ok(SweepEvent::Swept { removed, .. }) => {
                for element in removed {
                    let Some(remote_id) = element.remote_id else {
                        continue;
                    };
                    if let Err(e) = remover.remove_node(remote_id).await {
                        tracing::warn!(
                            "[CdpBinding] DOM.removeNode failed for {}: {}",
                            element.label,
                            e
                        );
                    }
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("[CdpBinding] Missed {} sweep events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
