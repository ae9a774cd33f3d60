//! AdSweeper - sweep, initial schedule, mutation watch
//!
//! Cheap to clone. Spawned deferrals and the watch loop hold the page
//! weakly: once every [`AdSweeper`] and the host have let go of the page,
//! it is dropped, its observers close, and the watch loop ends.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::config::SweeperConfig;
use crate::events::{EventBus, SweepEvent, SweepTrigger};
use crate::page::LivePage;
use crate::schedule::{FrameClock, IntervalFrameClock, SweepCoalescer, WatchState};
use crate::selector::AdSelector;
use crate::sweep::{sweep_document, SweepResult};
use crate::watch::{is_ad_bearing, WatchHandle};

struct Inner {
    selector: Arc<AdSelector>,
    frames: Arc<dyn FrameClock>,
    initial_delays: Vec<Duration>,
    coalescer: SweepCoalescer,
    events: EventBus,
}

#[derive(Clone)]
pub struct AdSweeper {
    page: Arc<LivePage>,
    inner: Arc<Inner>,
}

impl AdSweeper {
    pub fn new(
        page: Arc<LivePage>,
        selector: Arc<AdSelector>,
        frames: Arc<dyn FrameClock>,
        initial_delays: Vec<Duration>,
    ) -> Self {
        Self {
            page,
            inner: Arc::new(Inner {
                selector,
                frames,
                initial_delays,
                coalescer: SweepCoalescer::new(),
                events: EventBus::new(),
            }),
        }
    }

    pub fn from_config(page: Arc<LivePage>, config: &SweeperConfig) -> Self {
        Self::new(
            page,
            Arc::new(config.selector()),
            Arc::new(IntervalFrameClock::new(config.frame_interval())),
            config.initial_delays(),
        )
    }

    pub fn page(&self) -> &Arc<LivePage> {
        &self.page
    }

    pub fn selector(&self) -> &AdSelector {
        &self.inner.selector
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn watch_state(&self) -> WatchState {
        self.inner.coalescer.state()
    }

    /// Run one sweep now
    pub async fn sweep(&self) -> SweepResult {
        self.inner.sweep(&self.page, SweepTrigger::Manual).await
    }

    /// Sweep on the next frame, then again after each configured delay
    ///
    /// Fire-and-forget: nothing here can be cancelled or awaited. Passes
    /// that come due after the page is gone are skipped.
    pub fn schedule_initial(&self) {
        let page = Arc::downgrade(&self.page);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.frames.next_frame().await;
            inner.sweep_if_alive(&page, SweepTrigger::Initial).await;

            for &delay in &inner.initial_delays {
                let page = page.clone();
                let follow_up = inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    follow_up
                        .sweep_if_alive(
                            &page,
                            SweepTrigger::FollowUp {
                                delay_ms: delay.as_millis() as u64,
                            },
                        )
                        .await;
                });
            }
        });
    }

    /// Subscribe to the page's mutations and re-sweep on ad-bearing batches
    ///
    /// Runs until [`WatchHandle::disconnect`] or until the page is dropped.
    pub fn watch(&self) -> WatchHandle {
        let mut subscription = self.page.observe();
        let subscription_id = subscription.id();
        let page = Arc::downgrade(&self.page);
        let inner = self.inner.clone();

        let task = tokio::spawn(async move {
            inner.events.publish(SweepEvent::WatchStarted);
            tracing::info!("[Watch] Observing document mutations");

            // The page owns the sending side: the stream ends when it drops
            while let Some(batch) = subscription.next().await {
                let Some(live) = page.upgrade() else {
                    break;
                };
                let ad_bearing = live
                    .read(|document| is_ad_bearing(&inner.selector, document, &batch))
                    .await;

                if ad_bearing {
                    inner.request_sweep(page.clone());
                }
            }

            tracing::info!("[Watch] Stopped observing document mutations");
            inner.events.publish(SweepEvent::WatchStopped);
        });

        WatchHandle::new(subscription_id, &self.page, task)
    }
}

impl Inner {
    async fn sweep(&self, page: &LivePage, trigger: SweepTrigger) -> SweepResult {
        let result = page
            .mutate(|document| sweep_document(&self.selector, document))
            .await;

        if result.is_empty() {
            tracing::debug!("[AdSweeper] No ad elements found ({:?})", trigger);
        } else {
            tracing::info!(
                "[AdSweeper] Removed {} ad elements in this pass ({:?})",
                result.count(),
                trigger
            );
        }

        self.events.publish(SweepEvent::Swept {
            trigger,
            removed: result.removed.clone(),
        });

        result
    }

    async fn sweep_if_alive(&self, page: &Weak<LivePage>, trigger: SweepTrigger) {
        match page.upgrade() {
            Some(page) => {
                self.sweep(&page, trigger).await;
            }
            None => tracing::debug!("[AdSweeper] Page gone, skipping {:?} sweep", trigger),
        }
    }

    /// Coalesced: at most one mutation-triggered sweep pending at a time
    fn request_sweep(self: &Arc<Self>, page: Weak<LivePage>) {
        if !self.coalescer.request() {
            tracing::trace!("[Watch] Sweep already pending, batch absorbed");
            return;
        }

        tracing::debug!("[Watch] Ad-bearing mutation batch, sweep scheduled");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.frames.next_frame().await;
            inner.coalescer.begin_sweep();
            inner.sweep_if_alive(&page, SweepTrigger::Mutation).await;
        });
    }
}
