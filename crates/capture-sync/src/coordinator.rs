//! Queue coordinator.
//!
//! Two async locks guard the queue:
//!
//! - `state` protects the in-memory queue and the documents view. It is held
//!   across the persist call, so the file on disk always matches the queue
//!   order, but never across network I/O.
//! - `lane` serializes network attempts. A drain and an immediate attempt
//!   after `enqueue` never overlap, and every attempt re-reads its item by
//!   id, so an item that a drain already synced is not uploaded twice.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use capture_net::{FieldUpdater, NetError, ReachabilityMonitor, Subscription, UploadClient};
use capture_shared::{Document, FieldType, LocalImage, SyncStatus};
use capture_store::{ImageStore, QueueStore};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{DrainSummary, SyncEvent};
use crate::retry::RetrySchedule;

const EVENT_CAPACITY: usize = 64;

/// Result of one attempt at a queued capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Synced {
        url: String,
    },
    Failed {
        error: String,
        retry_count: u32,
        needs_attention: bool,
    },
    /// The item left the queue (synced, replaced or discarded) before the
    /// attempt got to it.
    Skipped,
}

struct QueueState {
    queue: Vec<LocalImage>,
    documents: BTreeMap<String, Document>,
}

struct Inner {
    store: QueueStore,
    images: Option<ImageStore>,
    uploader: Arc<dyn UploadClient>,
    updater: Arc<dyn FieldUpdater>,
    reachability: ReachabilityMonitor,
    config: SyncConfig,
    state: Mutex<QueueState>,
    lane: Mutex<()>,
    retry: StdMutex<RetrySchedule>,
    events: broadcast::Sender<SyncEvent>,
    last_drain: StdMutex<Option<DrainSummary>>,
}

#[derive(Clone)]
pub struct QueueCoordinator {
    inner: Arc<Inner>,
}

impl QueueCoordinator {
    /// Load the persisted queue and build a coordinator around it.
    ///
    /// Items persisted mid-upload (the process died during an attempt) go
    /// back to `pending`.
    pub async fn open(
        store: QueueStore,
        images: Option<ImageStore>,
        uploader: Arc<dyn UploadClient>,
        updater: Arc<dyn FieldUpdater>,
        reachability: ReachabilityMonitor,
        config: SyncConfig,
    ) -> Self {
        let mut queue = store.load().await;

        let mut interrupted = 0;
        for item in queue.iter_mut() {
            if item.sync_status == SyncStatus::Uploading {
                item.sync_status = SyncStatus::Pending;
                interrupted += 1;
            }
        }
        if interrupted > 0 {
            warn!(interrupted, "Resetting captures left mid-upload");
            if let Err(e) = store.save(&queue).await {
                error!(error = %e, "Failed to persist upload queue");
            }
        }

        info!(items = queue.len(), path = %store.path().display(), "Upload queue loaded");

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let retry = StdMutex::new(RetrySchedule::new(&config));

        Self {
            inner: Arc::new(Inner {
                store,
                images,
                uploader,
                updater,
                reachability,
                config,
                state: Mutex::new(QueueState {
                    queue,
                    documents: BTreeMap::new(),
                }),
                lane: Mutex::new(()),
                retry,
                events,
                last_drain: StdMutex::new(None),
            }),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Summary of the most recent drain that had work to do, whatever
    /// triggered it.
    pub fn last_drain(&self) -> Option<DrainSummary> {
        self.inner.last_drain.lock().ok().and_then(|last| last.clone())
    }

    pub fn is_online(&self) -> bool {
        self.inner.reachability.is_online()
    }

    // -----------------------------------------------------------------------
    // Queue operations
    // -----------------------------------------------------------------------

    /// Queue a fresh capture.
    ///
    /// A queued entry for the same document field is replaced. When online,
    /// an attempt is started in the background; this call does not wait
    /// for it.
    pub async fn enqueue(&self, mut image: LocalImage) -> LocalImage {
        image.sync_status = SyncStatus::Pending;
        image.retry_count = 0;
        image.last_error = None;

        let replaced = {
            let mut state = self.inner.state.lock().await;
            let existing = state
                .queue
                .iter()
                .position(|queued| queued.is_same_field(&image));
            let replaced = existing.map(|pos| state.queue.remove(pos));
            state.queue.push(image.clone());
            self.persist(&state.queue).await;
            replaced
        };

        match &replaced {
            Some(old) => {
                info!(
                    id = %image.id,
                    replaced = %old.id,
                    field = %image.key(),
                    "Re-capture replaced queued image"
                );
                if old.local_uri != image.local_uri {
                    self.remove_capture(&old.local_uri).await;
                }
            }
            None => info!(id = %image.id, field = %image.key(), "Capture queued"),
        }

        self.emit(SyncEvent::Enqueued {
            id: image.id.clone(),
            replaced: replaced.map(|old| old.id),
        });

        if self.is_online() {
            let this = self.clone();
            let id = image.id.clone();
            tokio::spawn(async move {
                this.attempt_item(&id).await;
            });
        }

        image
    }

    /// Upload one queued capture and write its URL back to the document.
    pub async fn attempt_item(&self, id: &str) -> AttemptOutcome {
        let outcome = {
            let _lane = self.inner.lane.lock().await;
            self.attempt_in_lane(id).await
        };

        if let AttemptOutcome::Failed {
            needs_attention: false,
            ..
        } = outcome
        {
            self.schedule_retry();
        }
        outcome
    }

    /// Attempt every queued capture in order, one at a time.
    ///
    /// Captures parked as `needs_attention` are skipped. Synced captures
    /// leave the queue; failed ones stay with their retry count bumped.
    pub async fn drain_queue(&self) -> DrainSummary {
        let summary = {
            let _lane = self.inner.lane.lock().await;
            self.drain_in_lane().await
        };

        if summary.retryable_failures() > 0 || summary.deferred > 0 {
            self.schedule_retry();
        } else if let Ok(mut retry) = self.inner.retry.lock() {
            retry.reset();
        }
        summary
    }

    /// User-initiated "sync now": drops any scheduled re-drain and drains.
    pub async fn sync_now(&self) -> DrainSummary {
        if let Ok(mut retry) = self.inner.retry.lock() {
            retry.reset();
        }
        self.drain_queue().await
    }

    /// Queued captures for one field of one document.
    pub async fn query_by_field(&self, document_id: &str, field_type: FieldType) -> Vec<LocalImage> {
        let state = self.inner.state.lock().await;
        state
            .queue
            .iter()
            .filter(|img| img.document_id == document_id && img.field_type == field_type)
            .cloned()
            .collect()
    }

    pub async fn queue(&self) -> Vec<LocalImage> {
        self.inner.state.lock().await.queue.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// Put a capture parked as `needs_attention` back in line.
    ///
    /// Returns `false` if no such capture is queued.
    pub async fn retry_item(&self, id: &str) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            let Some(item) = state.queue.iter_mut().find(|img| img.id == id) else {
                return false;
            };
            if item.sync_status == SyncStatus::NeedsAttention {
                item.sync_status = SyncStatus::Pending;
                info!(id, retry_count = item.retry_count, "Capture released for retry");
            }
            self.persist(&state.queue).await;
        }

        if self.is_online() {
            let this = self.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                this.attempt_item(&id).await;
            });
        }
        true
    }

    /// Drop a capture from the queue without syncing it.
    pub async fn discard(&self, id: &str) -> Option<LocalImage> {
        let removed = {
            let mut state = self.inner.state.lock().await;
            let pos = state.queue.iter().position(|img| img.id == id)?;
            let removed = state.queue.remove(pos);
            self.persist(&state.queue).await;
            removed
        };

        info!(id, "Capture discarded");
        self.remove_capture(&removed.local_uri).await;
        Some(removed)
    }

    // -----------------------------------------------------------------------
    // Documents view
    // -----------------------------------------------------------------------

    pub async fn set_documents(&self, documents: Vec<Document>) {
        let mut state = self.inner.state.lock().await;
        state.documents = documents.into_iter().map(|d| (d.id.clone(), d)).collect();
    }

    pub async fn upsert_document(&self, document: Document) {
        let mut state = self.inner.state.lock().await;
        state.documents.insert(document.id.clone(), document);
    }

    pub async fn document(&self, id: &str) -> Option<Document> {
        self.inner.state.lock().await.documents.get(id).cloned()
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.inner
            .state
            .lock()
            .await
            .documents
            .values()
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Reachability
    // -----------------------------------------------------------------------

    /// Drain whenever reachability flips to online.
    ///
    /// Keep the returned subscription alive for as long as the coordinator
    /// should react to reconnects. Must be called from within a Tokio
    /// runtime.
    pub fn attach(&self) -> Subscription {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let runtime = tokio::runtime::Handle::current();

        self.inner.reachability.subscribe(move |online| {
            if !online {
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let this = QueueCoordinator { inner };
            runtime.spawn(async move {
                this.on_reconnect().await;
            });
        })
    }

    async fn on_reconnect(&self) {
        let retryable = {
            let state = self.inner.state.lock().await;
            state.queue.iter().filter(|img| img.is_retryable()).count()
        };
        if retryable == 0 {
            debug!("Back online, nothing to sync");
            return;
        }

        info!(items = retryable, "Back online, syncing queued captures");
        if let Ok(mut retry) = self.inner.retry.lock() {
            retry.reset();
        }
        self.drain_queue().await;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn drain_in_lane(&self) -> DrainSummary {
        let ids: Vec<String> = {
            let state = self.inner.state.lock().await;
            state
                .queue
                .iter()
                .filter(|img| img.is_retryable())
                .map(|img| img.id.clone())
                .collect()
        };

        let mut summary = DrainSummary::default();
        if ids.is_empty() {
            summary.remaining = self.pending_count().await;
            return summary;
        }

        info!(items = ids.len(), "Draining upload queue");
        let started = Instant::now();

        for (i, id) in ids.iter().enumerate() {
            if started.elapsed() >= self.inner.config.drain_deadline {
                summary.deferred = ids.len() - i;
                warn!(
                    deferred = summary.deferred,
                    deadline_secs = self.inner.config.drain_deadline.as_secs(),
                    "Drain deadline reached, leaving the rest for the next pass"
                );
                break;
            }

            match self.attempt_in_lane(id).await {
                AttemptOutcome::Synced { .. } => {
                    summary.attempted += 1;
                    summary.synced += 1;
                }
                AttemptOutcome::Failed {
                    needs_attention, ..
                } => {
                    summary.attempted += 1;
                    summary.failed += 1;
                    if needs_attention {
                        summary.needs_attention += 1;
                    }
                }
                AttemptOutcome::Skipped => {}
            }
        }

        {
            let state = self.inner.state.lock().await;
            self.persist(&state.queue).await;
            summary.remaining = state.queue.len();
        }

        match summary.notice() {
            Some(notice) => warn!(
                synced = summary.synced,
                failed = summary.failed,
                remaining = summary.remaining,
                "{notice}"
            ),
            None => info!(
                synced = summary.synced,
                remaining = summary.remaining,
                "Drain finished"
            ),
        }

        if let Ok(mut last) = self.inner.last_drain.lock() {
            *last = Some(summary.clone());
        }
        self.emit(SyncEvent::DrainFinished(summary.clone()));
        summary
    }

    /// Caller holds the lane.
    async fn attempt_in_lane(&self, id: &str) -> AttemptOutcome {
        let image = {
            let mut state = self.inner.state.lock().await;
            let Some(item) = state.queue.iter_mut().find(|img| img.id == id) else {
                debug!(id, "Capture no longer queued, skipping");
                return AttemptOutcome::Skipped;
            };
            item.sync_status = SyncStatus::Uploading;
            let image = item.clone();
            self.persist(&state.queue).await;
            image
        };

        debug!(id, field = %image.key(), attempt = image.retry_count + 1, "Attempting capture");

        match self.sync_one(&image).await {
            Ok(url) => self.complete(&image, url).await,
            Err(e) => self.fail(&image, e).await,
        }
    }

    async fn sync_one(&self, image: &LocalImage) -> Result<String, SyncError> {
        let limit = self.inner.config.call_timeout;

        let url = with_timeout(
            limit,
            self.inner.uploader.upload(
                &image.local_uri,
                &image.document_id,
                image.field_type,
                image.field_index,
            ),
        )
        .await
        .map_err(SyncError::Upload)?;

        with_timeout(
            limit,
            self.inner.updater.update_field(
                &image.document_id,
                image.field_type,
                image.field_index,
                &url,
            ),
        )
        .await
        .map_err(SyncError::FieldUpdate)?;

        Ok(url)
    }

    async fn complete(&self, image: &LocalImage, url: String) -> AttemptOutcome {
        {
            let mut state = self.inner.state.lock().await;
            state.queue.retain(|img| img.id != image.id);

            if let Some(doc) = state.documents.get_mut(&image.document_id) {
                if let Err(e) = doc.attach_image(image.field_type, image.field_index, &url) {
                    warn!(id = %image.id, error = %e, "Documents view out of step with remote");
                }
            }

            self.persist(&state.queue).await;
        }

        info!(id = %image.id, field = %image.key(), url = %url, "Capture synced");
        self.remove_capture(&image.local_uri).await;

        self.emit(SyncEvent::ItemSynced {
            id: image.id.clone(),
            document_id: image.document_id.clone(),
            url: url.clone(),
        });
        AttemptOutcome::Synced { url }
    }

    async fn fail(&self, image: &LocalImage, err: SyncError) -> AttemptOutcome {
        let message = err.to_string();

        let (retry_count, needs_attention) = {
            let mut state = self.inner.state.lock().await;
            let Some(item) = state.queue.iter_mut().find(|img| img.id == image.id) else {
                debug!(id = %image.id, error = %message, "Capture left the queue during a failed attempt");
                return AttemptOutcome::Skipped;
            };

            item.record_failure(message.clone());
            let needs_attention =
                err.is_permanent() || item.retry_count >= self.inner.config.max_attempts;
            if needs_attention {
                item.sync_status = SyncStatus::NeedsAttention;
            }
            let retry_count = item.retry_count;
            self.persist(&state.queue).await;
            (retry_count, needs_attention)
        };

        if needs_attention {
            error!(
                id = %image.id,
                retry_count,
                permanent = err.is_permanent(),
                error = %message,
                "Capture needs attention, automatic retries stopped"
            );
        } else if err.is_unauthorized() {
            error!(
                id = %image.id,
                retry_count,
                error = %message,
                "Remote refused credentials, check the configured token"
            );
        } else {
            warn!(id = %image.id, retry_count, error = %message, "Capture attempt failed");
        }

        self.emit(SyncEvent::ItemFailed {
            id: image.id.clone(),
            retry_count,
            error: message.clone(),
            needs_attention,
        });
        AttemptOutcome::Failed {
            error: message,
            retry_count,
            needs_attention,
        }
    }

    /// Schedule a backoff re-drain while online and none is pending.
    fn schedule_retry(&self) {
        if !self.is_online() {
            return;
        }
        let Ok(mut retry) = self.inner.retry.lock() else {
            return;
        };
        if retry.has_pending() {
            return;
        }
        let Some(delay) = retry.next_delay() else {
            info!("Automatic retries exhausted, waiting for reconnect or manual sync");
            return;
        };

        debug!(delay_ms = delay.as_millis() as u64, "Scheduling automatic re-drain");
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Ok(mut retry) = inner.retry.lock() {
                retry.clear_pending();
            }
            let this = QueueCoordinator { inner };
            if this.is_online() {
                this.drain_queue().await;
            }
        });
        retry.set_pending(handle);
    }

    async fn persist(&self, queue: &[LocalImage]) {
        if let Err(e) = self.inner.store.save(queue).await {
            error!(
                path = %self.inner.store.path().display(),
                error = %e,
                "Failed to persist upload queue"
            );
        }
    }

    async fn remove_capture(&self, local_uri: &str) {
        if let Some(images) = &self.inner.images {
            images.remove(local_uri).await;
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, NetError>>,
) -> Result<T, NetError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(NetError::Timeout(limit.as_millis() as u64)),
    }
}
