//! Scripted collaborators for coordinator tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use capture_net::{FieldUpdater, NetError, Probe, UploadClient};
use capture_shared::{Document, FieldType};

#[derive(Default)]
pub(crate) struct StubUploader {
    pub calls: AtomicUsize,
    fail_always: AtomicBool,
    refuse_credentials: AtomicBool,
    fail_next: AtomicUsize,
    fail_documents: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    fixed_url: Mutex<Option<String>>,
}

impl StubUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_always(self: &Arc<Self>) -> Arc<Self> {
        self.fail_always.store(true, Ordering::SeqCst);
        self.clone()
    }

    pub fn refuse_credentials(self: &Arc<Self>) -> Arc<Self> {
        self.refuse_credentials.store(true, Ordering::SeqCst);
        self.clone()
    }

    pub fn fail_next(self: &Arc<Self>, n: usize) -> Arc<Self> {
        self.fail_next.store(n, Ordering::SeqCst);
        self.clone()
    }

    pub fn fail_document(self: &Arc<Self>, document_id: &str) -> Arc<Self> {
        self.fail_documents
            .lock()
            .unwrap()
            .insert(document_id.to_string());
        self.clone()
    }

    pub fn with_delay(self: &Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = Some(delay);
        self.clone()
    }

    pub fn with_url(self: &Arc<Self>, url: &str) -> Arc<Self> {
        *self.fixed_url.lock().unwrap() = Some(url.to_string());
        self.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadClient for StubUploader {
    async fn upload(
        &self,
        _local_uri: &str,
        document_id: &str,
        field_type: FieldType,
        field_index: usize,
    ) -> Result<String, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.refuse_credentials.load(Ordering::SeqCst) {
            return Err(NetError::Unauthorized {
                status: 401,
                body: "token expired".into(),
            });
        }

        let scripted_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure
            || self.fail_always.load(Ordering::SeqCst)
            || self.fail_documents.lock().unwrap().contains(document_id)
        {
            return Err(NetError::Status {
                status: 503,
                body: "storage unavailable".into(),
            });
        }

        let fixed = self.fixed_url.lock().unwrap().clone();
        Ok(fixed.unwrap_or_else(|| {
            format!("https://storage.test/{document_id}/{field_type}/{field_index}.jpg")
        }))
    }
}

/// Stand-in for the remote document store.
#[derive(Default)]
pub(crate) struct StubUpdater {
    pub documents: Mutex<BTreeMap<String, Document>>,
}

impl StubUpdater {
    pub fn with_documents(docs: Vec<Document>) -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(docs.into_iter().map(|d| (d.id.clone(), d)).collect()),
        })
    }

    pub fn image_url(&self, document_id: &str, field_type: FieldType, index: usize) -> Option<String> {
        self.documents
            .lock()
            .unwrap()
            .get(document_id)
            .and_then(|d| d.image_url(field_type, index).map(str::to_string))
    }
}

#[async_trait]
impl FieldUpdater for StubUpdater {
    async fn update_field(
        &self,
        document_id: &str,
        field_type: FieldType,
        field_index: usize,
        url: &str,
    ) -> Result<(), NetError> {
        let mut docs = self.documents.lock().unwrap();
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| NetError::DocumentNotFound(document_id.to_string()))?;
        doc.attach_image(field_type, field_index, url)
            .map_err(|_| NetError::DocumentNotFound(document_id.to_string()))
    }
}

pub(crate) struct StaticProbe {
    pub online: AtomicBool,
}

impl StaticProbe {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
        })
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Probe for StaticProbe {
    async fn probe(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
