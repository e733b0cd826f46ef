#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use contentport::archive::reader::{StagedArchive, ATTACHMENTS_DIR, ATTACHMENTS_FILE, DOCUMENTS_FILE};
use contentport::db::job_repository::{Job, JobService, JobStatus};
use contentport::db::models::{
    AttachmentDescriptor, AttachmentFile, DocumentMode, DocumentRecord, PendingImportSession,
};
use contentport::db::repository::{ContentStore, PagePlacement, WriteOptions, WriteOutcome};
use contentport::db::session_repository::SessionRepository;
use contentport::error::{AppError, StoreError};
use contentport::import::orchestrator::{ImportRequest, ImportService};
use contentport::notify::{Notification, Notifier};
use contentport::registry::{
    ContentTypeRegistry, Field, FieldType, TypeHandler, TypeKind, TypeOptions,
};
use contentport::storage::client::BinaryStore;

pub const REQUESTER: &str = "editor";

/// Store id used for archived records of `document_id`.
pub fn qualified(document_id: &str, mode: DocumentMode) -> String {
    format!("{document_id}:en:{mode}")
}

/// A record as it would already exist in the content store.
pub fn stored(document_id: &str, mode: DocumentMode, doc_type: &str, title: &str) -> DocumentRecord {
    DocumentRecord::new(document_id, mode, doc_type, title)
        .with_field("_id", qualified(document_id, mode))
}

// ---------------------------------------------------------------------------
// Content store
// ---------------------------------------------------------------------------

/// Content store keyed by store id. `{documentId, mode}` and `{slug, mode}`
/// are unique, and singleton types hold at most one record per mode.
#[derive(Default)]
pub struct MemoryContentStore {
    pub records: Mutex<HashMap<String, DocumentRecord>>,
    pub placements: Mutex<Vec<(String, Option<PagePlacement>)>>,
    pub singleton_types: HashSet<String>,
}

impl MemoryContentStore {
    pub fn seed(&self, record: DocumentRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.store_id(), record);
    }

    pub fn get(&self, document_id: &str, mode: DocumentMode) -> Option<DocumentRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.document_id == document_id && r.mode == mode)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn identity_taken(records: &HashMap<String, DocumentRecord>, doc: &DocumentRecord) -> bool {
        records.contains_key(&doc.store_id())
            || records
                .values()
                .any(|r| r.document_id == doc.document_id && r.mode == doc.mode)
    }

    fn singleton_taken(&self, records: &HashMap<String, DocumentRecord>, doc: &DocumentRecord) -> bool {
        self.singleton_types.contains(&doc.doc_type)
            && records
                .values()
                .any(|r| r.doc_type == doc.doc_type && r.mode == doc.mode)
    }

    fn slug_taken(records: &HashMap<String, DocumentRecord>, doc: &DocumentRecord) -> bool {
        let Ok(slug) = doc.body.get_str("slug") else {
            return false;
        };
        records.values().any(|r| {
            r.store_id() != doc.store_id()
                && r.document_id != doc.document_id
                && r.mode == doc.mode
                && r.body.get_str("slug").ok() == Some(slug)
        })
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn insert(
        &self,
        doc: &DocumentRecord,
        options: &WriteOptions,
    ) -> Result<WriteOutcome, StoreError> {
        let mut records = self.records.lock().unwrap();
        if Self::identity_taken(&records, doc)
            || self.singleton_taken(&records, doc)
            || Self::slug_taken(&records, doc)
        {
            return Ok(WriteOutcome::Conflict);
        }
        records.insert(doc.store_id(), doc.clone());
        self.placements
            .lock()
            .unwrap()
            .push((doc.store_id(), options.placement.clone()));
        Ok(WriteOutcome::Written)
    }

    async fn update(
        &self,
        doc: &DocumentRecord,
        _options: &WriteOptions,
    ) -> Result<WriteOutcome, StoreError> {
        let mut records = self.records.lock().unwrap();
        if Self::slug_taken(&records, doc) {
            return Ok(WriteOutcome::Conflict);
        }

        // Like the Mongo store, keep the `_id` of the stored variant.
        let store_id = records
            .values()
            .find(|r| r.document_id == doc.document_id && r.mode == doc.mode)
            .map(DocumentRecord::store_id)
            .unwrap_or_else(|| doc.store_id());
        let doc = doc.clone().with_field("_id", store_id.clone());
        records.insert(store_id, doc);
        Ok(WriteOutcome::Written)
    }

    async fn find_one_of_type(
        &self,
        doc_type: &str,
        mode: DocumentMode,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.doc_type == doc_type && r.mode == mode)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Binary store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBinaryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub calls: Mutex<Vec<(&'static str, String)>>,
    pub failing: Mutex<HashSet<String>>,
}

impl MemoryBinaryStore {
    pub fn seed(&self, attachment_id: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(attachment_id.to_string(), bytes.to_vec());
    }

    pub fn fail_on(&self, attachment_id: &str) {
        self.failing.lock().unwrap().insert(attachment_id.to_string());
    }

    pub fn object(&self, attachment_id: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(attachment_id).cloned()
    }

    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().unwrap().clone()
    }

    async fn read(file: &AttachmentFile) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(&file.path)
            .await
            .map_err(|e| StoreError::Backend(format!("{}: {e}", file.path.display())))
    }
}

#[async_trait]
impl BinaryStore for MemoryBinaryStore {
    async fn insert_binary(
        &self,
        attachment_id: &str,
        file: &AttachmentFile,
    ) -> Result<WriteOutcome, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(("insert", attachment_id.to_string()));

        if self.failing.lock().unwrap().contains(attachment_id) {
            return Err(StoreError::Backend(format!("upload of {attachment_id} refused")));
        }
        if self.objects.lock().unwrap().contains_key(attachment_id) {
            return Ok(WriteOutcome::Conflict);
        }

        let bytes = Self::read(file).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(attachment_id.to_string(), bytes);
        Ok(WriteOutcome::Written)
    }

    async fn update_binary(
        &self,
        attachment_id: &str,
        file: &AttachmentFile,
        _metadata: &AttachmentDescriptor,
    ) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(("update", attachment_id.to_string()));

        let bytes = Self::read(file).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(attachment_id.to_string(), bytes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Jobs, notifications, sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryJobService {
    pub jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryJobService {
    pub fn job(&self, job_id: &str) -> Job {
        self.jobs.lock().unwrap().get(job_id).cloned().unwrap()
    }

    fn apply(&self, job_id: &str, f: impl FnOnce(&mut Job)) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        f(job);
        Ok(())
    }
}

#[async_trait]
impl JobService for MemoryJobService {
    async fn start(&self) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = Job::new(format!("job-{}", jobs.len() + 1));
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn set_total(&self, job_id: &str, total: u64) -> Result<(), StoreError> {
        self.apply(job_id, |job| job.total = total)
    }

    async fn success(&self, job_id: &str, n: u64) -> Result<(), StoreError> {
        self.apply(job_id, |job| job.good += n)
    }

    async fn failure(&self, job_id: &str, n: u64) -> Result<(), StoreError> {
        self.apply(job_id, |job| job.bad += n)
    }

    async fn end(&self, job_id: &str, ok: bool) -> Result<(), StoreError> {
        self.apply(job_id, |job| {
            job.status = if ok {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            job.ended_at = Some(chrono::Utc::now());
        })
    }

    async fn find_by_id(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }
}

/// Records every notification and dismissal.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, Notification)>>,
    pub dismissed: Mutex<Vec<(String, Duration)>>,
}

impl RecordingNotifier {
    pub fn keys(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key, _)| key.clone())
            .collect()
    }

    pub fn find(&self, message_key: &str) -> Option<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|(_, key, _)| key == message_key)
            .map(|(_, _, n)| n.clone())
    }

    pub fn dismissed(&self) -> Vec<(String, Duration)> {
        self.dismissed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        message_key: &str,
        notification: Notification,
    ) -> Result<Option<String>, AppError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((recipient.to_string(), message_key.to_string(), notification));
        Ok(Some(format!("notification-{}", sent.len())))
    }

    async fn dismiss(
        &self,
        _recipient: &str,
        notification_id: &str,
        delay: Duration,
    ) -> Result<(), AppError> {
        self.dismissed
            .lock()
            .unwrap()
            .push((notification_id.to_string(), delay));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionRepository {
    pub sessions: Mutex<HashMap<String, PendingImportSession>>,
}

impl MemorySessionRepository {
    pub fn get(&self, session_id: &str) -> Option<PendingImportSession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn save(&self, session: &PendingImportSession) -> Result<(), AppError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<PendingImportSession>, AppError> {
        Ok(self.get(session_id))
    }

    async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        self.sessions.lock().unwrap().remove(session_id);
        Ok(())
    }
}

/// Session store whose every write fails.
pub struct UnavailableSessions;

#[async_trait]
impl SessionRepository for UnavailableSessions {
    async fn save(&self, _session: &PendingImportSession) -> Result<(), AppError> {
        Err(AppError::Database("session store unavailable".into()))
    }

    async fn find_by_id(&self, _session_id: &str) -> Result<Option<PendingImportSession>, AppError> {
        Ok(None)
    }

    async fn delete(&self, _session_id: &str) -> Result<(), AppError> {
        Err(AppError::Database("session store unavailable".into()))
    }
}

/// Job service that cannot open jobs.
pub struct UnavailableJobs;

#[async_trait]
impl JobService for UnavailableJobs {
    async fn start(&self) -> Result<Job, StoreError> {
        Err(StoreError::Backend("job store unavailable".into()))
    }

    async fn set_total(&self, job_id: &str, _total: u64) -> Result<(), StoreError> {
        Err(StoreError::NotFound(job_id.to_string()))
    }

    async fn success(&self, job_id: &str, _n: u64) -> Result<(), StoreError> {
        Err(StoreError::NotFound(job_id.to_string()))
    }

    async fn failure(&self, job_id: &str, _n: u64) -> Result<(), StoreError> {
        Err(StoreError::NotFound(job_id.to_string()))
    }

    async fn end(&self, job_id: &str, _ok: bool) -> Result<(), StoreError> {
        Err(StoreError::NotFound(job_id.to_string()))
    }

    async fn find_by_id(&self, _job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Archive staging
// ---------------------------------------------------------------------------

/// Builds an extracted archive in a temporary directory.
#[derive(Default)]
pub struct ArchiveBuilder {
    documents: Vec<Value>,
    attachments: Vec<Value>,
    payloads: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(self, document_id: &str, mode: DocumentMode, doc_type: &str, title: &str) -> Self {
        self.document_with(document_id, mode, doc_type, title, json!({}))
    }

    /// Add a document; `extra` fields are merged into its body.
    pub fn document_with(
        mut self,
        document_id: &str,
        mode: DocumentMode,
        doc_type: &str,
        title: &str,
        extra: Value,
    ) -> Self {
        let mut body = json!({
            "_id": qualified(document_id, mode),
            "documentId": document_id,
            "mode": mode.to_string(),
            "type": doc_type,
            "title": title,
            "updatedAt": { "$date": "2024-03-01T10:00:00Z" },
        });
        if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
            body.extend(extra);
        }
        self.documents.push(body);
        self
    }

    /// Add an attachment related to the given qualified document ids.
    pub fn attachment(mut self, attachment_id: &str, name: &str, related: &[&str], bytes: &[u8]) -> Self {
        self.attachments.push(json!({
            "_id": attachment_id,
            "name": name,
            "extension": "jpg",
            "relatedDocumentIds": related,
        }));
        self.payloads
            .push((format!("{attachment_id}-{name}.jpg"), bytes.to_vec()));
        self
    }

    pub fn stage(self) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DOCUMENTS_FILE),
            serde_json::to_vec(&self.documents).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join(ATTACHMENTS_FILE),
            serde_json::to_vec(&self.attachments).unwrap(),
        )
        .unwrap();

        let payload_dir = dir.path().join(ATTACHMENTS_DIR);
        std::fs::create_dir_all(&payload_dir).unwrap();
        for (file_name, bytes) in self.payloads {
            std::fs::write(payload_dir.join(file_name), bytes).unwrap();
        }
        dir
    }
}

/// Reference to an attachment, as an attachment field stores it.
pub fn attachment_ref(attachment_id: &str) -> Value {
    json!({ "_id": attachment_id, "name": "photo", "extension": "jpg" })
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Import service wired to in-memory collaborators.
///
/// Registered types:
/// - `article`: piece with an `image` attachment and a `main` area
/// - `default-page`: page with a `main` area
/// - `global`: singleton piece
/// - `product`: autopublished piece with an `image` attachment
/// - `legacy`: piece with import disabled
pub struct TestEnv {
    pub service: ImportService,
    pub content: Arc<MemoryContentStore>,
    pub binaries: Arc<MemoryBinaryStore>,
    pub jobs: Arc<MemoryJobService>,
    pub notifier: Arc<RecordingNotifier>,
    pub sessions: Arc<MemorySessionRepository>,
}

impl TestEnv {
    pub fn new() -> Self {
        let content = Arc::new(MemoryContentStore {
            singleton_types: HashSet::from(["global".to_string()]),
            ..MemoryContentStore::default()
        });
        let binaries = Arc::new(MemoryBinaryStore::default());
        let jobs = Arc::new(MemoryJobService::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let sessions = Arc::new(MemorySessionRepository::default());

        let store: Arc<dyn ContentStore> = content.clone();
        let mut registry = ContentTypeRegistry::new(PagePlacement::default());
        registry
            .register(
                TypeHandler::new("article", TypeKind::Piece, store.clone()).with_schema(vec![
                    Field::new("image", FieldType::Attachment),
                    Field::new("main", FieldType::Area),
                ]),
            )
            .register(
                TypeHandler::new("default-page", TypeKind::Page, store.clone())
                    .with_schema(vec![Field::new("main", FieldType::Area)]),
            )
            .register(
                TypeHandler::new("global", TypeKind::Piece, store.clone()).with_options(
                    TypeOptions {
                        singleton: true,
                        ..TypeOptions::default()
                    },
                ),
            )
            .register(
                TypeHandler::new("product", TypeKind::Piece, store.clone())
                    .with_options(TypeOptions {
                        autopublish: true,
                        ..TypeOptions::default()
                    })
                    .with_schema(vec![Field::new("image", FieldType::Attachment)]),
            )
            .register(
                TypeHandler::new("legacy", TypeKind::Piece, store).with_options(TypeOptions {
                    import_enabled: false,
                    ..TypeOptions::default()
                }),
            )
            .register_widget("image", vec![Field::new("image", FieldType::Attachment)]);

        let service = ImportService {
            registry: Arc::new(registry),
            archives: Arc::new(StagedArchive),
            binaries: binaries.clone(),
            jobs: jobs.clone(),
            notifier: notifier.clone(),
            sessions: sessions.clone(),
        };

        Self {
            service,
            content,
            binaries,
            jobs,
            notifier,
            sessions,
        }
    }

    pub fn request(&self, archive: &tempfile::TempDir) -> ImportRequest {
        ImportRequest {
            requester: Some(REQUESTER.to_string()),
            archive_path: archive.path().to_path_buf(),
            upload_path: None,
            module_name: "article".to_string(),
        }
    }
}
