use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::archive::reader::{ArchiveSource, DecodedArchive};
use crate::db::job_repository::JobService;
use crate::db::models::{DuplicateDocument, ImportOutcome, PendingImportSession};
use crate::db::session_repository::SessionRepository;
use crate::error::{AppError, ItemError};
use crate::import::attachments::{reconcile_attachment, AttachmentGate};
use crate::import::documents::{reconcile_document, DocumentContext, DocumentOutcome, WriteMode};
use crate::import::reporting::Reporting;
use crate::notify::{self, Notification, Notifier, Severity};
use crate::registry::ContentTypeRegistry;
use crate::storage::client::BinaryStore;

/// Delay before the progress notification of a closed job disappears.
pub const PROGRESS_DISMISS_DELAY: Duration = Duration::from_secs(2);

/// A request to import one staged archive.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Authenticated caller; `None` is rejected.
    pub requester: Option<String>,
    /// Staging location of the decoded archive.
    pub archive_path: PathBuf,
    /// Raw uploaded file, released once the archive has been read.
    pub upload_path: Option<PathBuf>,
    /// Content type the import was started from.
    pub module_name: String,
}

/// How an import invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportResult {
    /// The job is closed and staging released.
    Completed(ImportOutcome),
    /// Duplicates need review; the job stays open and staging is kept until
    /// the session is closed.
    PendingReview {
        session: PendingImportSession,
        outcome: ImportOutcome,
    },
}

/// Import engine wired to its collaborators.
#[derive(Clone)]
pub struct ImportService {
    pub registry: Arc<ContentTypeRegistry>,
    pub archives: Arc<dyn ArchiveSource>,
    pub binaries: Arc<dyn BinaryStore>,
    pub jobs: Arc<dyn JobService>,
    pub notifier: Arc<dyn Notifier>,
    pub sessions: Arc<dyn SessionRepository>,
}

/// Accumulated document outcomes of one pass.
#[derive(Default)]
struct DocumentPass {
    duplicates: Vec<DuplicateDocument>,
    duplicate_ids: HashSet<String>,
    failed_ids: HashSet<String>,
    /// Logical ids with at least one variant written.
    written_ids: HashSet<String>,
}

impl ImportService {
    /// Import a staged archive: setup checks, reconciliation, then either
    /// close the job or persist a session for the duplicate review.
    pub async fn import(&self, request: ImportRequest) -> Result<ImportResult, AppError> {
        let requester = request
            .requester
            .clone()
            .ok_or_else(|| AppError::Forbidden("import requires an authenticated user".into()))?;

        let archive = match self.archives.load(&request.archive_path, None).await {
            Ok(archive) => archive,
            Err(e) => {
                self.notify(
                    &requester,
                    notify::IMPORT_FILE_ERROR,
                    Notification::new(Severity::Danger)
                        .interpolate("error", &e)
                        .dismissable(),
                )
                .await;
                return Err(e);
            }
        };

        let total = (archive.documents.len() + archive.attachments.len()) as u64;
        let (reporting, notification_id) = match self.start_job(&requester, total).await {
            Ok(started) => started,
            Err(e) => {
                self.release_staging(&request).await;
                return Err(e);
            }
        };

        tracing::info!(
            job_id = %reporting.job_id(),
            documents = archive.documents.len(),
            attachments = archive.attachments.len(),
            "Starting import"
        );

        let outcome = self.run_import(&archive, &reporting).await;
        let failed = outcome.failed_document_ids.len();

        if outcome.duplicate_documents.is_empty() {
            reporting.end(true).await;

            let (message_key, severity) = if failed == 0 {
                (notify::IMPORT_SUCCEED, Severity::Success)
            } else {
                (notify::IMPORT_FAILED_FOR_SOME, Severity::Danger)
            };
            self.notify(
                &requester,
                message_key,
                Notification::new(severity)
                    .interpolate("count", failed)
                    .dismissable()
                    .event(notify::EVENT_IMPORT_ENDED, None),
            )
            .await;
            self.dismiss(&requester, notification_id.as_deref()).await;
            self.release_staging(&request).await;

            tracing::info!(job_id = %reporting.job_id(), failed, "Import completed");
            return Ok(ImportResult::Completed(outcome));
        }

        let session = PendingImportSession {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: reporting.job_id().to_string(),
            archive_path: request.archive_path.clone(),
            module_name: request.module_name.clone(),
            requester: requester.clone(),
            notification_id,
            duplicate_documents: outcome.duplicate_documents.clone(),
            imported_attachment_ids: outcome.imported_attachment_ids.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.sessions.save(&session).await {
            // The review cannot resume without a session.
            tracing::error!(job_id = %session.job_id, "Failed to persist import session: {e}");
            reporting.end(false).await;
            self.notify(
                &requester,
                notify::IMPORT_FAILED_FOR_SOME,
                Notification::new(Severity::Danger)
                    .interpolate("count", failed + session.duplicate_documents.len())
                    .dismissable()
                    .event(notify::EVENT_IMPORT_ENDED, None),
            )
            .await;
            self.dismiss(&requester, session.notification_id.as_deref()).await;
            self.release_staging(&request).await;
            return Err(e);
        }

        if failed > 0 {
            self.notify(
                &requester,
                notify::IMPORT_FAILED_FOR_SOME,
                Notification::new(Severity::Danger)
                    .interpolate("count", failed)
                    .dismissable(),
            )
            .await;
        }

        let data = serde_json::to_value(&session).map_err(|e| AppError::Internal(e.to_string()))?;
        self.notify(
            &requester,
            notify::IMPORT_DUPLICATE_DETECTED,
            Notification::new(Severity::Warning).event(notify::EVENT_IMPORT_DUPLICATES, Some(data)),
        )
        .await;

        if let Some(upload) = &request.upload_path {
            self.archives.release(upload).await;
        }

        tracing::info!(
            job_id = %session.job_id,
            session_id = %session.id,
            duplicates = session.duplicate_documents.len(),
            "Import paused for duplicate review"
        );

        Ok(ImportResult::PendingReview { session, outcome })
    }

    /// Reconcile every document, then every attachment, of a decoded archive.
    ///
    /// Item failures are counted on `reporting` and never abort the pass.
    pub async fn run_import(&self, archive: &DecodedArchive, reporting: &Reporting) -> ImportOutcome {
        let mut pass = DocumentPass::default();

        for doc in &archive.documents {
            let ctx = DocumentContext {
                mode: WriteMode::Insert,
                failed_ids: &pass.failed_ids,
                duplicate_ids: &pass.duplicate_ids,
            };

            match reconcile_document(&self.registry, doc, ctx).await {
                Ok(DocumentOutcome::Written) => {
                    pass.written_ids.insert(doc.document_id.clone());
                    reporting.success(1).await;
                }
                Ok(DocumentOutcome::Deferred) => {
                    tracing::debug!(document_id = %doc.document_id, "Published variant deferred");
                }
                Ok(DocumentOutcome::Duplicate(duplicate)) => {
                    tracing::debug!(document_id = %doc.document_id, "Duplicate candidate");
                    pass.duplicate_ids.insert(doc.document_id.clone());
                    pass.duplicates.push(duplicate);
                }
                Err(e) => {
                    tracing::warn!(
                        document_id = %doc.document_id,
                        mode = %doc.mode,
                        "Document import failed: {e}"
                    );
                    reporting.failure(1).await;
                    pass.failed_ids.insert(doc.document_id.clone());
                }
            }
        }

        let archive_ids: HashSet<String> = archive
            .documents
            .iter()
            .map(|doc| doc.document_id.clone())
            .collect();
        let not_imported: HashSet<String> = archive_ids
            .difference(&pass.written_ids)
            .cloned()
            .collect();
        let gate = AttachmentGate {
            known_duplicate_ids: &not_imported,
            related_filter: &archive_ids,
        };

        let mut imported_attachment_ids = Vec::new();
        for staged in &archive.attachments {
            let attachment_id = &staged.descriptor.attachment_id;

            match reconcile_attachment(self.binaries.as_ref(), staged, Some(gate)).await {
                Ok(()) => {
                    imported_attachment_ids.push(attachment_id.clone());
                    reporting.success(1).await;
                }
                Err(e @ ItemError::OrphanAttachment(_)) => {
                    tracing::info!(%attachment_id, "Skipping attachment: {e}");
                }
                Err(e) => {
                    tracing::warn!(%attachment_id, "Attachment import failed: {e}");
                    reporting.failure(1).await;
                }
            }
        }

        ImportOutcome {
            duplicate_documents: pass.duplicates,
            imported_attachment_ids,
            failed_document_ids: pass.failed_ids.into_iter().collect(),
        }
    }

    async fn start_job(
        &self,
        requester: &str,
        total: u64,
    ) -> Result<(Reporting, Option<String>), AppError> {
        let job = self
            .jobs
            .start()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let notification_id = self
            .notify(
                requester,
                notify::IMPORTING,
                Notification::new(Severity::Success).for_job(&job.id),
            )
            .await;

        if let Err(e) = self.jobs.set_total(&job.id, total).await {
            if let Err(end_err) = self.jobs.end(&job.id, false).await {
                tracing::warn!(job_id = %job.id, "Failed to end job: {end_err}");
            }
            self.dismiss(requester, notification_id.as_deref()).await;
            return Err(AppError::Database(e.to_string()));
        }

        Ok((Reporting::new(self.jobs.clone(), job.id), notification_id))
    }

    async fn release_staging(&self, request: &ImportRequest) {
        self.archives.release(&request.archive_path).await;
        if let Some(upload) = &request.upload_path {
            self.archives.release(upload).await;
        }
    }

    /// Send a notification; delivery problems are logged, not raised.
    pub(crate) async fn notify(
        &self,
        recipient: &str,
        message_key: &str,
        notification: Notification,
    ) -> Option<String> {
        match self.notifier.notify(recipient, message_key, notification).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(message_key, "Failed to notify {recipient}: {e}");
                None
            }
        }
    }

    pub(crate) async fn dismiss(&self, recipient: &str, notification_id: Option<&str>) {
        let Some(notification_id) = notification_id else {
            return;
        };
        if let Err(e) = self
            .notifier
            .dismiss(recipient, notification_id, PROGRESS_DISMISS_DELAY)
            .await
        {
            tracing::warn!(notification_id, "Failed to dismiss notification: {e}");
        }
    }
}
