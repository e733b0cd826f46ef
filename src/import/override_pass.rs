use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{AppError, ItemError};
use crate::import::attachments::reconcile_attachment;
use crate::import::documents::{reconcile_document, DocumentContext, WriteMode};
use crate::import::orchestrator::ImportService;
use crate::import::relationships::{related_ids, RelatedKind};
use crate::import::reporting::Reporting;
use crate::notify::{self, Notification, Severity};

/// Second pass over documents the caller confirmed to overwrite.
#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub requester: String,
    pub archive_path: PathBuf,
    pub job_id: String,
    pub confirmed_document_ids: Vec<String>,
    /// Attachments already imported by the first pass.
    pub already_imported_attachment_ids: Vec<String>,
}

/// What the override pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideReport {
    pub updated_document_ids: Vec<String>,
    pub failed_document_ids: BTreeSet<String>,
    /// Attachments imported by this pass only.
    pub imported_attachment_ids: Vec<String>,
}

impl ImportService {
    /// Force-update the confirmed documents and the attachments they reference.
    pub async fn run_override(&self, request: &OverrideRequest) -> Result<OverrideReport, AppError> {
        let job = self
            .jobs
            .find_by_id(&request.job_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("job '{}'", request.job_id)))?;
        let reporting = Reporting::new(self.jobs.clone(), job.id);

        let confirmed: HashSet<String> = request.confirmed_document_ids.iter().cloned().collect();
        let archive = self
            .archives
            .load(&request.archive_path, Some(&confirmed))
            .await?;

        tracing::info!(
            job_id = %reporting.job_id(),
            documents = archive.documents.len(),
            "Overriding duplicates"
        );

        let mut imported: HashSet<String> = request
            .already_imported_attachment_ids
            .iter()
            .cloned()
            .collect();
        let mut failed_ids = HashSet::new();
        let no_duplicates = HashSet::new();
        let mut report = OverrideReport::default();

        for doc in &archive.documents {
            let attachment_ids = self
                .registry
                .resolve(&doc.doc_type)
                .map(|handler| {
                    related_ids(&self.registry, &handler.schema, &doc.body, &RelatedKind::Attachment)
                })
                .unwrap_or_default();

            let ctx = DocumentContext {
                mode: WriteMode::Update,
                failed_ids: &failed_ids,
                duplicate_ids: &no_duplicates,
            };
            if let Err(e) = reconcile_document(&self.registry, doc, ctx).await {
                tracing::warn!(
                    document_id = %doc.document_id,
                    mode = %doc.mode,
                    "Document override failed: {e}"
                );
                reporting.failure(1).await;
                failed_ids.insert(doc.document_id.clone());
                continue;
            }

            reporting.success(1).await;
            report.updated_document_ids.push(doc.document_id.clone());

            for attachment_id in attachment_ids {
                if imported.contains(&attachment_id) {
                    continue;
                }

                let result = match archive.attachment(&attachment_id) {
                    Some(staged) => reconcile_attachment(self.binaries.as_ref(), staged, None).await,
                    None => Err(ItemError::MissingAttachment(attachment_id.clone())),
                };

                match result {
                    Ok(()) => {
                        reporting.success(1).await;
                        imported.insert(attachment_id.clone());
                        report.imported_attachment_ids.push(attachment_id);
                    }
                    Err(e) => {
                        tracing::warn!(%attachment_id, "Attachment override failed: {e}");
                        reporting.failure(1).await;
                    }
                }
            }
        }

        if !failed_ids.is_empty() {
            self.notify(
                &request.requester,
                notify::IMPORT_FAILED_FOR_SOME,
                Notification::new(Severity::Danger)
                    .interpolate("count", failed_ids.len())
                    .dismissable(),
            )
            .await;
        }

        report.failed_document_ids = failed_ids.into_iter().collect();
        Ok(report)
    }

    /// Run the override pass for a persisted session.
    ///
    /// Every confirmed id must be one of the session's duplicates.
    pub async fn resume_session(
        &self,
        session_id: &str,
        confirmed_document_ids: Vec<String>,
    ) -> Result<OverrideReport, AppError> {
        let mut session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("import session '{session_id}'")))?;

        let unknown: Vec<&String> = confirmed_document_ids
            .iter()
            .filter(|id| !session.duplicate_documents.iter().any(|d| &d.document_id == *id))
            .collect();
        if !unknown.is_empty() {
            return Err(AppError::BadRequest(format!(
                "documents {unknown:?} are not pending review in session '{session_id}'"
            )));
        }

        let request = OverrideRequest {
            requester: session.requester.clone(),
            archive_path: session.archive_path.clone(),
            job_id: session.job_id.clone(),
            confirmed_document_ids,
            already_imported_attachment_ids: session.imported_attachment_ids.clone(),
        };
        let report = self.run_override(&request).await?;

        session
            .imported_attachment_ids
            .extend(report.imported_attachment_ids.iter().cloned());
        self.sessions.save(&session).await?;

        Ok(report)
    }

    /// Close a session after its override pass, or abandon it: the job ends,
    /// the progress notification goes away and staging is released.
    pub async fn close_session(&self, session_id: &str) -> Result<(), AppError> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("import session '{session_id}'")))?;

        Reporting::new(self.jobs.clone(), session.job_id.clone())
            .end(true)
            .await;
        self.dismiss(&session.requester, session.notification_id.as_deref())
            .await;
        self.archives.release(&session.archive_path).await;
        self.sessions.delete(&session.id).await?;

        tracing::info!(job_id = %session.job_id, %session_id, "Import session closed");
        Ok(())
    }
}
