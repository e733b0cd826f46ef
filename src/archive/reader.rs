use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bson::Bson;

use crate::db::models::{AttachmentDescriptor, AttachmentFile, DocumentRecord, StagedAttachment};
use crate::error::AppError;

pub const DOCUMENTS_FILE: &str = "documents.json";
pub const ATTACHMENTS_FILE: &str = "attachments.json";
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Decoded contents of a staged archive.
#[derive(Debug, Clone, Default)]
pub struct DecodedArchive {
    pub documents: Vec<DocumentRecord>,
    pub attachments: Vec<StagedAttachment>,
}

impl DecodedArchive {
    pub fn attachment(&self, attachment_id: &str) -> Option<&StagedAttachment> {
        self.attachments
            .iter()
            .find(|a| a.descriptor.attachment_id == attachment_id)
    }
}

/// Source of decoded archives.
///
/// Abstracted so the engine stays independent of how archives are packaged.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Load documents (optionally only those whose logical id is in
    /// `id_filter`) and every attachment descriptor.
    async fn load(
        &self,
        path: &Path,
        id_filter: Option<&HashSet<String>>,
    ) -> Result<DecodedArchive, AppError>;

    /// Release temporary storage held at `path`. Never fails the caller.
    async fn release(&self, path: &Path);
}

/// Reads archives already extracted to a staging directory.
pub struct StagedArchive;

#[async_trait]
impl ArchiveSource for StagedArchive {
    async fn load(
        &self,
        path: &Path,
        id_filter: Option<&HashSet<String>>,
    ) -> Result<DecodedArchive, AppError> {
        let documents = read_listing(&path.join(DOCUMENTS_FILE))
            .await?
            .into_iter()
            .map(|entry| match entry {
                Bson::Document(body) => DocumentRecord::from_bson(body),
                other => Err(AppError::ArchiveUnreadable(format!(
                    "expected a document entry, found {other}"
                ))),
            })
            .filter(|record| match (record, id_filter) {
                (Ok(doc), Some(ids)) => ids.contains(&doc.document_id),
                _ => true,
            })
            .collect::<Result<Vec<_>, _>>()?;

        let attachments = read_listing(&path.join(ATTACHMENTS_FILE))
            .await?
            .into_iter()
            .map(|entry| {
                let descriptor: AttachmentDescriptor = bson::from_bson(entry).map_err(|e| {
                    AppError::ArchiveUnreadable(format!("invalid attachment entry: {e}"))
                })?;
                let file = AttachmentFile {
                    name: descriptor.file_name(),
                    path: payload_path(path, &descriptor),
                };
                Ok(StagedAttachment { descriptor, file })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        tracing::debug!(
            path = %path.display(),
            documents = documents.len(),
            attachments = attachments.len(),
            "Loaded staged archive"
        );

        Ok(DecodedArchive {
            documents,
            attachments,
        })
    }

    async fn release(&self, path: &Path) {
        clean_path(path).await;
    }
}

/// Read one Extended JSON listing file as an array of BSON values.
async fn read_listing(path: &Path) -> Result<Vec<Bson>, AppError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::ArchiveUnreadable(format!("{}: {}", path.display(), e)))?;

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| AppError::ArchiveUnreadable(format!("{}: {}", path.display(), e)))?;

    match Bson::try_from(value)
        .map_err(|e| AppError::ArchiveUnreadable(format!("{}: {}", path.display(), e)))?
    {
        Bson::Array(entries) => Ok(entries),
        _ => Err(AppError::ArchiveUnreadable(format!(
            "{}: expected an array",
            path.display()
        ))),
    }
}

/// Remove a staging directory or uploaded file.
///
/// Failures are logged: leftovers are an operator concern, not an import failure.
pub async fn clean_path(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!(
            "Error while trying to remove the file or folder: {}. You might want to remove it yourself. ({})",
            path.display(),
            e
        );
    }
}

/// Where the payload of `descriptor` lives inside the staged archive at `root`.
pub fn payload_path(root: &Path, descriptor: &AttachmentDescriptor) -> PathBuf {
    root.join(ATTACHMENTS_DIR).join(descriptor.payload_name())
}
