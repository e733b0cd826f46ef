use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lifecycle variant of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentMode {
    Draft,
    Published,
}

impl fmt::Display for DocumentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentMode::Draft => write!(f, "draft"),
            DocumentMode::Published => write!(f, "published"),
        }
    }
}

impl DocumentMode {
    /// Parse a mode from its archive representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DocumentMode::Draft),
            "published" => Some(DocumentMode::Published),
            _ => None,
        }
    }
}

/// A serialized content entity read from an archive.
///
/// The header fields are decoded from `body`, which keeps every field of the
/// archived document (including the header ones) and is what gets written to
/// the content store.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    /// Logical identity shared by the draft and published variants.
    pub document_id: String,
    pub mode: DocumentMode,
    /// Content-type discriminator.
    pub doc_type: String,
    pub title: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub body: Document,
}

impl DocumentRecord {
    /// Build a record with a minimal body. Mostly useful for seeding stores.
    pub fn new(document_id: &str, mode: DocumentMode, doc_type: &str, title: &str) -> Self {
        let body = doc! {
            "_id": format!("{document_id}:{mode}"),
            "documentId": document_id,
            "mode": mode.to_string(),
            "type": doc_type,
            "title": title,
        };

        Self {
            document_id: document_id.to_string(),
            mode,
            doc_type: doc_type.to_string(),
            title: title.to_string(),
            updated_at: None,
            body,
        }
    }

    /// Decode the header fields of an archived document.
    pub fn from_bson(body: Document) -> Result<Self, AppError> {
        let document_id = body
            .get_str("documentId")
            .map_err(|_| AppError::ArchiveUnreadable("document without 'documentId'".into()))?
            .to_string();

        let mode = body
            .get_str("mode")
            .ok()
            .and_then(DocumentMode::parse)
            .ok_or_else(|| {
                AppError::ArchiveUnreadable(format!(
                    "document '{document_id}' has no valid 'mode'"
                ))
            })?;

        let doc_type = body
            .get_str("type")
            .map_err(|_| {
                AppError::ArchiveUnreadable(format!("document '{document_id}' has no 'type'"))
            })?
            .to_string();

        let title = body.get_str("title").unwrap_or_default().to_string();
        let updated_at = body.get_datetime("updatedAt").ok().map(|d| d.to_chrono());

        Ok(Self {
            document_id,
            mode,
            doc_type,
            title,
            updated_at,
            body,
        })
    }

    /// Identity used as the store's primary key.
    pub fn store_id(&self) -> String {
        match self.body.get_str("_id") {
            Ok(id) => id.to_string(),
            Err(_) => format!("{}:{}", self.document_id, self.mode),
        }
    }

    /// Copy of this record that takes over the identity of `existing`.
    pub fn with_identity_of(&self, existing: &DocumentRecord) -> Self {
        let mut body = self.body.clone();
        body.insert("_id", existing.store_id());
        body.insert("documentId", existing.document_id.clone());

        Self {
            document_id: existing.document_id.clone(),
            body,
            ..self.clone()
        }
    }

    /// Builder-style helper to set an arbitrary field on the body.
    pub fn with_field(mut self, name: &str, value: impl Into<Bson>) -> Self {
        self.body.insert(name, value.into());
        self
    }
}

/// Metadata for one binary asset listed in an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescriptor {
    #[serde(rename = "_id")]
    pub attachment_id: String,
    pub name: String,
    pub extension: String,
    /// Documents referencing this attachment, possibly suffixed with a
    /// `:locale:mode` qualifier.
    #[serde(default)]
    pub related_document_ids: Vec<String>,
}

impl AttachmentDescriptor {
    /// Related logical document ids with qualifiers stripped, deduplicated,
    /// in first-seen order.
    pub fn related_documents(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for raw in &self.related_document_ids {
            let id = raw.split(':').next().unwrap_or(raw);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// File name the binary store should record (`name.extension`).
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.extension)
    }

    /// File name of the payload inside an archive (`id-name.extension`).
    pub fn payload_name(&self) -> String {
        format!("{}-{}.{}", self.attachment_id, self.name, self.extension)
    }
}

/// Location of an attachment's binary payload on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFile {
    pub name: String,
    pub path: PathBuf,
}

/// An attachment descriptor paired with its staged payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedAttachment {
    pub descriptor: AttachmentDescriptor,
    pub file: AttachmentFile,
}

/// A draft whose identity collided with an existing record, pending review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateDocument {
    pub document_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&DocumentRecord> for DuplicateDocument {
    fn from(doc: &DocumentRecord) -> Self {
        Self {
            document_id: doc.document_id.clone(),
            title: doc.title.clone(),
            doc_type: doc.doc_type.clone(),
            updated_at: doc.updated_at,
        }
    }
}

/// Result of one import pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub duplicate_documents: Vec<DuplicateDocument>,
    pub imported_attachment_ids: Vec<String>,
    pub failed_document_ids: BTreeSet<String>,
}

/// Everything needed to run the override pass after a duplicate review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingImportSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub job_id: String,
    pub archive_path: PathBuf,
    /// Content type the import was started from.
    pub module_name: String,
    pub requester: String,
    pub notification_id: Option<String>,
    pub duplicate_documents: Vec<DuplicateDocument>,
    pub imported_attachment_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}
