use std::collections::HashSet;

use crate::db::models::{DocumentMode, DocumentRecord, DuplicateDocument};
use crate::db::repository::{WriteOptions, WriteOutcome};
use crate::error::ItemError;
use crate::registry::{ContentTypeRegistry, TypeHandler, TypeKind};

/// Which store operation a reconciliation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// First import: new content, collisions are detected.
    Insert,
    /// Confirmed override: the record is replaced unconditionally.
    Update,
}

/// Outcomes of earlier documents in the same pass.
#[derive(Debug, Clone, Copy)]
pub struct DocumentContext<'a> {
    pub mode: WriteMode,
    /// Logical ids whose reconciliation failed.
    pub failed_ids: &'a HashSet<String>,
    /// Logical ids whose draft was a duplicate candidate.
    pub duplicate_ids: &'a HashSet<String>,
}

/// Successful reconciliation of one document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    /// Written to the store, or covered by the store's autopublish flow.
    Written,
    /// Published variant of a duplicate draft; left for the review.
    Deferred,
    /// Draft colliding with an existing record; left for the review.
    Duplicate(DuplicateDocument),
}

impl DocumentOutcome {
    pub fn inserted(&self) -> bool {
        matches!(self, DocumentOutcome::Written)
    }
}

/// Insert or update one archived document.
pub async fn reconcile_document(
    registry: &ContentTypeRegistry,
    doc: &DocumentRecord,
    ctx: DocumentContext<'_>,
) -> Result<DocumentOutcome, ItemError> {
    let handler = registry
        .resolve(&doc.doc_type)
        .ok_or_else(|| ItemError::UnsupportedType(doc.doc_type.clone()))?;

    if !handler.options.import_enabled {
        return Err(ItemError::ImportDisabled(doc.doc_type.clone()));
    }

    if doc.mode == DocumentMode::Published {
        if ctx.failed_ids.contains(&doc.document_id) {
            return Err(ItemError::DependentDraftFailed(doc.document_id.clone()));
        }
        if ctx.duplicate_ids.contains(&doc.document_id) {
            return Ok(DocumentOutcome::Deferred);
        }
        if handler.options.autopublish {
            return Ok(DocumentOutcome::Written);
        }
    }

    match ctx.mode {
        WriteMode::Update => update(handler, doc).await,
        WriteMode::Insert => {
            let placement = match handler.kind {
                TypeKind::Page => Some(registry.placement().clone()),
                TypeKind::Piece => None,
            };

            match handler
                .store
                .insert(doc, &WriteOptions::replay(placement))
                .await?
            {
                WriteOutcome::Written => Ok(DocumentOutcome::Written),
                WriteOutcome::Conflict => resolve_conflict(handler, doc).await,
            }
        }
    }
}

async fn update(handler: &TypeHandler, doc: &DocumentRecord) -> Result<DocumentOutcome, ItemError> {
    match handler.store.update(doc, &WriteOptions::replay(None)).await? {
        WriteOutcome::Written => Ok(DocumentOutcome::Written),
        WriteOutcome::Conflict => Err(ItemError::UniqueConstraint(doc.document_id.clone())),
    }
}

async fn resolve_conflict(
    handler: &TypeHandler,
    doc: &DocumentRecord,
) -> Result<DocumentOutcome, ItemError> {
    if handler.options.singleton {
        let existing = handler
            .store
            .find_one_of_type(&doc.doc_type, doc.mode)
            .await?
            .ok_or_else(|| ItemError::UniqueConstraint(doc.document_id.clone()))?;

        tracing::debug!(
            document_id = %doc.document_id,
            existing_id = %existing.document_id,
            "Singleton collision, updating existing record"
        );
        return update(handler, &doc.with_identity_of(&existing)).await;
    }

    match doc.mode {
        DocumentMode::Draft => Ok(DocumentOutcome::Duplicate(DuplicateDocument::from(doc))),
        DocumentMode::Published => Err(ItemError::UniqueConstraint(doc.document_id.clone())),
    }
}
