use std::collections::HashSet;

use crate::db::models::StagedAttachment;
use crate::db::repository::WriteOutcome;
use crate::error::ItemError;
use crate::storage::client::BinaryStore;

/// Dependency check applied during the first import pass.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentGate<'a> {
    /// Logical ids whose documents did not make it into the store.
    pub known_duplicate_ids: &'a HashSet<String>,
    /// Only related ids in this set are considered.
    pub related_filter: &'a HashSet<String>,
}

impl AttachmentGate<'_> {
    /// True when none of the attachment's owning documents were imported.
    fn is_orphan(&self, staged: &StagedAttachment) -> bool {
        staged
            .descriptor
            .related_documents()
            .into_iter()
            .filter(|id| self.related_filter.contains(*id))
            .all(|id| self.known_duplicate_ids.contains(id))
    }
}

/// Insert an attachment payload, or re-link it when its id is already stored.
pub async fn reconcile_attachment(
    store: &dyn BinaryStore,
    staged: &StagedAttachment,
    gate: Option<AttachmentGate<'_>>,
) -> Result<(), ItemError> {
    let attachment_id = &staged.descriptor.attachment_id;

    if let Some(gate) = gate {
        if gate.is_orphan(staged) {
            return Err(ItemError::OrphanAttachment(attachment_id.clone()));
        }
    }

    match store.insert_binary(attachment_id, &staged.file).await? {
        WriteOutcome::Written => Ok(()),
        WriteOutcome::Conflict => {
            tracing::debug!(%attachment_id, "Attachment already stored, updating");
            store
                .update_binary(attachment_id, &staged.file, &staged.descriptor)
                .await?;
            Ok(())
        }
    }
}
