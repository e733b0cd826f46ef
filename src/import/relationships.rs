use bson::{Bson, Document};

use crate::registry::{ContentTypeRegistry, Field, FieldType};

/// Kind of reference to extract from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelatedKind {
    /// Attachment ids stored in attachment fields.
    Attachment,
    /// Logical ids of related documents of the given type.
    Relationship(String),
}

/// Extract references of `kind` from `body`, walking `schema`.
///
/// Area fields are walked through the widget schemas known to `registry`.
/// Ids are returned once each, in document order.
pub fn related_ids(
    registry: &ContentTypeRegistry,
    schema: &[Field],
    body: &Document,
    kind: &RelatedKind,
) -> Vec<String> {
    let mut ids = Vec::new();
    walk(registry, schema, body, kind, &mut ids);
    ids
}

fn walk(
    registry: &ContentTypeRegistry,
    schema: &[Field],
    body: &Document,
    kind: &RelatedKind,
    ids: &mut Vec<String>,
) {
    for field in schema {
        let Some(value) = body.get(&field.name) else {
            continue;
        };

        match (&field.field_type, kind) {
            (FieldType::Attachment, RelatedKind::Attachment) => {
                if let Some(id) = value.as_document().and_then(|a| a.get_str("_id").ok()) {
                    push_unique(ids, id);
                }
            }
            (FieldType::Relationship, RelatedKind::Relationship(with_type))
                if field.with_type.as_deref() == Some(with_type.as_str()) =>
            {
                for related in value.as_array().into_iter().flatten() {
                    if let Some(id) = related_document_id(related) {
                        push_unique(ids, id);
                    }
                }
            }
            (FieldType::Area, _) => {
                let items = value
                    .as_document()
                    .and_then(|area| area.get_array("items").ok());
                for widget in items.into_iter().flatten().filter_map(Bson::as_document) {
                    let widget_schema = widget
                        .get_str("type")
                        .ok()
                        .and_then(|t| registry.widget_schema(t));
                    if let Some(widget_schema) = widget_schema {
                        walk(registry, widget_schema, widget, kind, ids);
                    }
                }
            }
            (FieldType::Array, _) => {
                for item in value.as_array().into_iter().flatten().filter_map(Bson::as_document) {
                    walk(registry, &field.fields, item, kind, ids);
                }
            }
            (FieldType::Object, _) => {
                if let Some(object) = value.as_document() {
                    walk(registry, &field.fields, object, kind, ids);
                }
            }
            _ => {}
        }
    }
}

/// Logical id of a joined document: its `documentId`, or its qualified `_id`
/// with the qualifier stripped.
fn related_document_id(related: &Bson) -> Option<&str> {
    let related = related.as_document()?;
    if let Ok(id) = related.get_str("documentId") {
        return Some(id);
    }
    related
        .get_str("_id")
        .ok()
        .and_then(|id| id.split(':').next())
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}
