use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::models::{DocumentMode, DocumentRecord};
use crate::error::StoreError;

/// Where a store write landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record (or payload) was written.
    Written,
    /// The identity already exists, or another uniqueness constraint fired.
    Conflict,
}

/// Position of a newly inserted page relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PagePosition {
    FirstChild,
    LastChild,
}

/// Anchor page and position used when inserting pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePlacement {
    pub anchor: String,
    pub position: PagePosition,
}

impl Default for PagePlacement {
    fn default() -> Self {
        Self {
            anchor: "_home".to_string(),
            position: PagePosition::LastChild,
        }
    }
}

/// Options passed to every store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Whether the store should bump "last modified" bookkeeping.
    pub set_modified: bool,
    /// Only set for page inserts.
    pub placement: Option<PagePlacement>,
}

impl WriteOptions {
    /// Options for replaying archived state: modification timestamps are kept.
    pub fn replay(placement: Option<PagePlacement>) -> Self {
        Self {
            set_modified: false,
            placement,
        }
    }
}

/// Content store operations the import engine needs.
///
/// This trait allows mocking the database layer in tests.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new record. Reports `Conflict` when its identity already exists.
    async fn insert(
        &self,
        doc: &DocumentRecord,
        options: &WriteOptions,
    ) -> Result<WriteOutcome, StoreError>;

    /// Replace the record with the same identity, creating it if absent.
    async fn update(
        &self,
        doc: &DocumentRecord,
        options: &WriteOptions,
    ) -> Result<WriteOutcome, StoreError>;

    /// Find any record of the given type and mode. Used for singleton types.
    async fn find_one_of_type(
        &self,
        doc_type: &str,
        mode: DocumentMode,
    ) -> Result<Option<DocumentRecord>, StoreError>;
}

/// MongoDB implementation of the ContentStore.
///
/// Only available when the `backend` feature is enabled. Identity and slug
/// uniqueness come from the indexes built by [`MongoContentStore::ensure_indexes`];
/// singleton types are checked before every insert.
#[cfg(feature = "backend")]
pub struct MongoContentStore {
    collection: mongodb::Collection<bson::Document>,
    singleton_types: std::collections::HashSet<String>,
}

#[cfg(feature = "backend")]
impl MongoContentStore {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("documents"),
            singleton_types: std::collections::HashSet::new(),
        }
    }

    /// Types allowed at most one record per mode.
    pub fn with_singleton_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.singleton_types.extend(types);
        self
    }

    /// Create the unique indexes on `{documentId, mode}` and `{slug, mode}`.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        use bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        let identity = IndexModel::builder()
            .keys(doc! { "documentId": 1, "mode": 1 })
            .options(
                IndexOptions::builder()
                    .name("documentId_mode_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        let slug = IndexModel::builder()
            .keys(doc! { "slug": 1, "mode": 1 })
            .options(
                IndexOptions::builder()
                    .name("slug_mode_unique".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "slug": { "$exists": true } })
                    .build(),
            )
            .build();

        self.collection
            .create_indexes([identity, slug])
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Find a record by logical identity and mode.
    pub async fn find_by_document_id(
        &self,
        document_id: &str,
        mode: DocumentMode,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        use bson::doc;

        self.collection
            .find_one(doc! { "documentId": document_id, "mode": mode.to_string() })
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map(decode)
            .transpose()
    }

    fn prepare(&self, doc: &DocumentRecord, options: &WriteOptions) -> bson::Document {
        let mut body = doc.body.clone();
        body.insert("_id", doc.store_id());
        if options.set_modified {
            body.insert("updatedAt", bson::DateTime::now());
        }
        body
    }

    async fn singleton_taken(&self, doc: &DocumentRecord) -> Result<bool, StoreError> {
        if !self.singleton_types.contains(&doc.doc_type) {
            return Ok(false);
        }
        Ok(self.find_one_of_type(&doc.doc_type, doc.mode).await?.is_some())
    }

    async fn initial_rank(&self, placement: &PagePlacement, mode: DocumentMode) -> Result<i64, StoreError> {
        use bson::doc;

        match placement.position {
            PagePosition::FirstChild => Ok(0),
            PagePosition::LastChild => self
                .collection
                .count_documents(doc! { "parentId": &placement.anchor, "mode": mode.to_string() })
                .await
                .map(|count| count as i64)
                .map_err(|e| StoreError::Backend(e.to_string())),
        }
    }

    /// Move the siblings of a page inserted as first child one rank down.
    async fn shift_siblings(
        &self,
        placement: &PagePlacement,
        store_id: &str,
        mode: DocumentMode,
    ) -> Result<(), StoreError> {
        use bson::doc;

        self.collection
            .update_many(
                doc! {
                    "parentId": &placement.anchor,
                    "mode": mode.to_string(),
                    "_id": { "$ne": store_id },
                },
                doc! { "$inc": { "rank": 1 } },
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(feature = "backend")]
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == 11000
    )
}

#[cfg(feature = "backend")]
fn decode(body: bson::Document) -> Result<DocumentRecord, StoreError> {
    DocumentRecord::from_bson(body).map_err(|e| StoreError::Backend(e.to_string()))
}

#[cfg(feature = "backend")]
#[async_trait]
impl ContentStore for MongoContentStore {
    async fn insert(
        &self,
        doc: &DocumentRecord,
        options: &WriteOptions,
    ) -> Result<WriteOutcome, StoreError> {
        if self.singleton_taken(doc).await? {
            return Ok(WriteOutcome::Conflict);
        }

        let mut body = self.prepare(doc, options);
        if let Some(placement) = &options.placement {
            let rank = self.initial_rank(placement, doc.mode).await?;
            body.insert("parentId", placement.anchor.clone());
            body.insert("rank", rank);
        }

        match self.collection.insert_one(body).await {
            Ok(_) => {}
            Err(e) if is_duplicate_key(&e) => return Ok(WriteOutcome::Conflict),
            Err(e) => return Err(StoreError::Backend(e.to_string())),
        }

        // Siblings only move once the page is actually in.
        if let Some(placement) = &options.placement {
            if placement.position == PagePosition::FirstChild {
                self.shift_siblings(placement, &doc.store_id(), doc.mode).await?;
            }
        }
        Ok(WriteOutcome::Written)
    }

    async fn update(
        &self,
        doc: &DocumentRecord,
        options: &WriteOptions,
    ) -> Result<WriteOutcome, StoreError> {
        use bson::doc;
        use mongodb::options::ReplaceOptions;

        // A stored record may carry a differently qualified `_id`; keep it.
        let store_id = match self.find_by_document_id(&doc.document_id, doc.mode).await? {
            Some(existing) => existing.store_id(),
            None => doc.store_id(),
        };

        let mut body = self.prepare(doc, options);
        body.insert("_id", store_id.clone());
        let replace_options = ReplaceOptions::builder().upsert(true).build();

        match self
            .collection
            .replace_one(doc! { "_id": store_id }, body)
            .with_options(replace_options)
            .await
        {
            Ok(_) => Ok(WriteOutcome::Written),
            Err(e) if is_duplicate_key(&e) => Ok(WriteOutcome::Conflict),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn find_one_of_type(
        &self,
        doc_type: &str,
        mode: DocumentMode,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        use bson::doc;

        self.collection
            .find_one(doc! { "type": doc_type, "mode": mode.to_string() })
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map(decode)
            .transpose()
    }
}
