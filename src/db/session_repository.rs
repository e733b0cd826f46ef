use async_trait::async_trait;

use crate::db::models::PendingImportSession;
use crate::error::AppError;

/// Persistence for import sessions waiting on a duplicate review.
///
/// The override pass only receives a session id, so everything it needs must
/// survive between the two calls.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save(&self, session: &PendingImportSession) -> Result<(), AppError>;

    async fn find_by_id(&self, session_id: &str) -> Result<Option<PendingImportSession>, AppError>;

    async fn delete(&self, session_id: &str) -> Result<(), AppError>;
}

/// MongoDB implementation of the SessionRepository.
#[cfg(feature = "backend")]
pub struct MongoSessionRepository {
    collection: mongodb::Collection<PendingImportSession>,
}

#[cfg(feature = "backend")]
impl MongoSessionRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("import_sessions"),
        }
    }
}

#[cfg(feature = "backend")]
#[async_trait]
impl SessionRepository for MongoSessionRepository {
    async fn save(&self, session: &PendingImportSession) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::options::ReplaceOptions;

        let options = ReplaceOptions::builder().upsert(true).build();

        self.collection
            .replace_one(doc! { "_id": &session.id }, session)
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<PendingImportSession>, AppError> {
        use bson::doc;

        self.collection
            .find_one(doc! { "_id": session_id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        use bson::doc;

        self.collection
            .delete_one(doc! { "_id": session_id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
