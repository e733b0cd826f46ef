use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const IMPORTING: &str = "importExport:importing";
pub const IMPORT_SUCCEED: &str = "importExport:importSucceed";
pub const IMPORT_FAILED_FOR_SOME: &str = "importExport:importFailedForSome";
pub const IMPORT_DUPLICATE_DETECTED: &str = "importExport:importDuplicateDetected";
pub const IMPORT_FILE_ERROR: &str = "importExport:importFileError";

pub const EVENT_IMPORT_ENDED: &str = "import-ended";
pub const EVENT_IMPORT_DUPLICATES: &str = "import-duplicates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Danger,
}

/// Structured payload a UI layer can react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub name: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    #[serde(default)]
    pub interpolate: BTreeMap<String, String>,
    /// Whether the notification dismisses itself.
    #[serde(default)]
    pub dismiss: bool,
    /// Progress job this notification tracks.
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub event: Option<NotificationEvent>,
}

impl Notification {
    pub fn new(severity: Severity) -> Self {
        Self {
            severity,
            interpolate: BTreeMap::new(),
            dismiss: false,
            job_id: None,
            event: None,
        }
    }

    pub fn interpolate(mut self, key: &str, value: impl ToString) -> Self {
        self.interpolate.insert(key.to_string(), value.to_string());
        self
    }

    pub fn dismissable(mut self) -> Self {
        self.dismiss = true;
        self
    }

    pub fn for_job(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    pub fn event(mut self, name: &str, data: Option<serde_json::Value>) -> Self {
        self.event = Some(NotificationEvent {
            name: name.to_string(),
            data,
        });
        self
    }
}

/// User notification operations.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Returns its id when the backend keeps one.
    async fn notify(
        &self,
        recipient: &str,
        message_key: &str,
        notification: Notification,
    ) -> Result<Option<String>, AppError>;

    /// Dismiss a previously delivered notification after `delay`.
    async fn dismiss(
        &self,
        recipient: &str,
        notification_id: &str,
        delay: Duration,
    ) -> Result<(), AppError>;
}

/// Notifier that only writes to the log.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        message_key: &str,
        notification: Notification,
    ) -> Result<Option<String>, AppError> {
        let interpolate = serde_json::to_string(&notification.interpolate)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        match notification.severity {
            Severity::Danger => {
                tracing::warn!(recipient, message_key, %interpolate, "notification")
            }
            _ => tracing::info!(recipient, message_key, %interpolate, "notification"),
        }

        Ok(None)
    }

    async fn dismiss(
        &self,
        _recipient: &str,
        _notification_id: &str,
        _delay: Duration,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

/// MongoDB implementation of the Notifier.
#[cfg(feature = "backend")]
pub struct MongoNotifier {
    collection: mongodb::Collection<bson::Document>,
}

#[cfg(feature = "backend")]
impl MongoNotifier {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("notifications"),
        }
    }
}

#[cfg(feature = "backend")]
#[async_trait]
impl Notifier for MongoNotifier {
    async fn notify(
        &self,
        recipient: &str,
        message_key: &str,
        notification: Notification,
    ) -> Result<Option<String>, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let payload =
            bson::to_bson(&notification).map_err(|e| AppError::Internal(e.to_string()))?;

        self.collection
            .insert_one(bson::doc! {
                "_id": &id,
                "recipient": recipient,
                "message": message_key,
                "notification": payload,
                "createdAt": bson::DateTime::now(),
            })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Some(id))
    }

    async fn dismiss(
        &self,
        recipient: &str,
        notification_id: &str,
        delay: Duration,
    ) -> Result<(), AppError> {
        let dismiss_at = chrono::Utc::now()
            + chrono::Duration::from_std(delay).map_err(|e| AppError::Internal(e.to_string()))?;

        self.collection
            .update_one(
                bson::doc! { "_id": notification_id, "recipient": recipient },
                bson::doc! { "$set": { "dismissAt": bson::DateTime::from_chrono(dismiss_at) } },
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
