use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::db::repository::PagePlacement;
use crate::error::AppError;
use crate::registry::{Field, TypeKind};

/// Runtime settings, layered as defaults → TOML file → `CONTENTPORT__*` env.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub mongodb: MongoSettings,
    pub storage: StorageSettings,
    pub pages: PagePlacement,
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub types: BTreeMap<String, TypeSettings>,
    #[serde(default)]
    pub widgets: BTreeMap<String, Vec<Field>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub bucket: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// Recipient used when the caller does not name one.
    pub recipient: String,
}

/// Import behavior of one content type.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeSettings {
    pub kind: TypeKind,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub autopublish: bool,
    #[serde(default = "default_import")]
    pub import: bool,
    #[serde(default)]
    pub fields: Vec<Field>,
}

fn default_import() -> bool {
    true
}

impl Settings {
    /// Load settings, reading `path` when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder()
            .set_default("mongodb.uri", "mongodb://localhost:27017")?
            .set_default("mongodb.database", "contentport")?
            .set_default("storage.bucket", "contentport-attachments")?
            .set_default("storage.prefix", "attachments/")?
            .set_default("pages.anchor", "_home")?
            .set_default("pages.position", "lastChild")?
            .set_default("notifications.recipient", "admin")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("CONTENTPORT").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}
