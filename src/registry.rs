use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::db::repository::{ContentStore, PagePlacement};

/// Whether a content type lives in the page tree or is a free-standing piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Page,
    Piece,
}

/// Kind of a schema field, as far as relationship resolution cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Attachment,
    Relationship,
    Area,
    Array,
    Object,
    #[serde(other)]
    Scalar,
}

/// One field of a content type schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Target type of a relationship field.
    #[serde(default)]
    pub with_type: Option<String>,
    /// Sub-fields of array and object fields.
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            with_type: None,
            fields: Vec::new(),
        }
    }

    pub fn relationship(name: &str, with_type: &str) -> Self {
        Self {
            with_type: Some(with_type.to_string()),
            ..Self::new(name, FieldType::Relationship)
        }
    }

    pub fn nested(name: &str, field_type: FieldType, fields: Vec<Field>) -> Self {
        Self {
            fields,
            ..Self::new(name, field_type)
        }
    }
}

/// Per-type import behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeOptions {
    /// At most one instance exists; collisions are resolved by updating it.
    pub singleton: bool,
    /// The store derives the published variant from the draft on its own.
    pub autopublish: bool,
    pub import_enabled: bool,
}

impl Default for TypeOptions {
    fn default() -> Self {
        Self {
            singleton: false,
            autopublish: false,
            import_enabled: true,
        }
    }
}

/// Everything the reconciler needs to write documents of one type.
#[derive(Clone)]
pub struct TypeHandler {
    pub name: String,
    pub kind: TypeKind,
    pub options: TypeOptions,
    pub schema: Vec<Field>,
    pub store: Arc<dyn ContentStore>,
}

impl TypeHandler {
    pub fn new(name: &str, kind: TypeKind, store: Arc<dyn ContentStore>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            options: TypeOptions::default(),
            schema: Vec::new(),
            store,
        }
    }

    pub fn with_options(mut self, options: TypeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_schema(mut self, schema: Vec<Field>) -> Self {
        self.schema = schema;
        self
    }
}

/// Maps content-type discriminators to their handlers.
#[derive(Clone, Default)]
pub struct ContentTypeRegistry {
    handlers: HashMap<String, TypeHandler>,
    widgets: HashMap<String, Vec<Field>>,
    placement: PagePlacement,
}

impl ContentTypeRegistry {
    pub fn new(placement: PagePlacement) -> Self {
        Self {
            handlers: HashMap::new(),
            widgets: HashMap::new(),
            placement,
        }
    }

    /// Build the registry described by the `types` and `widgets` settings,
    /// with every type backed by `store`.
    pub fn from_settings(settings: &Settings, store: Arc<dyn ContentStore>) -> Self {
        let mut registry = Self::new(settings.pages.clone());

        for (name, type_settings) in &settings.types {
            let options = TypeOptions {
                singleton: type_settings.singleton,
                autopublish: type_settings.autopublish,
                import_enabled: type_settings.import,
            };
            registry.register(
                TypeHandler::new(name, type_settings.kind, store.clone())
                    .with_options(options)
                    .with_schema(type_settings.fields.clone()),
            );
        }

        for (name, fields) in &settings.widgets {
            registry.register_widget(name, fields.clone());
        }

        registry
    }

    pub fn register(&mut self, handler: TypeHandler) -> &mut Self {
        self.handlers.insert(handler.name.clone(), handler);
        self
    }

    pub fn register_widget(&mut self, name: &str, fields: Vec<Field>) -> &mut Self {
        self.widgets.insert(name.to_string(), fields);
        self
    }

    pub fn resolve(&self, doc_type: &str) -> Option<&TypeHandler> {
        self.handlers.get(doc_type)
    }

    pub fn widget_schema(&self, widget_type: &str) -> Option<&[Field]> {
        self.widgets.get(widget_type).map(Vec::as_slice)
    }

    /// Placement for page inserts.
    pub fn placement(&self) -> &PagePlacement {
        &self.placement
    }
}
