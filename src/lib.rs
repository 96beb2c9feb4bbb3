use std::collections::BTreeMap;

pub mod aliases;
pub mod config;
pub mod counterparty;
pub mod docx;
pub mod engine;
pub mod entity;
pub mod errors;
pub mod export;
pub mod placeholders;
pub mod preview;
pub mod store;

/// Placeholder token (braces included) to value.
pub type ValueMap = BTreeMap<String, String>;

pub use engine::{ExportRequest, FieldHint, TemplateEngine};
pub use entity::Entity;
pub use errors::{EngineError, EngineResult};
pub use export::{ExportStrategy, ExportedDocument};
pub use preview::PreviewMode;
