use anyhow::anyhow;
use serde::Serialize;
use tracing::info;

use crate::aliases::normalize_values;
use crate::config::AppConfig;
use crate::counterparty::{auto_fill, Counterparty};
use crate::docx::html::{DocxHtmlConverter, HtmlConverter};
use crate::docx::templating::{DocxTemplater, TemplatingPass};
use crate::entity::{classify, entity_of, Entity};
use crate::errors::{EngineError, EngineResult};
use crate::export::{export, ExportedDocument};
use crate::placeholders::{display_label, extract_placeholders, input_kind, InputKind};
use crate::preview::{render_preview, PreviewMode};
use crate::store::{merge_saved_values, InMemoryValueStore, JsonFileValueStore, ValueStore};
use crate::ValueMap;

/// Editor metadata for one placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldHint {
    pub token: String,
    pub label: String,
    pub input: InputKind,
    pub entity: Entity,
}

pub struct ExportRequest<'a> {
    pub package: &'a [u8],
    pub placeholders: &'a [String],
    pub values: &'a ValueMap,
    /// Caller-chosen output base name.
    pub filename_hint: Option<&'a str>,
    /// Name the package was uploaded under.
    pub original_name: &'a str,
    /// When set, values saved for this template are merged under the request values.
    pub template_id: Option<&'a str>,
}

/// Stateless document operations plus the saved value map cache.
pub struct TemplateEngine {
    config: AppConfig,
    store: Box<dyn ValueStore>,
    converter: Box<dyn HtmlConverter>,
    templater: Box<dyn TemplatingPass>,
}

impl TemplateEngine {
    pub fn new(config: AppConfig, store: Box<dyn ValueStore>) -> Self {
        let templater = DocxTemplater {
            linebreaks: config.export.linebreaks,
        };
        Self {
            config,
            store,
            converter: Box::new(DocxHtmlConverter),
            templater: Box::new(templater),
        }
    }

    /// Picks the JSON file store when `[store] dir` is configured, memory otherwise.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store: Box<dyn ValueStore> = match config.store.dir.as_ref() {
            Some(dir) => Box::new(JsonFileValueStore::new(dir)?),
            None => Box::new(InMemoryValueStore::new()),
        };
        Ok(Self::new(config, store))
    }

    pub fn with_converter(mut self, converter: Box<dyn HtmlConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_templater(mut self, templater: Box<dyn TemplatingPass>) -> Self {
        self.templater = templater;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn extract_placeholders(&self, package: &[u8]) -> EngineResult<Vec<String>> {
        let found = extract_placeholders(package)?;
        info!(count = found.len(), "extracted placeholders");
        Ok(found)
    }

    pub fn classify(&self, placeholders: &[String], entity: Entity) -> Vec<String> {
        classify(placeholders, entity)
    }

    pub fn describe(&self, placeholders: &[String]) -> Vec<FieldHint> {
        placeholders
            .iter()
            .map(|token| FieldHint {
                token: token.clone(),
                label: display_label(token),
                input: input_kind(token),
                entity: entity_of(token),
            })
            .collect()
    }

    pub fn normalize_values(&self, values: &ValueMap) -> ValueMap {
        normalize_values(values)
    }

    pub fn render_preview(
        &self,
        package: &[u8],
        placeholders: &[String],
        values: &ValueMap,
        mode: PreviewMode,
    ) -> EngineResult<String> {
        let normalized = normalize_values(values);
        render_preview(
            self.converter.as_ref(),
            package,
            placeholders,
            &normalized,
            mode,
            &self.config.preview.highlight_class,
        )
    }

    pub fn export(&self, request: ExportRequest<'_>) -> EngineResult<ExportedDocument> {
        let saved = match request.template_id {
            Some(id) => self
                .store
                .load(id)
                .map_err(|source| EngineError::Export {
                    source: source.context(format!("load saved values for {id}")),
                })?,
            None => None,
        };
        let merged = merge_saved_values(saved.as_ref(), request.values);
        let normalized = normalize_values(&merged);
        info!(
            placeholders = request.placeholders.len(),
            supplied = merged.len(),
            normalized = normalized.len(),
            "exporting document"
        );
        let doc = export(
            self.templater.as_ref(),
            request.package,
            request.placeholders,
            &normalized,
            request.filename_hint,
            request.original_name,
            &self.config.export,
        )?;
        info!(
            strategy = ?doc.strategy,
            filename = %doc.filename,
            bytes = doc.bytes.len(),
            "export finished"
        );
        Ok(doc)
    }

    pub fn save_values(&self, template_id: &str, values: &ValueMap) -> anyhow::Result<()> {
        self.store.save(template_id, values)?;
        info!(template_id, count = values.len(), "saved values");
        Ok(())
    }

    pub fn load_values(&self, template_id: &str) -> anyhow::Result<Option<ValueMap>> {
        self.store.load(template_id)
    }

    pub fn delete_values(&self, template_id: &str) -> anyhow::Result<bool> {
        self.store.remove(template_id)
    }

    pub fn auto_fill(
        &self,
        placeholders: &[String],
        values: &ValueMap,
        counterparty: &Counterparty,
        role: Entity,
    ) -> anyhow::Result<ValueMap> {
        let filled = auto_fill(placeholders, values, counterparty, role)?;
        let added = filled
            .iter()
            .filter(|(k, v)| values.get(*k) != Some(*v))
            .count();
        info!(role = %role, added, "auto-filled values");
        Ok(filled)
    }

    pub fn template_name(&self, name: &str) -> anyhow::Result<String> {
        normalize_template_name(name, &self.config.export.extension)
    }

    /// Releases the store. In-memory values are dropped, saved files are kept.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        self.store.shutdown()?;
        info!("value store shut down");
        Ok(())
    }
}

/// Trimmed display name that always ends with `extension`.
pub fn normalize_template_name(name: &str, extension: &str) -> anyhow::Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("template name must not be empty"));
    }
    if name.to_lowercase().ends_with(&extension.to_lowercase()) {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}{extension}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TemplateEngine {
        TemplateEngine::new(AppConfig::default(), Box::new(InMemoryValueStore::new()))
    }

    #[test]
    fn template_names_get_one_extension() {
        assert_eq!(normalize_template_name(" Lease ", ".docx").unwrap(), "Lease.docx");
        assert_eq!(normalize_template_name("Lease.DOCX", ".docx").unwrap(), "Lease.DOCX");
        assert!(normalize_template_name("   ", ".docx").is_err());
        assert_eq!(engine().template_name("nda").unwrap(), "nda.docx");
    }

    #[test]
    fn describe_reports_labels_kinds_and_entities() {
        let hints = engine().describe(&["{agreement.signDate}".to_string()]);
        assert_eq!(
            hints,
            vec![FieldHint {
                token: "{agreement.signDate}".into(),
                label: "Agreement SignDate".into(),
                input: InputKind::Date,
                entity: Entity::Agreement,
            }]
        );
    }

    #[test]
    fn shutdown_clears_saved_values() {
        let e = engine();
        let mut values = ValueMap::new();
        values.insert("{a.b}".into(), "1".into());
        e.save_values("t", &values).unwrap();
        assert_eq!(e.load_values("t").unwrap(), Some(values));
        e.shutdown().unwrap();
        assert_eq!(e.load_values("t").unwrap(), None);
    }
}
