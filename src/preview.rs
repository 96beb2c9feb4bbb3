use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use regex::NoExpand;
use serde::{Deserialize, Serialize};

use crate::docx::html::{escape_html, HtmlConverter};
use crate::errors::{EngineError, EngineResult};
use crate::placeholders::token_pattern;
use crate::ValueMap;

pub const DEFAULT_HIGHLIGHT_CLASS: &str = "placeholder-highlight";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMode {
    /// Every placeholder is highlighted; unfilled ones show their token text.
    #[default]
    Edit,
    /// Bare values only, as the exported document would read.
    Final,
}

impl fmt::Display for PreviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Edit => "edit",
            Self::Final => "final",
        })
    }
}

impl FromStr for PreviewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edit" => Ok(Self::Edit),
            "final" => Ok(Self::Final),
            other => Err(anyhow!("unknown preview mode {other:?} (expected edit or final)")),
        }
    }
}

/// Converts the package to HTML and substitutes every known placeholder.
/// `values` should already be alias-normalized.
pub fn render_preview(
    converter: &dyn HtmlConverter,
    package: &[u8],
    placeholders: &[String],
    values: &ValueMap,
    mode: PreviewMode,
    highlight_class: &str,
) -> EngineResult<String> {
    let html = converter.convert(package).map_err(EngineError::Processing)?;
    Ok(substitute_preview(&html, placeholders, values, mode, highlight_class))
}

pub fn substitute_preview(
    html: &str,
    placeholders: &[String],
    values: &ValueMap,
    mode: PreviewMode,
    highlight_class: &str,
) -> String {
    let mut out = html.to_string();
    for token in placeholders {
        let value = values.get(token).map(String::as_str).unwrap_or("");
        let replacement = match mode {
            PreviewMode::Edit => {
                let shown = if value.is_empty() { token.as_str() } else { value };
                format!(
                    r#"<span class="{}">{}</span>"#,
                    escape_html(highlight_class),
                    escape_html(shown)
                )
            }
            PreviewMode::Final => escape_html(value),
        };
        // Converted HTML carries the token in escaped form.
        let pattern = token_pattern(&escape_html(token));
        out = pattern
            .replace_all(&out, NoExpand(&replacement))
            .into_owned();
    }
    out
}
