use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context;
use regex::{NoExpand, Regex};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ExportSection;
use crate::docx::package::DocxPackage;
use crate::docx::templating::TemplatingPass;
use crate::errors::{EngineError, EngineResult};
use crate::placeholders::strip_braces;
use crate::ValueMap;

/// Result of the two-step export pipeline.
#[derive(Debug)]
pub enum ExportOutcome {
    Templated(Vec<u8>),
    RawSubstituted(Vec<u8>),
    Failed(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStrategy {
    Templated,
    RawSubstituted,
}

#[derive(Clone, Debug)]
pub struct ExportedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub strategy: ExportStrategy,
}

/// Produces the filled package from a normalized value map, plus its download name.
pub fn export(
    templater: &dyn TemplatingPass,
    package: &[u8],
    placeholders: &[String],
    values: &ValueMap,
    filename_hint: Option<&str>,
    original_name: &str,
    settings: &ExportSection,
) -> EngineResult<ExportedDocument> {
    let (bytes, strategy) = match export_pipeline(templater, package, placeholders, values) {
        ExportOutcome::Templated(bytes) => (bytes, ExportStrategy::Templated),
        ExportOutcome::RawSubstituted(bytes) => (bytes, ExportStrategy::RawSubstituted),
        ExportOutcome::Failed(source) => return Err(EngineError::Export { source }),
    };
    Ok(ExportedDocument {
        bytes,
        filename: export_filename(filename_hint, original_name, settings),
        strategy,
    })
}

/// Templating pass first; on any failure its output is dropped and the original bytes
/// go through raw substitution instead.
pub fn export_pipeline(
    templater: &dyn TemplatingPass,
    package: &[u8],
    placeholders: &[String],
    values: &ValueMap,
) -> ExportOutcome {
    let data = template_data(placeholders, values);
    match templater.render(package, &data) {
        Ok(bytes) => {
            debug!(keys = data.len(), "templating pass succeeded");
            ExportOutcome::Templated(bytes)
        }
        Err(err) => {
            let cause = format!("{err:#}");
            warn!(error = %cause, "templating pass failed; falling back to raw substitution");
            match raw_substitute(package, placeholders, values) {
                Ok(bytes) => ExportOutcome::RawSubstituted(bytes),
                Err(err) => ExportOutcome::Failed(err),
            }
        }
    }
}

/// Flat `scope.field -> value` key space. Every placeholder gets a key, empty when unset.
pub fn template_data(placeholders: &[String], values: &ValueMap) -> BTreeMap<String, String> {
    let mut data: BTreeMap<String, String> = values
        .iter()
        .map(|(token, value)| (strip_braces(token), value.clone()))
        .collect();
    for token in placeholders {
        data.entry(strip_braces(token)).or_default();
    }
    data
}

/// Literal token replacement in the raw text of every `word/*.xml` part.
///
/// A placeholder whose characters are split over several runs never appears intact in
/// the raw XML, so that occurrence is left as is.
pub fn raw_substitute(
    package: &[u8],
    placeholders: &[String],
    values: &ValueMap,
) -> anyhow::Result<Vec<u8>> {
    let pkg = DocxPackage::from_bytes(package).context("reload original package")?;
    let rules = placeholders
        .iter()
        .map(|token| {
            let value = values.get(token).map(String::as_str).unwrap_or("");
            Ok((xml_token_pattern(token)?, xml_escape(value)))
        })
        .collect::<anyhow::Result<Vec<(Regex, String)>>>()?;

    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
    for ent in pkg.body_xml_entries() {
        let original = std::str::from_utf8(&ent.data)
            .with_context(|| format!("xml part is not utf-8: {}", ent.name))?;
        let mut text = original.to_string();
        for (pattern, value) in &rules {
            text = pattern.replace_all(&text, NoExpand(value)).into_owned();
        }
        if text != original {
            replacements.insert(ent.name.clone(), text.into_bytes());
        }
    }
    pkg.to_bytes_with_replacements(&replacements)
        .context("repackage substituted document")
}

/// Matches `token` as it appears in XML character data. `&` and `<` are always
/// escaped there, the other markup characters only by some writers.
pub fn xml_token_pattern(token: &str) -> anyhow::Result<Regex> {
    let mut pattern = String::with_capacity(token.len() * 2);
    let mut buf = [0u8; 4];
    for ch in token.chars() {
        match ch {
            '&' => pattern.push_str("&amp;"),
            '<' => pattern.push_str("&lt;"),
            '>' => pattern.push_str("(?:>|&gt;)"),
            '"' => pattern.push_str("(?:\"|&quot;)"),
            '\'' => pattern.push_str("(?:'|&apos;)"),
            _ => pattern.push_str(&regex::escape(ch.encode_utf8(&mut buf))),
        }
    }
    Regex::new(&pattern).with_context(|| format!("token pattern for {token}"))
}

pub fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// `custom` gets the extension appended unless it already ends with it. Without one,
/// the upload stem plus the filled suffix is used.
pub fn export_filename(custom: Option<&str>, original_name: &str, settings: &ExportSection) -> String {
    let ext = settings.extension.as_str();
    if let Some(custom) = custom.map(str::trim).filter(|s| !s.is_empty()) {
        if custom.to_lowercase().ends_with(&ext.to_lowercase()) {
            return custom.to_string();
        }
        return format!("{custom}{ext}");
    }
    let stem = Path::new(original_name.trim())
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    format!("{stem}{}{ext}", settings.filled_suffix)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use anyhow::anyhow;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::docx::templating::DocxTemplater;

    struct FailingPass;

    impl TemplatingPass for FailingPass {
        fn render(&self, _: &[u8], _: &BTreeMap<String, String>) -> anyhow::Result<Vec<u8>> {
            Err(anyhow!("forced failure"))
        }
    }

    fn docx(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        w.start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        w.write_all(xml.as_bytes()).unwrap();
        w.start_file("docProps/app.xml", SimpleFileOptions::default())
            .unwrap();
        w.write_all(b"<Properties>{x.y}</Properties>").unwrap();
        w.finish().unwrap().into_inner()
    }

    fn body_of(bytes: &[u8]) -> String {
        let pkg = DocxPackage::from_bytes(bytes).unwrap();
        String::from_utf8(pkg.body_bytes().unwrap().to_vec()).unwrap()
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn values(pairs: &[(&str, &str)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn template_data_strips_braces_and_defaults_missing() {
        let data = template_data(
            &tokens(&["{a.b}", "{c.d}"]),
            &values(&[("{a.b}", "1"), ("{e.f}", "2")]),
        );
        assert_eq!(data["a.b"], "1");
        assert_eq!(data["c.d"], "");
        assert_eq!(data["e.f"], "2");
    }

    #[test]
    fn templating_pass_is_used_when_it_succeeds() {
        let pkg = docx(r#"<w:p><w:r><w:t>{x.y}</w:t></w:r></w:p>"#);
        let out = export_pipeline(
            &DocxTemplater::default(),
            &pkg,
            &tokens(&["{x.y}"]),
            &values(&[("{x.y}", "VALUE")]),
        );
        let ExportOutcome::Templated(bytes) = out else {
            panic!("expected templated outcome, got {out:?}");
        };
        let body = body_of(&bytes);
        assert!(body.contains("<w:t>VALUE</w:t>"), "{body}");
        assert!(!body.contains("{x.y}"));
    }

    #[test]
    fn failed_templating_falls_back_with_escaping() {
        let pkg = docx(r#"<w:p><w:r><w:t>{x.y}</w:t></w:r></w:p>"#);
        let out = export_pipeline(
            &FailingPass,
            &pkg,
            &tokens(&["{x.y}"]),
            &values(&[("{x.y}", r#"A & B <"q"> 'z' $1"#)]),
        );
        let ExportOutcome::RawSubstituted(bytes) = out else {
            panic!("expected raw outcome, got {out:?}");
        };
        let body = body_of(&bytes);
        assert!(
            body.contains("<w:t>A &amp; B &lt;&quot;q&quot;&gt; &apos;z&apos; $1</w:t>"),
            "{body}"
        );
        // parts outside word/ are never touched
        let again = DocxPackage::from_bytes(&bytes).unwrap();
        assert_eq!(
            again.entry("docProps/app.xml").unwrap().data,
            b"<Properties>{x.y}</Properties>"
        );
    }

    #[test]
    fn raw_substitution_matches_escaped_tokens() {
        let pkg = docx(r#"<w:p><w:r><w:t>{r&amp;d.lead}</w:t></w:r><w:r><w:t>{a&lt;b>c}</w:t></w:r></w:p>"#);
        let out = export_pipeline(
            &FailingPass,
            &pkg,
            &tokens(&["{r&d.lead}", "{a<b>c}"]),
            &values(&[("{r&d.lead}", "Kim"), ("{a<b>c}", "Lee")]),
        );
        let ExportOutcome::RawSubstituted(bytes) = out else {
            panic!("expected raw outcome, got {out:?}");
        };
        let body = body_of(&bytes);
        assert!(body.contains("<w:t>Kim</w:t>"), "{body}");
        assert!(body.contains("<w:t>Lee</w:t>"), "{body}");
        assert!(!body.contains("lead"), "{body}");
    }

    #[test]
    fn raw_substitution_leaves_run_split_tokens() {
        let pkg = docx(r#"<w:p><w:r><w:t>{x.</w:t></w:r><w:r><w:t>y}</w:t></w:r></w:p>"#);
        let bytes = raw_substitute(&pkg, &tokens(&["{x.y}"]), &values(&[("{x.y}", "V")])).unwrap();
        let body = body_of(&bytes);
        assert!(body.contains("<w:t>{x.</w:t>"));
        assert!(!body.contains('V'));
    }

    #[test]
    fn unreadable_package_fails_both_phases() {
        let err = export(
            &FailingPass,
            b"not a zip",
            &tokens(&["{x.y}"]),
            &ValueMap::new(),
            None,
            "a.docx",
            &ExportSection::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "export");
    }

    #[test]
    fn filename_rules() {
        let s = ExportSection::default();
        assert_eq!(export_filename(Some("Contract 7"), "x.docx", &s), "Contract 7.docx");
        assert_eq!(export_filename(Some("final.DOCX"), "x.docx", &s), "final.DOCX");
        assert_eq!(export_filename(Some("  "), "lease.docx", &s), "lease_filled.docx");
        assert_eq!(export_filename(None, "lease.docx", &s), "lease_filled.docx");
        assert_eq!(export_filename(None, "v1.2.docx", &s), "v1.2_filled.docx");
        assert_eq!(export_filename(None, "", &s), "document_filled.docx");
    }
}
