use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::docx::package::{DocxPackage, BODY_PART};
use crate::docx::text::body_text;
use crate::docx::xml::XmlPart;
use crate::errors::{EngineError, EngineResult};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}]+\}").expect("placeholder regex"));

/// Distinct placeholder tokens of the document body, in order of first appearance.
pub fn extract_placeholders(package: &[u8]) -> EngineResult<Vec<String>> {
    let pkg = DocxPackage::from_bytes(package).map_err(EngineError::PackageRead)?;
    let body = pkg.body_bytes().map_err(EngineError::PackageRead)?;
    let part = XmlPart::parse(BODY_PART, body).map_err(EngineError::PackageRead)?;
    let text = body_text(&part).map_err(EngineError::Processing)?;
    Ok(find_placeholders(&text))
}

pub fn find_placeholders(text: &str) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    PLACEHOLDER_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|tok| seen.insert(*tok))
        .map(str::to_string)
        .collect()
}

/// Regex matching `token` literally; `{`, `}` and `.` carry no meaning in it.
pub fn token_pattern(token: &str) -> Regex {
    // An escaped literal is always a valid pattern.
    Regex::new(&regex::escape(token)).expect("escaped literal regex")
}

/// `{customer.bankAccount}` -> `customer.bankAccount`
pub fn strip_braces(token: &str) -> String {
    token.chars().filter(|c| *c != '{' && *c != '}').collect()
}

/// Portion before the first dot, without braces.
pub fn scope_of(token: &str) -> Option<String> {
    let bare = strip_braces(token);
    bare.split_once('.').map(|(scope, _)| scope.to_string())
}

/// Portion after the first dot, without braces.
pub fn field_of(token: &str) -> Option<String> {
    let bare = strip_braces(token);
    bare.split_once('.').map(|(_, field)| field.to_string())
}

/// `{customer.company}` -> `Customer Company`
pub fn display_label(token: &str) -> String {
    strip_braces(token)
        .split('.')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Text,
    Date,
    Number,
}

/// Editor input hint derived from the token name.
pub fn input_kind(token: &str) -> InputKind {
    let lower = token.to_lowercase();
    if lower.contains("date") {
        InputKind::Date
    } else if lower.contains("number") || lower.contains("amount") {
        InputKind::Number
    } else {
        InputKind::Text
    }
}
