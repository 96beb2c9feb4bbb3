use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::preview::DEFAULT_HIGHLIGHT_CLASS;

pub const CONFIG_FILENAME: &str = "docfill.toml";
pub const CONFIG_ENV: &str = "DOCFILL_CONFIG";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub preview: PreviewSection,
    #[serde(default)]
    pub export: ExportSection,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSection {
    /// CSS class of the span wrapping placeholders in edit mode.
    pub highlight_class: String,
}

impl Default for PreviewSection {
    fn default() -> Self {
        Self {
            highlight_class: DEFAULT_HIGHLIGHT_CLASS.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub extension: String,
    /// Appended to the upload stem when no output name is given.
    pub filled_suffix: String,
    /// Render `\n` in values as line breaks during the templating pass.
    pub linebreaks: bool,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            extension: ".docx".to_string(),
            filled_suffix: "_filled".to_string(),
            linebreaks: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Directory for saved value maps. Relative paths resolve against the config file.
    /// Unset keeps values in memory for the life of the process.
    pub dir: Option<PathBuf>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let mut cfg: AppConfig = toml::from_str(&text)
        .with_context(|| format!("parse config toml: {}", path.display()))?;
    if let Some(dir) = cfg.store.dir.as_mut() {
        if dir.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            *dir = base.join(&*dir);
        }
    }
    Ok(cfg)
}

/// Explicit path, then `DOCFILL_CONFIG`, then the upward search. A missing explicit
/// file is an error; finding nothing at all yields the defaults.
pub fn resolve_config(explicit: Option<PathBuf>) -> anyhow::Result<(AppConfig, Option<PathBuf>)> {
    let from_env = || {
        std::env::var(CONFIG_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    };
    let path = explicit
        .or_else(from_env)
        .or_else(|| find_default_config(CONFIG_FILENAME));
    match path {
        Some(p) => {
            let cfg = load_config(&p)?;
            Ok((cfg, Some(p)))
        }
        None => Ok((AppConfig::default(), None)),
    }
}

/// Writes a commented default `docfill.toml` into `dir`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        anyhow::bail!(
            "config already exists: {} (use --force to overwrite)",
            cfg_path.display()
        );
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"# docfill configuration

[preview]
highlight_class = "placeholder-highlight"

[export]
extension = ".docx"
filled_suffix = "_filled"
# `\n` inside a value becomes a line break in the exported document.
linebreaks = true

[store]
# Saved value maps, one <template_id>.json per template. Unset keeps them in memory.
# dir = "values"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.preview.highlight_class, "placeholder-highlight");
        assert_eq!(cfg.export.extension, ".docx");
        assert!(cfg.export.linebreaks);
        assert!(cfg.store.dir.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [export]
            filled_suffix = "_final"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.export.filled_suffix, "_final");
        assert_eq!(cfg.export.extension, ".docx");
        assert!(cfg.export.linebreaks);
    }

    #[test]
    fn shipped_default_parses_to_defaults() {
        let cfg: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn store_dir_resolves_against_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[store]\ndir = \"values\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.store.dir, Some(tmp.path().join("values")));
    }

    #[test]
    fn explicit_path_wins_and_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "[preview]\nhighlight_class = \"mark\"\n").unwrap();
        let (cfg, used) = resolve_config(Some(path.clone())).unwrap();
        assert_eq!(cfg.preview.highlight_class, "mark");
        assert_eq!(used, Some(path));

        assert!(resolve_config(Some(tmp.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn upward_search_finds_parent_file() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILENAME), "").unwrap();
        assert_eq!(
            find_file_upwards(&nested, CONFIG_FILENAME, 8),
            Some(tmp.path().join(CONFIG_FILENAME))
        );
        assert_eq!(find_file_upwards(&nested, CONFIG_FILENAME, 1), None);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let path = init_default_config(tmp.path(), false).unwrap();
        assert!(path.exists());
        assert!(init_default_config(tmp.path(), false).is_err());
        assert!(init_default_config(tmp.path(), true).is_ok());
    }
}
