use std::path::{Path, PathBuf};

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;
use crate::namepool::DEFAULT_MAX_SIZE;

/// Rig settings directory, relative to the rig root.
pub const SETTINGS_DIR: &str = "settings";
pub const CONFIG_TOML: &str = "config.toml";
pub const CONFIG_JSON: &str = "config.json";

/// Find the rig config file, preferring `config.toml` over `config.json`.
/// Returns None if neither exists.
pub fn find_config(rig_root: &Path) -> Option<PathBuf> {
    let settings = rig_root.join(SETTINGS_DIR);
    let toml_path = settings.join(CONFIG_TOML);
    if toml_path.exists() {
        return Some(toml_path);
    }
    let json_path = settings.join(CONFIG_JSON);
    if json_path.exists() {
        return Some(json_path);
    }
    None
}

/// Per-rig witness settings (`settings/config.toml`).
///
/// snake_case keys with camelCase aliases so legacy JSON configs still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RigConfig {
    /// Rig name; defaults to the rig directory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub namepool: NamePoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NamePoolConfig {
    /// Theme name: a built-in theme or a catalog in `settings/themes/<style>.txt`.
    /// When absent the theme is derived from the rig name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Inline worker names. Takes precedence over `style` when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    /// Themed names to use before falling back to numbered names.
    #[serde(default = "default_max_before_numbering", alias = "maxBeforeNumbering")]
    pub max_before_numbering: usize,
}

impl Default for NamePoolConfig {
    fn default() -> Self {
        Self {
            style: None,
            names: Vec::new(),
            max_before_numbering: default_max_before_numbering(),
        }
    }
}

const fn default_max_before_numbering() -> usize {
    DEFAULT_MAX_SIZE
}

impl RigConfig {
    /// Load config from a file (TOML or JSON, auto-detected by extension).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "toml" => Self::parse_toml(&contents),
            "json" => Self::parse_json(&contents),
            _ => Self::parse_toml(&contents).or_else(|_| Self::parse_json(&contents)),
        }
    }

    /// Load the rig's config, or defaults when the rig has none.
    pub fn load_for_rig(rig_root: &Path) -> anyhow::Result<Self> {
        match find_config(rig_root) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_TOML}: {e}")).into())
    }

    pub fn parse_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_JSON}: {e}")).into())
    }

    /// Serialize config to a TOML string with explanatory comments.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        let raw = toml::to_string_pretty(self).context("serializing config to TOML")?;

        let mut doc: toml_edit::DocumentMut = raw
            .parse()
            .context("parsing generated TOML for comment injection")?;

        doc.decor_mut().set_prefix("# Witness rig configuration\n\n");
        if let Some(tbl) = doc.get_mut("namepool").and_then(|item| item.as_table_mut()) {
            tbl.decor_mut().set_prefix(
                "\n# Worker name pool\n# style: built-in theme or settings/themes/<style>.txt catalog\n",
            );
        }

        Ok(doc.to_string())
    }

    /// Effective rig name: configured name or the rig directory's name.
    pub fn rig_name(&self, rig_root: &Path) -> String {
        self.name.clone().unwrap_or_else(|| {
            rig_root
                .canonicalize()
                .unwrap_or_else(|_| rig_root.to_path_buf())
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "rig".to_string())
        })
    }
}
