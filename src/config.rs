use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Run configuration, loaded from a JSON file. Source databases are keyed by
/// connection name; the BTreeMap keeps them in the fixed sorted order the
/// merge iterates in.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    pub target: PathBuf,
    pub sources: BTreeMap<String, PathBuf>,
    pub site: SiteConfig,
    /// External schema-migration command, invoked with the database path
    /// appended as the last argument. When absent the built-in schema is
    /// applied to the target and each source is probed for it.
    #[serde(default)]
    pub migrate_command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub domain: String,
    pub name: String,
}

impl MergeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        let config: MergeConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.to_string_lossy()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.sources.is_empty() {
            anyhow::bail!("config lists no source databases");
        }
        if self.sources.contains_key("default") {
            anyhow::bail!("source connections must not be named \"default\"");
        }
        if let Some(cmd) = &self.migrate_command {
            if cmd.is_empty() {
                anyhow::bail!("migrate_command must name an executable");
            }
        }
        Ok(())
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_default_as_source_name() {
        let parsed: MergeConfig = serde_json::from_str(
            r#"{
                "target": "t.sqlite3",
                "sources": { "default": "d.sqlite3" },
                "site": { "domain": "example.org", "name": "Example" }
            }"#,
        )
        .unwrap();
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn source_names_are_sorted() {
        let parsed: MergeConfig = serde_json::from_str(
            r#"{
                "target": "t.sqlite3",
                "sources": { "bravo": "b.sqlite3", "alfa": "a.sqlite3" },
                "site": { "domain": "example.org", "name": "Example" }
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.source_names(), vec!["alfa", "bravo"]);
    }
}
