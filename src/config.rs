use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MisinfoConfig {
    /// SQLite database path, or `:memory:`
    pub database: String,
    pub broker_url: String,
    pub input_topic: String,
    pub output_topic: String,
    pub consumer_name: String,
    pub consumer_group: String,
}

impl Default for MisinfoConfig {
    fn default() -> Self {
        Self {
            database: "misinfo.db".to_string(),
            broker_url: "redis://127.0.0.1:6379/".to_string(),
            input_topic: "misinfo/input".to_string(),
            output_topic: "misinfo/output".to_string(),
            consumer_name: "api".to_string(),
            consumer_group: "misinfo-api".to_string(),
        }
    }
}

impl MisinfoConfig {
    /// Overlay values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`; empty values are ignored
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut String); 6] = [
            ("MISINFO_SQLITE_DSN", &mut self.database),
            ("MISINFO_BROKER_URL", &mut self.broker_url),
            ("MISINFO_INPUT_TOPIC", &mut self.input_topic),
            ("MISINFO_OUTPUT_TOPIC", &mut self.output_topic),
            ("MISINFO_CONSUMER_NAME", &mut self.consumer_name),
            ("MISINFO_CONSUMER_GROUP", &mut self.consumer_group),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *field = value;
            }
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == ":memory:"
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("misinfo.toml")
}

/// Load defaults overlaid with the TOML file at `path` (or `misinfo.toml`).
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<MisinfoConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(MisinfoConfig::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: MisinfoConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
    Ok(config)
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, MisinfoConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misinfo.toml");
        std::fs::write(&path, "database = \"data/posts.db\"\noutput_topic = \"reports\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.database, "data/posts.db");
        assert_eq!(config.output_topic, "reports");
        assert_eq!(config.input_topic, "misinfo/input");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misinfo.toml");
        std::fs::write(&path, "database = [").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("MISINFO_SQLITE_DSN", ":memory:"),
            ("MISINFO_BROKER_URL", "redis://broker:6379/"),
            ("MISINFO_CONSUMER_NAME", ""),
        ]
        .into_iter()
        .collect();

        let mut config = MisinfoConfig {
            consumer_name: "worker-1".to_string(),
            ..MisinfoConfig::default()
        };
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert!(config.is_in_memory());
        assert_eq!(config.broker_url, "redis://broker:6379/");
        assert_eq!(config.consumer_name, "worker-1");
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("misinfo.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().exists());
    }
}
