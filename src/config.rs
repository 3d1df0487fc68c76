use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::VellumError;

pub const DB_FILE_NAME: &str = "vellum.db";
pub const CACHE_DIR_NAME: &str = ".vellum";

/// Everything the engine reads from its environment. Loaded from TOML; missing keys fall back to
/// [`CoreConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub content_root: PathBuf,
    /// Where the database and mode markers live. Defaults to `<content_root>/.vellum`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Only documents with `public: true` are indexed, and `<!--exc-->` regions are dropped.
    pub only_public: bool,
    pub search_index: bool,
    /// Root-level directory served verbatim; never walked or watched.
    pub static_dir: String,
    /// Root-level directory holding templates and partials.
    pub template_dir: String,
    pub document_extension: String,
    pub document_cache_capacity: usize,
    pub query_ttl_secs: u64,
    pub attachment_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub debounce_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub queue_capacity: usize,
    pub write_timeout_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            content_root: PathBuf::from("."),
            cache_dir: None,
            only_public: false,
            search_index: false,
            static_dir: "static".to_string(),
            template_dir: "templates".to_string(),
            document_extension: "md".to_string(),
            document_cache_capacity: 500,
            query_ttl_secs: 30,
            attachment_ttl_secs: 30,
            sweep_interval_secs: 300,
            debounce_ms: 300,
            workers: None,
            queue_capacity: 256,
            write_timeout_secs: 30,
        }
    }
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(content_root: P) -> Self {
        CoreConfig {
            content_root: content_root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VellumError> {
        tracing::debug!("Attempting to read config from: {:?}", path.as_ref());
        let content = read_to_string(path)?;
        let config: CoreConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), VellumError> {
        tracing::debug!("Attempting to write config to: {:?}", path.as_ref());
        let toml_string = toml::to_string(self)?;
        write(path, toml_string)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), VellumError> {
        if self.document_extension.is_empty() || self.document_extension.starts_with('.') {
            return Err(VellumError::Config(format!(
                "document_extension must be a bare extension, got {:?}",
                self.document_extension
            )));
        }
        if self.workers == Some(0) {
            return Err(VellumError::Config("workers must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(VellumError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.content_root.join(CACHE_DIR_NAME))
    }

    pub fn db_path(&self) -> PathBuf {
        self.cache_dir().join(DB_FILE_NAME)
    }

    pub fn template_root(&self) -> PathBuf {
        self.content_root.join(&self.template_dir)
    }

    pub fn static_root(&self) -> PathBuf {
        self.content_root.join(&self.static_dir)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    pub fn query_ttl(&self) -> Duration {
        Duration::from_secs(self.query_ttl_secs)
    }

    pub fn attachment_ttl(&self) -> Duration {
        Duration::from_secs(self.attachment_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: CoreConfig = toml::from_str(
            r#"
            content_root = "/srv/notes"
            only_public = true
            debounce_ms = 150
            "#,
        )
        .unwrap();
        assert!(config.only_public);
        assert_eq!(config.debounce(), Duration::from_millis(150));
        assert_eq!(config.document_cache_capacity, 500);
        assert_eq!(config.cache_dir(), PathBuf::from("/srv/notes/.vellum"));
        assert_eq!(config.db_path(), PathBuf::from("/srv/notes/.vellum/vellum.db"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vellum.toml");
        let mut config = CoreConfig::new("/srv/notes");
        config.search_index = true;
        config.workers = Some(3);
        config.save(&path).unwrap();
        let loaded = CoreConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.workers(), 3);
    }

    #[test]
    fn rejects_dotted_extension() {
        let mut config = CoreConfig::default();
        config.document_extension = ".md".to_string();
        assert!(matches!(config.validate(), Err(VellumError::Config(_))));
    }
}
