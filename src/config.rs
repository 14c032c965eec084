use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_IGNORE_PATTERNS: &str = ".git/\nnode_modules/\n__pycache__/\n.DS_Store";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub database_path: PathBuf,
    /// One pattern per line, `#` starts a comment.
    pub ignore_patterns: String,
    /// 0 walks the whole tree.
    pub max_depth: usize,
    pub deep_analysis: bool,
    pub clean_empty_dirs: bool,
    pub log_filter: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.to_string(),
            max_depth: 0,
            deep_analysis: false,
            clean_empty_dirs: false,
            log_filter: "info".to_string(),
        }
    }
}

pub fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "vibesort", "vibesort")
        .map(|dirs| dirs.data_dir().join("index.db"))
        .unwrap_or_else(|| PathBuf::from("index.db"))
}

impl CoreConfig {
    /// Missing file means defaults; a present but malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert!(config.ignore_patterns.contains("node_modules/"));
        assert!(config.database_path.ends_with("index.db"));
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = CoreConfig {
            database_path: dir.path().join("db.sqlite"),
            max_depth: 3,
            deep_analysis: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(CoreConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_depth": 2}"#).unwrap();
        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(CoreConfig::load(&path), Err(AppError::Serde(_))));
    }
}
