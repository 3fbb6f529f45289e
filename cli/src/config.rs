use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

use mealprep_core::agent::DEFAULT_POLL_INTERVAL;

pub const DEFAULT_API_BASE: &str = "https://www.paprikaapp.com/api/v1";

/// Settings resolved once at startup and passed to whatever needs them.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_base: String,
    pub enrich_interval: Duration,
}

/// Command-line and environment overrides; `None` keeps the default.
#[derive(Debug, Default)]
pub struct Overrides {
    pub db_path: Option<PathBuf>,
    pub api_base: Option<String>,
    pub enrich_interval_secs: Option<u64>,
}

impl Config {
    pub fn load(overrides: Overrides) -> Result<Self> {
        let db_path = match overrides.db_path {
            Some(path) => path,
            None => {
                let proj_dirs = ProjectDirs::from("", "", "mealprep")
                    .context("Could not determine home directory")?;
                let data_dir = proj_dirs.data_dir().to_path_buf();
                std::fs::create_dir_all(&data_dir).with_context(|| {
                    format!("Failed to create data directory: {}", data_dir.display())
                })?;
                data_dir.join("mealprep.db")
            }
        };

        Ok(Config {
            db_path,
            api_base: overrides
                .api_base
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            enrich_interval: overrides
                .enrich_interval_secs
                .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Overrides {
            db_path: Some(dir.path().join("custom.db")),
            api_base: Some("http://localhost:8080/api/v1".to_string()),
            enrich_interval_secs: Some(5),
        })
        .unwrap();
        assert_eq!(config.db_path, dir.path().join("custom.db"));
        assert_eq!(config.api_base, "http://localhost:8080/api/v1");
        assert_eq!(config.enrich_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_api_base_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Overrides {
            db_path: Some(dir.path().join("m.db")),
            api_base: Some("  ".to_string()),
            enrich_interval_secs: None,
        })
        .unwrap();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.enrich_interval, DEFAULT_POLL_INTERVAL);
    }
}
