use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::debug;

use crate::models::PhotolineConfig;

pub const CONFIG_PATH_ENV: &str = "PHOTOLINE_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "PHOTOLINE_CONFIG_JSON";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl PhotolineConfig {
    /// Load configuration using the process environment.
    /// Evaluation order:
    /// 1) `.env` in the working directory (only fills unset variables),
    /// 2) `$PHOTOLINE_CONFIG_PATH` (TOML or JSON file),
    /// 3) `$PHOTOLINE_CONFIG_JSON` (inline JSON),
    /// 4) `./photoline.toml` or `./photoline.json`,
    /// 5) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::load_with(|key| env::var(key).ok())
    }

    /// Same as [`Self::load_from_env`] minus the `.env` step, reading
    /// variables through `lookup`.
    pub fn load_with<F>(lookup: F) -> anyhow::Result<(Self, ConfigSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (config, source) = Self::resolve(lookup)?;
        config
            .validate()
            .with_context(|| format!("invalid configuration from {source:?}"))?;
        Ok((config, source))
    }

    fn resolve<F>(lookup: F) -> anyhow::Result<(Self, ConfigSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path_str) = lookup(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str.trim());
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = lookup(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents)
                .with_context(|| format!("invalid config {}", path.display())),
            Some("toml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid config {}: {err}", path.display())),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    /// Tries TOML first, then JSON.
    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse config {origin}: toml error: {toml_err}; json error: {json_err}"
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid config json: {err}"))
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &["photoline.toml", "photoline.json"];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(pairs: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&'static str, String> = pairs.into_iter().collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PhotolineConfig::parse_from_str(
            r#"
            [scanner]
            idle_timeout_ms = 1000

            [worker_pool]
            worker_count = 3
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.scanner.idle_timeout(), Duration::from_secs(1));
        assert_eq!(
            config.scanner.status_retention_ms,
            PhotolineConfig::default().scanner.status_retention_ms
        );
        assert_eq!(config.worker_pool.worker_count, Some(3));
        assert_eq!(config.worker_pool.max_queue_size_mb, None);
        assert_eq!(config.preview.quality, 85);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn config_path_wins_over_inline_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{ "preview": { "max_dimension": 640 } }"#).unwrap();

        let (config, source) = PhotolineConfig::load_with(lookup(vec![
            (CONFIG_PATH_ENV, path.display().to_string()),
            (CONFIG_JSON_ENV, r#"{ "preview": { "quality": 50 } }"#.to_string()),
        ]))
        .unwrap();

        assert_eq!(source, ConfigSource::EnvPath(path));
        assert_eq!(config.preview.max_dimension, 640);
        assert_eq!(config.preview.quality, 85);
    }

    #[test]
    fn inline_json_is_used_without_a_path() {
        let (config, source) = PhotolineConfig::load_with(lookup(vec![(
            CONFIG_JSON_ENV,
            r#"{ "logging": { "filter": "debug" } }"#.to_string(),
        )]))
        .unwrap();

        assert_eq!(source, ConfigSource::EnvInline);
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn files_without_known_extension_accept_either_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photoline.conf");
        fs::write(&path, "[preview]\nquality = 70\n").unwrap();

        let config = PhotolineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.preview.quality, 70);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PhotolineConfig::load_with(lookup(vec![(
            CONFIG_JSON_ENV,
            r#"{ "preview": { "quality": 0 } }"#.to_string(),
        )]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("preview.quality"));

        let err = PhotolineConfig::parse_json("{ not json").unwrap_err();
        assert!(err.to_string().contains("invalid config json"));
    }
}
