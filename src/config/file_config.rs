use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub lastfm_user: Option<String>,
    pub lastfm_api_key: Option<String>,
    pub musicbrainz_user_agent: Option<String>,
    pub interactive: Option<bool>,

    // Feature configs
    pub sync: Option<SyncConfig>,
    pub resolver: Option<ResolverConfig>,
    pub fetcher: Option<FetcherConfig>,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub page_limit: Option<u32>,
    pub page_delay_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub prompt_every: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    pub fuzzy_enabled: Option<bool>,
    pub fuzzy_threshold: Option<f64>,
    pub create_manual_when_automatic: Option<bool>,
    pub enrich_with_lastfm: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FetcherConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_days: Option<u64>,
    /// Per-namespace TTL overrides, e.g. `mb_artist_search = 7`.
    pub namespace_ttl_days: Option<HashMap<String, u64>>,
    pub key_hash_threshold: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
lastfm_user = "alice"

[resolver]
fuzzy_threshold = 0.9

[cache.namespace_ttl_days]
mb_artist = 60
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.lastfm_user.as_deref(), Some("alice"));
        assert!(config.db_dir.is_none());
        assert_eq!(config.resolver.unwrap().fuzzy_threshold, Some(0.9));
        let cache = config.cache.unwrap();
        assert_eq!(cache.namespace_ttl_days.unwrap().get("mb_artist"), Some(&60));
        assert!(cache.default_ttl_days.is_none());
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lastfm_user = ").unwrap();
        assert!(FileConfig::load(file.path()).is_err());
    }
}
