mod file_config;

pub use file_config::{CacheConfig, FetcherConfig, FileConfig, ResolverConfig, SyncConfig};

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub lastfm_user: Option<String>,
    pub lastfm_api_key: Option<String>,
    pub musicbrainz_user_agent: Option<String>,
    pub full_resync: bool,
    pub interactive: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub lastfm_user: Option<String>,
    pub lastfm_api_key: Option<String>,
    pub musicbrainz_user_agent: String,
    pub full_resync: bool,
    pub interactive: bool,

    // Feature configs (with defaults)
    pub sync: SyncSettings,
    pub resolver: ResolverSettings,
    pub fetcher: FetcherSettings,
    pub cache: CacheSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let cache_dir = file
            .cache_dir
            .map(PathBuf::from)
            .or_else(|| cli.cache_dir.clone())
            .unwrap_or_else(|| db_dir.join("cache"));

        let lastfm_user = file.lastfm_user.or_else(|| cli.lastfm_user.clone());
        let lastfm_api_key = file.lastfm_api_key.or_else(|| cli.lastfm_api_key.clone());
        let musicbrainz_user_agent = file
            .musicbrainz_user_agent
            .or_else(|| cli.musicbrainz_user_agent.clone())
            .unwrap_or_else(default_user_agent);

        // Full resync is destructive, so it can only be requested per invocation.
        let full_resync = cli.full_resync;
        let interactive = file.interactive.unwrap_or(cli.interactive);

        let sync_file = file.sync.unwrap_or_default();
        let sync_defaults = SyncSettings::default();
        let sync = SyncSettings {
            page_limit: sync_file.page_limit.unwrap_or(sync_defaults.page_limit),
            page_delay_ms: sync_file.page_delay_ms.unwrap_or(sync_defaults.page_delay_ms),
            batch_size: sync_file
                .batch_size
                .unwrap_or(sync_defaults.batch_size)
                .max(1),
            prompt_every: sync_file
                .prompt_every
                .unwrap_or(sync_defaults.prompt_every)
                .max(1),
        };

        let resolver_file = file.resolver.unwrap_or_default();
        let resolver_defaults = ResolverSettings::default();
        let fuzzy_threshold = resolver_file
            .fuzzy_threshold
            .unwrap_or(resolver_defaults.fuzzy_threshold);
        if !(0.0..=1.0).contains(&fuzzy_threshold) {
            bail!(
                "resolver.fuzzy_threshold must be between 0 and 1, got {}",
                fuzzy_threshold
            );
        }
        let resolver = ResolverSettings {
            fuzzy_enabled: resolver_file
                .fuzzy_enabled
                .unwrap_or(resolver_defaults.fuzzy_enabled),
            fuzzy_threshold,
            create_manual_when_automatic: resolver_file
                .create_manual_when_automatic
                .unwrap_or(resolver_defaults.create_manual_when_automatic),
            enrich_with_lastfm: resolver_file
                .enrich_with_lastfm
                .unwrap_or(resolver_defaults.enrich_with_lastfm),
        };

        let fetcher_file = file.fetcher.unwrap_or_default();
        let fetcher_defaults = FetcherSettings::default();
        let fetcher = FetcherSettings {
            max_attempts: fetcher_file
                .max_attempts
                .unwrap_or(fetcher_defaults.max_attempts)
                .max(1),
            base_delay_ms: fetcher_file
                .base_delay_ms
                .unwrap_or(fetcher_defaults.base_delay_ms),
            timeout_secs: fetcher_file
                .timeout_secs
                .unwrap_or(fetcher_defaults.timeout_secs),
        };

        let cache_file = file.cache.unwrap_or_default();
        let mut cache = CacheSettings::default();
        if let Some(days) = cache_file.default_ttl_days {
            cache.default_ttl_days = days;
        }
        if let Some(overrides) = cache_file.namespace_ttl_days {
            cache.namespace_ttl_days.extend(overrides);
        }
        if let Some(threshold) = cache_file.key_hash_threshold {
            cache.key_hash_threshold = threshold;
        }

        Ok(Self {
            db_dir,
            cache_dir,
            lastfm_user,
            lastfm_api_key,
            musicbrainz_user_agent,
            full_resync,
            interactive,
            sync,
            resolver,
            fetcher,
            cache,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    /// Last.fm credentials, required by `sync`.
    pub fn lastfm_credentials(&self) -> Result<(&str, &str)> {
        match (&self.lastfm_user, &self.lastfm_api_key) {
            (Some(user), Some(key)) => Ok((user.as_str(), key.as_str())),
            _ => bail!("Last.fm user and API key must be specified via CLI or config file"),
        }
    }
}

fn default_user_agent() -> String {
    format!("scrobble-sync/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Events per remote page.
    pub page_limit: u32,
    pub page_delay_ms: u64,
    /// Scrobble rows per committed batch.
    pub batch_size: usize,
    /// Interactive mode asks whether to continue every this many events.
    pub prompt_every: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_limit: 200,
            page_delay_ms: 250,
            batch_size: 10,
            prompt_every: 25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub fuzzy_enabled: bool,
    pub fuzzy_threshold: f64,
    /// Whether the automatic policy inserts minimal `manual` rows or skips.
    pub create_manual_when_automatic: bool,
    pub enrich_with_lastfm: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            fuzzy_enabled: true,
            fuzzy_threshold: 0.85,
            create_manual_when_automatic: true,
            enrich_with_lastfm: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub default_ttl_days: u64,
    pub namespace_ttl_days: HashMap<String, u64>,
    /// Parameter keys longer than this are replaced by their SHA-256.
    pub key_hash_threshold: usize,
}

impl CacheSettings {
    pub fn ttl_days(&self, namespace: &str) -> u64 {
        self.namespace_ttl_days
            .get(namespace)
            .copied()
            .unwrap_or(self.default_ttl_days)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        let namespace_ttl_days = [
            ("mb_artist_search", 7),
            ("mb_release_search", 7),
            ("mb_recording_search", 7),
        ]
        .into_iter()
        .map(|(ns, days)| (ns.to_string(), days))
        .collect();
        Self {
            default_ttl_days: 30,
            namespace_ttl_days,
            key_hash_threshold: 200,
        }
    }
}
