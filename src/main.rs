use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scrobble_sync::cache::{SystemClock, TtlCache};
use scrobble_sync::catalog::{CatalogStore, SqliteCatalogStore};
use scrobble_sync::config::{self, AppConfig};
use scrobble_sync::fetcher::{RetryPolicy, RetryingFetcher};
use scrobble_sync::merge::DuplicateMergeReconciler;
use scrobble_sync::remote::{LastFmClient, MusicBrainzClient};
use scrobble_sync::resolver::{
    AutomaticPolicy, EntityResolver, InteractivePolicy, ResolutionPolicy, ResolutionStats,
    TerminalReader,
};
use scrobble_sync::sync::{backfill_unresolved, SyncController, SyncReport};

mod cli_style;
use cli_style::{get_styles, print_section, print_warning};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
#[command(styles = get_styles(), version, about = "Sync Last.fm scrobbles into a local catalog")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding catalog.db. Can also be specified in config file.
    #[clap(long, global = true, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Directory for cached metadata responses. Defaults to <db_dir>/cache.
    #[clap(long, global = true, value_parser = parse_path)]
    pub cache_dir: Option<PathBuf>,

    /// Last.fm account whose scrobbles are synced.
    #[clap(long, global = true)]
    pub lastfm_user: Option<String>,

    #[clap(long, global = true)]
    pub lastfm_api_key: Option<String>,

    /// User-Agent sent to MusicBrainz and Last.fm.
    #[clap(long, global = true)]
    pub user_agent: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetches scrobbles newer than the checkpoint and stores them.
    Sync {
        /// Deletes every stored scrobble and resets the checkpoint first.
        #[clap(long)]
        full_resync: bool,

        /// Asks before creating unmatched entities or accepting fuzzy matches.
        #[clap(short, long)]
        interactive: bool,
    },

    /// Merges artists, albums and songs that share a MusicBrainz id.
    Merge,

    /// Retries resolution for stored scrobbles that have no song.
    Backfill {
        /// Number of scrobbles read from the catalog at a time.
        #[clap(long, default_value_t = 500)]
        page_size: usize,

        #[clap(short, long)]
        interactive: bool,
    },

    /// Inspects or clears the metadata cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Shows catalog counts.
    Stats,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Removes cached responses, all namespaces unless one is given.
    Clear {
        #[clap(long)]
        namespace: Option<String>,
    },

    /// Shows the number of live entries per namespace.
    Stats,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        let (full_resync, interactive) = match args.command {
            Command::Sync {
                full_resync,
                interactive,
            } => (full_resync, interactive),
            Command::Backfill { interactive, .. } => (false, interactive),
            _ => (false, false),
        };
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            cache_dir: args.cache_dir.clone(),
            lastfm_user: args.lastfm_user.clone(),
            lastfm_api_key: args.lastfm_api_key.clone(),
            musicbrainz_user_agent: args.user_agent.clone(),
            full_resync,
            interactive,
        }
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  cache_dir: {:?}", app_config.cache_dir);
    info!("  interactive: {}", app_config.interactive);

    match &cli_args.command {
        Command::Sync { .. } => run_sync(&app_config),
        Command::Merge => run_merge(&app_config),
        Command::Backfill { page_size, .. } => run_backfill(&app_config, *page_size),
        Command::Cache { action } => run_cache(&app_config, action),
        Command::Stats => run_stats(&app_config),
    }
}

fn open_store(config: &AppConfig) -> Result<SqliteCatalogStore> {
    info!(
        "Opening SQLite catalog database at {:?}...",
        config.catalog_db_path()
    );
    SqliteCatalogStore::new(config.catalog_db_path())
}

fn open_cache(config: &AppConfig) -> Result<TtlCache> {
    TtlCache::new(
        &config.cache_dir,
        config.cache.clone(),
        Arc::new(SystemClock),
    )
}

fn fetcher(config: &AppConfig) -> Result<RetryingFetcher> {
    RetryingFetcher::new(
        &config.musicbrainz_user_agent,
        RetryPolicy::new(&config.fetcher),
    )
}

fn resolution_policy(config: &AppConfig) -> Result<Box<dyn ResolutionPolicy>> {
    if config.interactive {
        Ok(Box::new(InteractivePolicy::new(TerminalReader::new()?)))
    } else {
        Ok(Box::new(AutomaticPolicy::new(
            config.resolver.create_manual_when_automatic,
        )))
    }
}

fn run_sync(config: &AppConfig) -> Result<()> {
    let (user, api_key) = config.lastfm_credentials()?;
    let lastfm = LastFmClient::new(fetcher(config)?, user, api_key);
    let musicbrainz = MusicBrainzClient::new(fetcher(config)?);
    let store = open_store(config)?;
    let mut cache = open_cache(config)?;

    let mut resolver = EntityResolver::new(
        &store,
        &musicbrainz,
        &mut cache,
        resolution_policy(config)?,
        config.resolver.clone(),
    )
    .with_artist_info(&lastfm);

    let report = SyncController::new(&store, &lastfm, &mut resolver, config.sync.clone())
        .run(user, config.full_resync)?;
    print_sync_report(&report);

    let counts = store.counts()?;
    info!(
        "Catalog now holds {} artists, {} albums, {} songs, {} scrobbles ({} unresolved)",
        counts.artists, counts.albums, counts.songs, counts.scrobbles, counts.unresolved_scrobbles
    );
    Ok(())
}

fn run_backfill(config: &AppConfig, page_size: usize) -> Result<()> {
    let musicbrainz = MusicBrainzClient::new(fetcher(config)?);
    let lastfm = match config.lastfm_credentials() {
        Ok((user, api_key)) => Some(LastFmClient::new(fetcher(config)?, user, api_key)),
        Err(_) => None,
    };
    let store = open_store(config)?;
    let mut cache = open_cache(config)?;

    let mut resolver = EntityResolver::new(
        &store,
        &musicbrainz,
        &mut cache,
        resolution_policy(config)?,
        config.resolver.clone(),
    );
    if let Some(lastfm) = &lastfm {
        resolver = resolver.with_artist_info(lastfm);
    }

    let report = backfill_unresolved(&store, &mut resolver, page_size)?;
    print_section(
        "Backfill",
        &[
            ("examined", report.examined.to_string()),
            ("resolved", report.resolved.to_string()),
            ("partially resolved", report.partially_resolved.to_string()),
            ("still unresolved", report.still_unresolved.to_string()),
        ],
    );
    print_resolution_stats(&resolver.stats());
    Ok(())
}

fn run_merge(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let report = DuplicateMergeReconciler::new(&store).merge_all()?;
    print_section(
        "Merged duplicates",
        &[
            ("artists", report.artists.to_string()),
            ("albums", report.albums.to_string()),
            ("songs", report.songs.to_string()),
        ],
    );
    Ok(())
}

fn run_cache(config: &AppConfig, action: &CacheCommand) -> Result<()> {
    let mut cache = open_cache(config)?;
    match action {
        CacheCommand::Clear { namespace } => {
            let removed = cache.clear(namespace.as_deref())?;
            println!("Removed {} cache file(s)", removed);
        }
        CacheCommand::Stats => {
            let stats = cache.stats()?;
            let rows: Vec<(&str, String)> = stats
                .iter()
                .map(|(namespace, count)| (namespace.as_str(), count.to_string()))
                .collect();
            print_section("Cache entries", &rows);
        }
    }
    Ok(())
}

fn run_stats(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let counts = store.counts()?;
    print_section(
        "Catalog",
        &[
            ("artists", counts.artists.to_string()),
            ("albums", counts.albums.to_string()),
            ("songs", counts.songs.to_string()),
            ("scrobbles", counts.scrobbles.to_string()),
            ("unresolved", counts.unresolved_scrobbles.to_string()),
        ],
    );
    if let Some(user) = &config.lastfm_user {
        println!("Checkpoint for {}: {}", user, store.get_checkpoint(user)?);
    }
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    print_section(
        "Sync",
        &[
            (
                "pages",
                format!("{}/{}", report.pages_fetched, report.total_pages),
            ),
            ("events fetched", report.events_fetched.to_string()),
            ("duplicates removed", report.duplicates_removed.to_string()),
            ("already present", report.already_present.to_string()),
            ("inserted", report.inserted.to_string()),
            ("without song", report.unresolved.to_string()),
            ("failed", report.failed.to_string()),
            (
                "checkpoint",
                format!("{} -> {}", report.checkpoint_before, report.checkpoint_after),
            ),
        ],
    );
    print_resolution_stats(&report.resolution);
    if report.incomplete_fetch {
        print_warning("Some pages could not be fetched; run sync again to pick up the rest.");
    }
    if report.aborted {
        print_warning("Sync was aborted; the remaining events will be fetched next run.");
    }
}

fn print_resolution_stats(stats: &ResolutionStats) {
    print_section(
        "Resolution",
        &[
            ("local hits", stats.local_hits.to_string()),
            ("fuzzy hits", stats.fuzzy_hits.to_string()),
            ("MBID updates", stats.mbid_updates.to_string()),
            ("from MusicBrainz", stats.created_from_remote.to_string()),
            ("manual", stats.created_manual.to_string()),
            ("skipped", stats.skipped.to_string()),
            ("errors", stats.errors.to_string()),
        ],
    );
}
