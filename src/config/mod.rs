//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use apalis_cron::Schedule;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    application::{
        context::{DEFAULT_API_BASE, DEFAULT_IMAGE_HOST},
        jobs::{DEFAULT_BLOB_SCHEDULE, DEFAULT_TAG_SCHEDULE},
    },
    cache::CacheConfig,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "reelcache";
const ENV_PREFIX: &str = "REELCACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BLOB_DIR: &str = "storage";
const DEFAULT_BLOB_CONTAINER: &str = "images";

/// Command-line arguments for the reelcache binary.
#[derive(Debug, Parser)]
#[command(name = "reelcache", version, about = "Read-through catalog mirror")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "REELCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service and the scheduled sweeps.
    Serve(Box<ServeArgs>),
    /// Run reconciliation sweeps once and exit.
    Reconcile(ReconcileArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the Redis URL backing the fast cache.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Override the catalog API base URL.
    #[arg(long = "origin-api-base", value_name = "URL")]
    pub origin_api_base: Option<String>,

    /// Override the image host base URL.
    #[arg(long = "origin-image-host", value_name = "URL")]
    pub origin_image_host: Option<String>,

    /// Override the blob store root directory.
    #[arg(long = "blobs-directory", value_name = "PATH")]
    pub blobs_directory: Option<PathBuf>,

    /// Enable or disable the scheduled sweeps.
    #[arg(
        long = "reconcile-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub reconcile_enabled: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Sweep the listing tags; when neither --tags nor --blobs is supplied, both run.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub tags: bool,

    /// Sweep stored blob references; when neither --tags nor --blobs is supplied, both run.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub blobs: bool,
}

impl ReconcileArgs {
    pub fn run_tags(&self) -> bool {
        self.tags || !self.blobs
    }

    pub fn run_blobs(&self) -> bool {
        self.blobs || !self.tags
    }
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub origin: OriginSettings,
    pub blobs: BlobSettings,
    pub reconcile: ReconcileSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

/// Fast cache backend plus the TTL table, in seconds.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// In-process cache when absent.
    pub redis_url: Option<String>,
    pub listing_ttl_secs: u64,
    pub detail_ttl_secs: u64,
    pub taxonomy_ttl_secs: u64,
    pub blob_store_hit_ttl_secs: u64,
    pub blob_download_ttl_secs: u64,
    pub tag_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub api_base: String,
    pub image_host: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BlobSettings {
    pub directory: PathBuf,
    pub container: String,
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub enabled: bool,
    pub tag_schedule: String,
    pub blob_schedule: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Reconcile(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    origin: RawOriginSettings,
    blobs: RawBlobSettings,
    reconcile: RawReconcileSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(base) = overrides.origin_api_base.as_ref() {
            self.origin.api_base = Some(base.clone());
        }
        if let Some(host) = overrides.origin_image_host.as_ref() {
            self.origin.image_host = Some(host.clone());
        }
        if let Some(directory) = overrides.blobs_directory.as_ref() {
            self.blobs.directory = Some(directory.clone());
        }
        if let Some(enabled) = overrides.reconcile_enabled {
            self.reconcile.enabled = Some(enabled);
        }

        self.apply_database_override(&DatabaseOverride {
            database_url: overrides.database_url.clone(),
        });
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            origin,
            blobs,
            reconcile,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            origin: build_origin_settings(origin)?,
            blobs: build_blob_settings(blobs)?,
            reconcile: build_reconcile_settings(reconcile)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url)
        .ok_or_else(|| LoadError::invalid("database.url", "a connection URL is required"))?;

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let acquire_secs = database
        .acquire_timeout_seconds
        .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS);
    if acquire_secs == 0 {
        return Err(LoadError::invalid(
            "database.acquire_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout: Duration::from_secs(acquire_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();
    let ttl = |value: Option<u64>, fallback: u64, key: &'static str| match value {
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(secs) => Ok(secs),
        None => Ok(fallback),
    };

    Ok(CacheSettings {
        redis_url: non_blank(cache.redis_url),
        listing_ttl_secs: ttl(
            cache.listing_ttl_secs,
            defaults.listing_ttl_secs,
            "cache.listing_ttl_secs",
        )?,
        detail_ttl_secs: ttl(
            cache.detail_ttl_secs,
            defaults.detail_ttl_secs,
            "cache.detail_ttl_secs",
        )?,
        taxonomy_ttl_secs: ttl(
            cache.taxonomy_ttl_secs,
            defaults.taxonomy_ttl_secs,
            "cache.taxonomy_ttl_secs",
        )?,
        blob_store_hit_ttl_secs: ttl(
            cache.blob_store_hit_ttl_secs,
            defaults.blob_store_hit_ttl_secs,
            "cache.blob_store_hit_ttl_secs",
        )?,
        blob_download_ttl_secs: ttl(
            cache.blob_download_ttl_secs,
            defaults.blob_download_ttl_secs,
            "cache.blob_download_ttl_secs",
        )?,
        tag_ttl_secs: ttl(cache.tag_ttl_secs, defaults.tag_ttl_secs, "cache.tag_ttl_secs")?,
    })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let api_base = parse_base_url(origin.api_base, DEFAULT_API_BASE, "origin.api_base")?;
    let image_host = parse_base_url(origin.image_host, DEFAULT_IMAGE_HOST, "origin.image_host")?;

    let timeout_secs = origin.timeout_seconds.unwrap_or(DEFAULT_ORIGIN_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "origin.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(OriginSettings {
        api_base,
        image_host,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_blob_settings(blobs: RawBlobSettings) -> Result<BlobSettings, LoadError> {
    let directory = blobs
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BLOB_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "blobs.directory",
            "path must not be empty",
        ));
    }

    let container =
        non_blank(blobs.container).unwrap_or_else(|| DEFAULT_BLOB_CONTAINER.to_string());
    if container.contains(['/', '\\']) || container == ".." || container == "." {
        return Err(LoadError::invalid(
            "blobs.container",
            "must be a single directory name",
        ));
    }

    Ok(BlobSettings {
        directory,
        container,
    })
}

fn build_reconcile_settings(
    reconcile: RawReconcileSettings,
) -> Result<ReconcileSettings, LoadError> {
    let tag_schedule = non_blank(reconcile.tag_schedule)
        .unwrap_or_else(|| DEFAULT_TAG_SCHEDULE.to_string());
    validate_schedule(&tag_schedule, "reconcile.tag_schedule")?;

    let blob_schedule = non_blank(reconcile.blob_schedule)
        .unwrap_or_else(|| DEFAULT_BLOB_SCHEDULE.to_string());
    validate_schedule(&blob_schedule, "reconcile.blob_schedule")?;

    Ok(ReconcileSettings {
        enabled: reconcile.enabled.unwrap_or(true),
        tag_schedule,
        blob_schedule,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    redis_url: Option<String>,
    listing_ttl_secs: Option<u64>,
    detail_ttl_secs: Option<u64>,
    taxonomy_ttl_secs: Option<u64>,
    blob_store_hit_ttl_secs: Option<u64>,
    blob_download_ttl_secs: Option<u64>,
    tag_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    api_base: Option<String>,
    image_host: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBlobSettings {
    directory: Option<PathBuf>,
    container: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReconcileSettings {
    enabled: Option<bool>,
    tag_schedule: Option<String>,
    blob_schedule: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Validates an absolute http(s) URL and strips any trailing slash.
fn parse_base_url(
    value: Option<String>,
    fallback: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let raw = non_blank(value).unwrap_or_else(|| fallback.to_string());
    let parsed =
        Url::parse(&raw).map_err(|err| LoadError::invalid(key, format!("invalid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "scheme must be http or https"));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn validate_schedule(expression: &str, key: &'static str) -> Result<(), LoadError> {
    Schedule::from_str(expression)
        .map(|_| ())
        .map_err(|err| LoadError::invalid(key, format!("invalid cron expression: {err}")))
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
