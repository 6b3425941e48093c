/*!
 * Configuration types for Spokes
 *
 * Values come from three layers, later ones winning: built-in defaults, an
 * optional TOML file, then environment variables. The CLI applies its flags
 * on top of the result.
 */

use crate::error::{Result, SpokesError};
use crate::routing::RequestOptions;
use crate::selection::SelectionStrategy;
use serde::{Deserialize, Serialize};
use spokes_core_resilience::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Which scopes to select routes for. When the table is present in a
    /// file, only the scopes it lists are enabled.
    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub valhalla: ValhallaConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// Show a progress bar during generation
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            generation: GenerationConfig::default(),
            valhalla: ValhallaConfig::default(),
            database: DatabaseConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
            show_progress: true,
        }
    }
}

/// Route selection per scope (None = scope disabled)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Network-wide selection, written to the main routes file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<SelectionStrategy>,

    /// Per-station selection, written to one file per station
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual: Option<SelectionStrategy>,

    /// Per-station selection flattened into a single file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<SelectionStrategy>,

    /// Pairs with fewer trips are ignored by every scope
    #[serde(default = "default_min_trips")]
    pub min_trips: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            global: SelectionStrategy::top_n(5).ok(),
            individual: SelectionStrategy::coverage(80.0).ok(),
            aggregate: None,
            min_trips: default_min_trips(),
        }
    }
}

impl SelectionConfig {
    pub fn any_enabled(&self) -> bool {
        self.global.is_some() || self.individual.is_some() || self.aggregate.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.any_enabled() {
            return Err(SpokesError::Config(
                "At least one of global, individual or aggregate selection must be enabled"
                    .to_string(),
            ));
        }
        if self.min_trips < 1 {
            return Err(SpokesError::Config(format!(
                "min_trips must be positive: {}",
                self.min_trips
            )));
        }
        Ok(())
    }
}

/// Batch generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Worker threads for route requests (1 = sequential)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Log batch progress every N pairs
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Valhalla costing model
    #[serde(default = "default_costing")]
    pub costing: String,

    /// Bicycle type for the bicycle costing model
    #[serde(default = "default_bicycle_type")]
    pub bicycle_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            progress_interval: default_progress_interval(),
            costing: default_costing(),
            bicycle_type: default_bicycle_type(),
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(SpokesError::Config(format!(
                "workers must be between 1 and {}: {}",
                MAX_WORKERS, self.workers
            )));
        }
        if self.progress_interval < 1 {
            return Err(SpokesError::Config(
                "progress_interval must be positive".to_string(),
            ));
        }
        if self.costing.trim().is_empty() {
            return Err(SpokesError::Config("costing cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Routing engine connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValhallaConfig {
    #[serde(default = "default_valhalla_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per route, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed pause between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Road snapping radius around each station, meters
    #[serde(default = "default_snap_radius")]
    pub snap_radius_m: u32,

    /// Minimum reachability for snapped locations
    #[serde(default = "default_min_reachability")]
    pub min_reachability: u32,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: default_valhalla_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            snap_radius_m: default_snap_radius(),
            min_reachability: default_min_reachability(),
        }
    }
}

impl ValhallaConfig {
    fn base(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            SpokesError::Config(format!("Invalid Valhalla URL {}: {}", self.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SpokesError::Config(format!(
                "Invalid Valhalla URL: {}",
                self.base_url
            )));
        }
        // Join relative to the base path, not its parent
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        self.base()?.join(name).map_err(|e| {
            SpokesError::Config(format!("Invalid Valhalla endpoint {}: {}", name, e))
        })
    }

    /// Full URL of the route API
    pub fn route_endpoint(&self) -> Result<Url> {
        self.endpoint("route")
    }

    /// Full URL of the status API
    pub fn status_endpoint(&self) -> Result<Url> {
        self.endpoint("status")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_delay_ms),
        )?)
    }

    pub fn validate(&self) -> Result<()> {
        self.base()?;
        if self.timeout_secs == 0 {
            return Err(SpokesError::Config(
                "timeout_secs must be positive".to_string(),
            ));
        }
        self.retry_policy()?;
        Ok(())
    }
}

/// PostgreSQL connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub database: String,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema holding the `trips` and `stations` tables
    #[serde(default = "default_db_schema")]
    pub schema: String,
}

// Hand-written so the password never reaches a log line
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            schema: default_db_schema(),
        }
    }
}

impl DatabaseConfig {
    /// Checked before connecting. The schema is interpolated into SQL, so
    /// it must be a plain identifier.
    pub fn validate(&self) -> Result<()> {
        if self.password.is_empty() {
            return Err(SpokesError::Config(
                "POSTGRES_PASSWORD must be set".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(SpokesError::Config(format!("Invalid port: {}", self.port)));
        }
        if !is_identifier(&self.schema) {
            return Err(SpokesError::Config(format!(
                "Invalid schema name: {}",
                self.schema
            )));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Output file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Base directory for route files
    #[serde(default = "default_output_dir")]
    pub base_dir: PathBuf,

    /// Subdirectory for per-station files
    #[serde(default = "default_station_subdir")]
    pub station_subdir: String,

    #[serde(default = "default_manifest_filename")]
    pub manifest_filename: String,

    /// Gzip route files
    #[serde(default = "default_true")]
    pub use_compression: bool,

    /// Gzip level, 0-9
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: default_output_dir(),
            station_subdir: default_station_subdir(),
            manifest_filename: default_manifest_filename(),
            use_compression: true,
            compression_level: default_compression_level(),
        }
    }
}

impl OutputConfig {
    pub fn station_dir(&self) -> PathBuf {
        self.base_dir.join(&self.station_subdir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.base_dir.join(&self.manifest_filename)
    }

    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(SpokesError::Config(format!(
                "compression_level must be 0-9: {}",
                self.compression_level
            )));
        }
        if self.station_subdir.is_empty() || self.manifest_filename.is_empty() {
            return Err(SpokesError::Config(
                "station_subdir and manifest_filename cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

pub const MAX_WORKERS: usize = 64;

fn default_true() -> bool {
    true
}

fn default_min_trips() -> u64 {
    1
}

fn default_workers() -> usize {
    1
}

fn default_progress_interval() -> usize {
    100
}

fn default_costing() -> String {
    "bicycle".to_string()
}

fn default_bicycle_type() -> String {
    "Road".to_string()
}

fn default_valhalla_url() -> String {
    "http://localhost:8002".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_snap_radius() -> u32 {
    100
}

fn default_min_reachability() -> u32 {
    20
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "peloton_db".to_string()
}

fn default_db_user() -> String {
    "peloton".to_string()
}

fn default_db_schema() -> String {
    "hsl".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("routes")
}

fn default_station_subdir() -> String {
    "by-station".to_string()
}

fn default_manifest_filename() -> String {
    "manifest.json".to_string()
}

fn default_compression_level() -> u32 {
    9
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SpokesError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file (the password is never written)
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply process environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`: VALHALLA_URL, POSTGRES_HOST,
    /// POSTGRES_PORT, POSTGRES_DB, POSTGRES_USER, POSTGRES_PASSWORD,
    /// POSTGRES_SCHEMA, OUTPUT_DIR
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VALHALLA_URL") {
            self.valhalla.base_url = url;
        }
        if let Some(host) = lookup("POSTGRES_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("POSTGRES_PORT") {
            self.database.port = port
                .parse()
                .map_err(|_| SpokesError::Config(format!("Invalid POSTGRES_PORT: {}", port)))?;
        }
        if let Some(db) = lookup("POSTGRES_DB") {
            self.database.database = db;
        }
        if let Some(user) = lookup("POSTGRES_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("POSTGRES_PASSWORD") {
            self.database.password = password;
        }
        if let Some(schema) = lookup("POSTGRES_SCHEMA") {
            self.database.schema = schema;
        }
        if let Some(dir) = lookup("OUTPUT_DIR") {
            self.output.base_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Validate everything that does not need the database
    pub fn validate(&self) -> Result<()> {
        self.selection.validate()?;
        self.generation.validate()?;
        self.valhalla.validate()?;
        self.output.validate()?;
        Ok(())
    }

    /// Request parameters for every routing call
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            snap_radius_m: self.valhalla.snap_radius_m,
            min_reachability: self.valhalla.min_reachability,
            costing: self.generation.costing.clone(),
            bicycle_type: self.generation.bicycle_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.selection.global,
            Some(SelectionStrategy::top_n(5).unwrap())
        );
        assert_eq!(
            config.selection.individual,
            Some(SelectionStrategy::coverage(80.0).unwrap())
        );
        assert_eq!(config.selection.aggregate, None);
        assert_eq!(config.selection.min_trips, 1);
        assert_eq!(config.valhalla.max_retries, 3);
        assert_eq!(config.valhalla.timeout_secs, 30);
        assert_eq!(config.output.compression_level, 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_scope_enabled_rejected() {
        let mut config = PipelineConfig::default();
        config.selection.global = None;
        config.selection.individual = None;
        assert!(matches!(config.validate(), Err(SpokesError::Config(_))));

        config.selection.aggregate = Some(SelectionStrategy::top_n(3).unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_trips_must_be_positive() {
        let mut config = PipelineConfig::default();
        config.selection.min_trips = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valhalla_endpoints() {
        let mut valhalla = ValhallaConfig::default();
        assert_eq!(
            valhalla.route_endpoint().unwrap().as_str(),
            "http://localhost:8002/route"
        );

        valhalla.base_url = "https://routing.example.org/valhalla".to_string();
        assert_eq!(
            valhalla.status_endpoint().unwrap().as_str(),
            "https://routing.example.org/valhalla/status"
        );
    }

    #[test]
    fn test_invalid_valhalla_url() {
        let mut valhalla = ValhallaConfig::default();
        valhalla.base_url = "ftp://localhost:8002".to_string();
        assert!(valhalla.validate().is_err());

        valhalla.base_url = "not a url".to_string();
        assert!(valhalla.validate().is_err());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let valhalla = ValhallaConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(matches!(valhalla.validate(), Err(SpokesError::Config(_))));
    }

    #[test]
    fn test_database_validation() {
        let mut db = DatabaseConfig::default();
        assert!(db.validate().is_err());

        db.password = "secret".to_string();
        assert!(db.validate().is_ok());

        db.schema = "hsl; DROP TABLE trips".to_string();
        assert!(db.validate().is_err());
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let db = DatabaseConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        let printed = format!("{:?}", db);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VALHALLA_URL", "http://valhalla:8002"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_PASSWORD", "pw"),
            ("POSTGRES_SCHEMA", "citybikes"),
            ("OUTPUT_DIR", "/tmp/out"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.valhalla.base_url, "http://valhalla:8002");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.password, "pw");
        assert_eq!(config.database.schema, "citybikes");
        assert_eq!(config.output.base_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.database.host, "localhost");
    }

    #[test]
    fn test_bad_port_env_rejected() {
        let mut config = PipelineConfig::default();
        let result = config.apply_env_from(|key| {
            (key == "POSTGRES_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(SpokesError::Config(_))));
    }

    #[test]
    fn test_selection_table_lists_enabled_scopes() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [selection]
            aggregate = { top_n = 3 }
            min_trips = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.selection.global, None);
        assert_eq!(config.selection.individual, None);
        assert_eq!(
            config.selection.aggregate,
            Some(SelectionStrategy::top_n(3).unwrap())
        );
        assert_eq!(config.selection.min_trips, 10);
        // untouched sections keep their defaults
        assert_eq!(config.valhalla.snap_radius_m, 100);
    }

    #[test]
    fn test_invalid_strategy_in_file_rejected() {
        let parsed = toml::from_str::<PipelineConfig>(
            r#"
            [selection]
            global = { coverage = 0.0 }
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let mut config = PipelineConfig::default();
        config.generation.workers = 4;
        config.database.password = "never-written".to_string();

        let file = NamedTempFile::new().unwrap();
        config.to_file(file.path()).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        assert!(!written.contains("never-written"));

        let loaded = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.generation.workers, 4);
        assert_eq!(loaded.selection, config.selection);
        assert!(loaded.database.password.is_empty());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
    }
}
