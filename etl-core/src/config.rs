use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// City used when neither a trigger payload nor a stored default names one.
pub const FALLBACK_CITY: &str = "Gurugram";

/// Key-value variables, the stand-in for an orchestrator's variable store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Variables {
    /// API key for the weather provider.
    pub openweather_api_key: Option<String>,

    /// Default city when a run carries no override.
    pub weather_city_default: Option<String>,

    /// Destination bucket for staged CSV objects.
    pub bucket_name: Option<String>,
}

/// Credentials and addressing for the object store, the stand-in for a
/// managed connection record (login = access key, password = secret key).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObjectStoreConnection {
    pub access_key: String,
    pub secret_key: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible stores (MinIO, Backblaze B2, ...).
    pub endpoint: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Connections {
    pub object_store: Option<ObjectStoreConnection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseSettings {
    /// Path of the embedded warehouse database file.
    pub path: PathBuf,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self { path: PathBuf::from("weather.db") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSettings {
    /// How long query results stay cached before the warehouse is hit again.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// Top-level settings stored on disk.
///
/// Example TOML:
/// ```toml
/// [variables]
/// openweather_api_key = "..."
/// weather_city_default = "Gurugram"
/// bucket_name = "weather-data-pipeline"
///
/// [connections.object_store]
/// access_key = "..."
/// secret_key = "..."
/// region = "us-east-1"
///
/// [warehouse]
/// path = "weather.db"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub variables: Variables,

    #[serde(default)]
    pub connections: Connections,

    #[serde(default)]
    pub warehouse: WarehouseSettings,

    #[serde(default)]
    pub dashboard: DashboardSettings,
}

impl Settings {
    /// Load settings from disk, or return an empty default if the file does
    /// not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::settings_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no settings file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        Ok(settings)
    }

    /// Save settings to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;

        Ok(())
    }

    /// Platform path of the settings file.
    pub fn settings_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-etl", "weather-etl")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("settings.toml"))
    }

    /// Set one of the named variables, rejecting unknown keys.
    pub fn set_variable(&mut self, key: &str, value: String) -> Result<()> {
        match key {
            "openweather_api_key" => self.variables.openweather_api_key = Some(value),
            "weather_city_default" => self.variables.weather_city_default = Some(value),
            "bucket_name" => self.variables.bucket_name = Some(value),
            _ => {
                return Err(anyhow!(
                    "Unknown variable '{key}'. Supported variables: \
                     openweather_api_key, weather_city_default, bucket_name."
                ));
            }
        }
        Ok(())
    }
}

/// Optional payload supplied by a manual trigger, e.g. `{"city": "Paris"}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriggerPayload {
    pub city: Option<String>,
}

/// Bucket and credentials only, enough for the bulk-load step, which never
/// touches the weather API.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub connection: ObjectStoreConnection,
}

impl StorageConfig {
    pub fn resolve(settings: &Settings) -> Result<Self> {
        let bucket_name = settings.variables.bucket_name.clone().ok_or_else(|| {
            anyhow!(
                "No bucket configured.\n\
                 Hint: run `weather-etl set-var bucket_name <bucket>` first."
            )
        })?;

        let connection = settings.connections.object_store.clone().ok_or_else(|| {
            anyhow!("No object store connection configured (missing [connections.object_store]).")
        })?;

        Ok(Self { bucket_name, connection })
    }
}

/// Everything one pipeline run needs, resolved once up front and passed by
/// parameter. Business logic never reads ambient configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub api_key: String,
    pub bucket_name: String,
    pub connection: ObjectStoreConnection,
    pub city: String,
}

impl RunConfig {
    /// Resolve run parameters from the settings store and an optional
    /// trigger payload. City precedence: trigger override, then the stored
    /// default variable, then the hard-coded fallback.
    pub fn resolve(settings: &Settings, trigger: Option<&TriggerPayload>) -> Result<Self> {
        let api_key = settings
            .variables
            .openweather_api_key
            .clone()
            .ok_or_else(|| {
                anyhow!(
                    "No weather API key configured.\n\
                     Hint: run `weather-etl set-var openweather_api_key <key>` first."
                )
            })?;

        let StorageConfig { bucket_name, connection } = StorageConfig::resolve(settings)?;

        let city = match trigger.and_then(|t| t.city.clone()) {
            Some(city) => {
                info!(%city, "Using city from manual trigger payload");
                city
            }
            None => match settings.variables.weather_city_default.clone() {
                Some(city) => {
                    info!(%city, "Using default city from variables");
                    city
                }
                None => FALLBACK_CITY.to_string(),
            },
        };

        Ok(Self { api_key, bucket_name, connection, city })
    }
}
