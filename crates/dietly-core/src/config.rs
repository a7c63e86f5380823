use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Map providers the location crate knows how to build.
pub const SUPPORTED_MAP_PROVIDERS: &[&str] = &["amap", "nominatim"];

/// Amap caps nearby search at 50 km.
pub const MAX_PLACE_SEARCH_RADIUS_METERS: u32 = 50_000;

const AMAP_KEY_PLACEHOLDER: &str = "YOUR_AMAP_WEB_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Location acquisition defaults
    #[serde(default)]
    pub location: LocationSettings,

    /// Geocoding / place search provider
    #[serde(default)]
    pub map: MapSettings,

    /// Local user identity
    #[serde(default)]
    pub user: UserSettings,
}

/// Fixed position served when the device position can't be obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultCenter {
    pub longitude: f64,
    pub latitude: f64,
}

impl Default for DefaultCenter {
    /// Tiananmen, Beijing.
    fn default() -> Self {
        Self {
            longitude: 116.397428,
            latitude: 39.90923,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    #[serde(default = "default_true")]
    pub enable_high_accuracy: bool,

    /// Positioning deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_true")]
    pub enable_cache: bool,

    #[serde(default = "default_cache_expiry_minutes")]
    pub cache_expiry_minutes: u32,

    #[serde(default)]
    pub fetch_nearby_places: bool,

    #[serde(default = "default_place_search_radius")]
    pub place_search_radius_meters: u32,

    /// Serve `default_center` when the device position can't be obtained
    #[serde(default = "default_true")]
    pub use_default_center: bool,

    #[serde(default)]
    pub default_center: DefaultCenter,
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_cache_expiry_minutes() -> u32 {
    30
}

fn default_place_search_radius() -> u32 {
    500
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: default_timeout_ms(),
            enable_cache: true,
            cache_expiry_minutes: default_cache_expiry_minutes(),
            fetch_nearby_places: false,
            place_search_radius_meters: default_place_search_radius(),
            use_default_center: true,
            default_center: DefaultCenter::default(),
        }
    }
}

impl LocationSettings {
    /// Fallback position, if the default-position fallback is enabled
    pub fn fallback_center(&self) -> Option<&DefaultCenter> {
        self.use_default_center.then_some(&self.default_center)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSettings {
    /// One of `SUPPORTED_MAP_PROVIDERS`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Amap web-service key
    /// Create at: https://console.amap.com/dev/key/app
    #[serde(default = "default_amap_key")]
    pub amap_web_api_key: String,

    #[serde(default = "default_amap_base_url")]
    pub amap_base_url: String,

    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries for transient HTTP failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_provider() -> String {
    "amap".to_string()
}

fn default_amap_key() -> String {
    AMAP_KEY_PLACEHOLDER.to_string()
}

fn default_amap_base_url() -> String {
    "https://restapi.amap.com".to_string()
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            amap_web_api_key: default_amap_key(),
            amap_base_url: default_amap_base_url(),
            nominatim_url: default_nominatim_url(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl MapSettings {
    /// Provider name as written, trimmed and lowercased.
    pub fn provider_name(&self) -> String {
        self.provider.trim().to_ascii_lowercase()
    }

    /// Check if the Amap key is set (not the placeholder)
    pub fn has_amap_key(&self) -> bool {
        let key = self.amap_web_api_key.trim();
        !key.is_empty() && key != AMAP_KEY_PLACEHOLDER
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSettings {
    /// Profile id; the location cache is keyed by it
    #[serde(default)]
    pub user_id: Option<String>,
}

impl UserSettings {
    /// Configured user id, or `"default"` when unset or blank.
    pub fn effective_user_id(&self) -> &str {
        match self.user_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => "default",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dietly");

        Self {
            config_dir,
            location: LocationSettings::default(),
            map: MapSettings::default(),
            user: UserSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the user config dir, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            ConfigError::ParseError(format!("{}: {}", config_path.display(), e))
        })?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors; warnings are logged.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let location = &self.location;

        if location.timeout_ms == 0 {
            result.add_error("location.timeout_ms", "Timeout must be greater than 0");
        } else if location.timeout_ms > 120_000 {
            result.add_warning(
                "location.timeout_ms",
                "Positioning timeout is more than 2 minutes",
            );
        }

        if location.cache_expiry_minutes == 0 && location.enable_cache {
            result.add_warning(
                "location.cache_expiry_minutes",
                "Cache expiry of 0 minutes means cached positions are never served",
            );
        }

        if location.fetch_nearby_places {
            let radius = location.place_search_radius_meters;
            if radius == 0 || radius > MAX_PLACE_SEARCH_RADIUS_METERS {
                result.add_error(
                    "location.place_search_radius_meters",
                    format!(
                        "Search radius must be between 1 and {} meters",
                        MAX_PLACE_SEARCH_RADIUS_METERS
                    ),
                );
            }
        }

        if let Some(center) = location.fallback_center() {
            let valid = center.longitude.is_finite()
                && center.latitude.is_finite()
                && (-180.0..=180.0).contains(&center.longitude)
                && (-90.0..=90.0).contains(&center.latitude);
            if !valid {
                result.add_error(
                    "location.default_center",
                    "Default center must be a valid longitude/latitude pair",
                );
            }
        }

        let provider = self.map.provider_name();
        if !SUPPORTED_MAP_PROVIDERS.contains(&provider.as_str()) {
            result.add_error(
                "map.provider",
                format!(
                    "Unsupported provider '{}' (expected one of: {})",
                    self.map.provider,
                    SUPPORTED_MAP_PROVIDERS.join(", ")
                ),
            );
        }

        if provider == "amap" && !self.map.has_amap_key() {
            result.add_warning(
                "map.amap_web_api_key",
                "Amap key not configured - set it or switch map.provider to nominatim",
            );
        }

        self.validate_url(&self.map.amap_base_url, "map.amap_base_url", &mut result);
        self.validate_url(&self.map.nominatim_url, "map.nominatim_url", &mut result);

        if self.map.request_timeout_secs == 0 {
            result.add_error(
                "map.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the user config dir
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Directory holding the persistent location cache
    pub fn cache_dir(&self) -> PathBuf {
        self.config_dir.join("location_cache")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("dietly");

        Ok(config_dir.join("config.toml"))
    }
}
