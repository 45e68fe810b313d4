use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{DispatchError, dispatch::HOSPITAL_ORIGIN, geo::GeoPoint};

const APP_DIR_NAME: &str = "samu-dispatch";
const CONFIG_FILE_NAME: &str = "config.json";
const ROUTING_KEY_ENV: &str = "ORS_API_KEY";

const DISPATCH_DELAY_MS: u64 = 2_000;
const TICK_MS: u64 = 100;
const COOLDOWN_MS: u64 = 5_000;
const ROUTE_TIMEOUT_MS: u64 = 10_000;
const MAX_ANIMATION_TICKS: usize = 100;

/// Timing of the simulated dispatch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Where the ambulance departs from.
    pub origin: GeoPoint,
    pub dispatch_delay_ms: u64,
    pub tick_ms: u64,
    pub cooldown_ms: u64,
    pub max_animation_ticks: usize,
    pub route_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            origin: HOSPITAL_ORIGIN,
            dispatch_delay_ms: DISPATCH_DELAY_MS,
            tick_ms: TICK_MS,
            cooldown_ms: COOLDOWN_MS,
            max_animation_ticks: MAX_ANIMATION_TICKS,
            route_timeout_ms: ROUTE_TIMEOUT_MS,
        }
    }
}

impl DispatchConfig {
    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    /// Never zero, a zero period would make the animation timer spin.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }
}

/// Directions service settings. The API key is a credential and only ever comes
/// from the local config file or the environment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Service root, or a proxy that adds the credential server-side.
    pub base_url: String,
    pub profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openrouteservice.org".to_string(),
            profile: "driving-car".to_string(),
            api_key: None,
        }
    }
}

impl RoutingConfig {
    /// Fill in the API key from `ORS_API_KEY` when the config file has none.
    pub fn with_env_fallback(mut self) -> Self {
        if self.api_key.is_none() {
            if let Ok(key) = env::var(ROUTING_KEY_ENV) {
                if !key.trim().is_empty() {
                    debug!("Using routing API key from {}", ROUTING_KEY_ENV);
                    self.api_key = Some(key.trim().to_string());
                }
            }
        }
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub dispatch: DispatchConfig,
    pub routing: RoutingConfig,
    /// Overrides where the profile store keeps its files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf, DispatchError> {
        Ok(dirs::config_dir()
            .ok_or(DispatchError::NoConfigDir)?
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    pub fn default_data_dir() -> Result<PathBuf, DispatchError> {
        Ok(dirs::data_dir()
            .ok_or(DispatchError::NoConfigDir)?
            .join(APP_DIR_NAME))
    }

    /// Read the config from the user's config directory, if one was saved.
    pub fn from_local_file() -> Result<Option<Self>, DispatchError> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::from_file(&config_path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, DispatchError> {
        let file =
            std::fs::File::open(path).map_err(|e| DispatchError::ConfigIOError { source: e })?;
        serde_json::from_reader(file).map_err(|e| DispatchError::ConfigSerializeError { source: e })
    }

    /// Local config file when readable, defaults otherwise, then environment fallbacks.
    pub fn load() -> Self {
        let config = match Self::from_local_file() {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("Ignoring unreadable config file: {}", e);
                Self::default()
            }
        };
        Self {
            routing: config.routing.with_env_fallback(),
            ..config
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf, DispatchError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_dir(),
        }
    }

    pub fn save(&self) -> Result<(), DispatchError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), DispatchError> {
        if let Some(parent) = config_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DispatchError::ConfigIOError { source: e })?;
            }
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| DispatchError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| DispatchError::ConfigSerializeError { source: e })
    }
}
