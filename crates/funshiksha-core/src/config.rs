//! Application configuration management.
//!
//! Configuration is stored at `~/.config/funshiksha/config.json`. Missing
//! fields take their defaults, so an empty or absent file is valid.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::InterceptorConfig;
use crate::models::Locale;
use crate::sync::DEFAULT_DELIVERY_TIMEOUT;

/// Application name used for config/data/cache directory paths
const APP_NAME: &str = "funshiksha";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides the remote sync endpoint base URL
pub const ENV_REMOTE_URL: &str = "FUNSHIKSHA_REMOTE_URL";

/// Overrides the data directory (local store and logs)
pub const ENV_DATA_DIR: &str = "FUNSHIKSHA_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the remote sync endpoint
    pub remote_base_url: String,
    /// Origin the app is served from
    pub app_origin: String,
    /// Learner profile used by this device, once created
    pub profile_id: Option<String>,
    pub preferred_locale: Locale,
    pub delivery_timeout_secs: u64,
    /// Current cache generation
    pub cache_name: String,
    pub offline_url: String,
    pub manifest: Vec<String>,
    pub return_uncacheable_responses: bool,
    /// Data directory override; platform default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let interceptor = InterceptorConfig::default();
        Self {
            remote_base_url: "https://api.funshiksha.app".to_string(),
            app_origin: interceptor.origin,
            profile_id: None,
            preferred_locale: Locale::default(),
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT.as_secs(),
            cache_name: interceptor.cache_name,
            offline_url: interceptor.offline_url,
            manifest: interceptor.manifest,
            return_uncacheable_responses: interceptor.return_uncacheable_responses,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply environment overrides on top of the loaded file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_REMOTE_URL).ok(),
            std::env::var(ENV_DATA_DIR).ok(),
        );
    }

    fn apply_overrides(&mut self, remote_url: Option<String>, data_dir: Option<String>) {
        if let Some(url) = remote_url.filter(|u| !u.trim().is_empty()) {
            self.remote_base_url = url;
        }
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Root for persistent data: the local store lives in `store/` below it.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn store_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("store"))
    }

    /// Root for the cache interceptor's named caches.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.join("cache"));
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs.max(1))
    }

    pub fn interceptor_config(&self) -> InterceptorConfig {
        InterceptorConfig {
            cache_name: self.cache_name.clone(),
            origin: self.app_origin.clone(),
            offline_url: self.offline_url.clone(),
            manifest: self.manifest.clone(),
            return_uncacheable_responses: self.return_uncacheable_responses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"profile_id": "user_1", "preferred_locale": "hi"}"#).unwrap();
        assert_eq!(config.profile_id.as_deref(), Some("user_1"));
        assert_eq!(config.preferred_locale, Locale::Hi);
        assert_eq!(config.cache_name, "funshiksha-v1");
        assert_eq!(config.delivery_timeout(), Duration::from_secs(30));
        assert!(config.manifest.contains(&"/offline.html".to_string()));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("http://localhost:9000".to_string()), Some(String::new()));
        assert_eq!(config.remote_base_url, "http://localhost:9000");
        assert!(config.data_dir.is_none());

        config.apply_overrides(None, Some("/tmp/fs".to_string()));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/fs"));
        assert_eq!(config.store_dir().unwrap(), PathBuf::from("/tmp/fs/store"));
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/fs/cache"));
    }

    #[test]
    fn test_interceptor_config_mirrors_fields() {
        let mut config = Config::default();
        config.cache_name = "funshiksha-v2".to_string();
        config.return_uncacheable_responses = true;
        let interceptor = config.interceptor_config();
        assert_eq!(interceptor.cache_name, "funshiksha-v2");
        assert!(interceptor.return_uncacheable_responses);
        assert_eq!(interceptor.offline_url, "/offline.html");
    }
}
