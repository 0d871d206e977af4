//! Persistent runtime configuration model and defaults.

use std::path::{Path, PathBuf};

use log::warn;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub preferences: Preferences,
}

/// Backend API connection settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
}

/// Stored viewer playback preferences.
///
/// Navigation URLs forward the matching query parameters only when a page's
/// values diverge from these, so the values are kept in the same string
/// form the parameters use.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Preferences {
    #[serde(default)]
    pub autoplay: bool,
    /// Keep playing through the playlist when a track ends.
    #[serde(default)]
    pub continue_autoplay: bool,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_speed")]
    pub speed: String,
    #[serde(default = "default_local")]
    pub local: String,
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            fetch_retries: default_fetch_retries(),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            autoplay: false,
            continue_autoplay: false,
            listen: default_listen(),
            speed: default_speed(),
            local: default_local(),
            locale: default_locale(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.xamh.de".to_string()
}

fn default_fetch_retries() -> u32 {
    5
}

fn default_listen() -> String {
    "0".to_string()
}

fn default_speed() -> String {
    "1.0".to_string()
}

fn default_local() -> String {
    "0".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("vidqueue")
        .join("config.toml")
}

/// Loads the configuration, falling back to defaults when the file is
/// missing or does not parse.
pub fn load_config(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            log::info!(
                "No config file at {} ({}). Using defaults.",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

pub fn persist_config(config: &Config, path: &Path) {
    let Ok(config_text) = toml::to_string(config) else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            warn!("Could not create config directory {}: {}", parent.display(), err);
        }
    }
    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: Config = toml::from_str("").expect("empty config parses");
        assert_eq!(config.api.fetch_retries, 5);
        assert_eq!(config.preferences.speed, "1.0");
        assert!(!config.preferences.autoplay);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            "[preferences]\nautoplay = true\nlocale = \"de-DE\"\n",
        )
        .expect("partial config parses");
        assert!(config.preferences.autoplay);
        assert_eq!(config.preferences.locale, "de-DE");
        assert_eq!(config.preferences.listen, "0");
        assert_eq!(config.api.base_url, default_api_base());
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let mut config = Config::default();
        config.preferences.continue_autoplay = true;
        config.api.fetch_retries = 2;
        let text = toml::to_string(&config).expect("serializes");
        let parsed: Config = toml::from_str(&text).expect("parses back");
        assert_eq!(parsed, config);
    }
}
