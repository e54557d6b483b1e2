use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;
use tracing::info;

pub struct ConfigLoader;

impl ConfigLoader {
    const ENV_PREFIX: &'static str = "HEDGER_";

    /// Loads configuration from `config/Config.toml`, `HEDGER_*` environment
    /// variables and `config/Config.json`, then validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Same as [`ConfigLoader::load`] with an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        config.validate()?;
        info!(
            path = %path.display(),
            instruments = config.instruments.len(),
            positions = config.positions.len(),
            "Loaded config"
        );
        Ok(config)
    }

    /// Loads configuration layered with `config/Config.{profile}.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .join(Json::file("config/Config.json"))
            .extract()
            .with_context(|| format!("Failed to load config profile {profile}"))?;
        config.validate()?;
        info!(profile, instruments = config.instruments.len(), "Loaded config");
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .join(Json::file("config/Config.json"))
    }
}
