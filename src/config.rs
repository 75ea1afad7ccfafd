//! Runtime settings.
//!
//! Layered with the `config` crate: built-in defaults, then `stopbot.toml`
//! (or an explicit file), then `STOPBOT_*` environment variables, e.g.
//! `STOPBOT_STORE__BACKEND=redis`.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::persistence::{JsonFileStore, MemoryStore, OrderStore, RedisOrderStore};

/// Where orders are persisted
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Redis,
    /// Nothing survives the process; useful for dry runs
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// JSON file for the `file` backend
    pub path: PathBuf,
    pub redis_url: String,
    pub redis_key: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    pub tick_interval_ms: u64,
    pub steps: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
    pub store: StoreSettings,
    pub simulation: SimulationSettings,
}

impl Settings {
    /// Load settings, reading `path` if given or `stopbot.toml` if present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("log_filter", "stopbot=info")?
            .set_default("store.backend", "file")?
            .set_default("store.path", "orders.json")?
            .set_default("store.redis_url", "redis://127.0.0.1:6379")?
            .set_default("store.redis_key", "stopbot:orders")?
            .set_default("store.connect_timeout_secs", 5_i64)?
            .set_default("simulation.tick_interval_ms", 1000_i64)?
            .set_default("simulation.steps", 30_i64)?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("stopbot").required(false)),
        };

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("STOPBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.store.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "store.connect_timeout_secs must be positive".to_string(),
            ));
        }
        if self.simulation.steps == 0 {
            return Err(Error::Config("simulation.steps must be positive".to_string()));
        }
        if self.store.backend == StoreBackend::File && self.store.path.as_os_str().is_empty() {
            return Err(Error::Config("store.path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.store.connect_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.simulation.tick_interval_ms)
    }

    /// Open the configured backend
    pub fn open_store(&self) -> Result<Box<dyn OrderStore>> {
        let store: Box<dyn OrderStore> = match self.store.backend {
            StoreBackend::File => {
                tracing::info!("Using order file {}", self.store.path.display());
                Box::new(JsonFileStore::new(&self.store.path))
            }
            StoreBackend::Redis => Box::new(RedisOrderStore::new(
                &self.store.redis_url,
                self.store.redis_key.clone(),
                self.connect_timeout(),
            )?),
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory order store, nothing will be persisted");
                Box::new(MemoryStore::new())
            }
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stopbot.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults_fill_missing_keys() {
        let (_dir, path) = write_config("");
        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.store.redis_key, "stopbot:orders");
        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.simulation.seed, None);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let (_dir, path) = write_config(
            r#"
log_filter = "stopbot=debug"

[store]
backend = "memory"
path = "/var/lib/stopbot/orders.json"

[simulation]
tick_interval_ms = 250
steps = 20
seed = 42
"#,
        );
        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.log_filter, "stopbot=debug");
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(
            settings.store.path,
            PathBuf::from("/var/lib/stopbot/orders.json")
        );
        assert_eq!(settings.tick_interval(), Duration::from_millis(250));
        assert_eq!(settings.simulation.steps, 20);
        assert_eq!(settings.simulation.seed, Some(42));
    }

    #[test]
    fn test_rejects_zero_steps() {
        let (_dir, path) = write_config("[simulation]\nsteps = 0\n");
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let (_dir, path) = write_config("[store]\nbackend = \"sqlite\"\n");
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Settings::load(Some(Path::new("/nonexistent/stopbot.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_open_memory_store() {
        let (_dir, path) = write_config("[store]\nbackend = \"memory\"\n");
        let settings = Settings::load(Some(&path)).unwrap();

        let store = settings.open_store().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
