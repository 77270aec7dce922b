//! Configuration for the index database, the artifact watcher, and request
//! limits.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub const DEFAULT_ARTIFACT_NAME: &str = "findex_cache.csv";
pub const MAX_SEARCH_RESULTS_CAP: usize = 10_000;

/// How the watcher learns that the artifact changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSourceKind {
   /// OS filesystem notifications.
   #[default]
   Notify,
   /// Periodic stat of the artifact.
   Poll,
}

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub database_path: Option<PathBuf>,
   pub artifact_path: Option<PathBuf>,

   pub change_source:    ChangeSourceKind,
   pub debounce_ms:      u64,
   pub poll_interval_ms: u64,
   pub sync_batch_size:  usize,

   pub request_timeout_ms: u64,
   pub max_search_results: usize,
   pub max_message_bytes:  usize,

   pub pool_max_connections: u32,
   pub busy_timeout_ms:      u64,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         database_path:        None,
         artifact_path:        None,
         change_source:        ChangeSourceKind::Notify,
         debounce_ms:          250,
         poll_interval_ms:     1000,
         sync_batch_size:      500,
         request_timeout_ms:   30_000,
         max_search_results:   200,
         max_message_bytes:    16 * 1024 * 1024,
         pool_max_connections: 8,
         busy_timeout_ms:      5000,
      }
   }
}

impl Config {
   pub fn load() -> Self {
      let config_path = ensure_global_config();

      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(config_path))
         .merge(Env::prefixed("FINDEX_").lowercase(true))
         .extract()
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   fn create_default_config(path: &Path) {
      if let Some(parent) = path.parent() {
         let _ = fs::create_dir_all(parent);
      }
      let default_config = Self::default();
      if let Ok(toml) = toml::to_string_pretty(&default_config) {
         let _ = fs::write(path, toml);
      }
   }

   /// Rejects values no component can run with.
   pub fn validate(&self) -> Result<()> {
      let nonzero = [
         ("debounce_ms", self.debounce_ms == 0),
         ("poll_interval_ms", self.poll_interval_ms == 0),
         ("sync_batch_size", self.sync_batch_size == 0),
         ("request_timeout_ms", self.request_timeout_ms == 0),
         ("max_search_results", self.max_search_results == 0),
         ("max_message_bytes", self.max_message_bytes == 0),
         ("pool_max_connections", self.pool_max_connections == 0),
      ];
      if let Some((key, _)) = nonzero.iter().find(|(_, zero)| *zero) {
         return Err(ConfigError::Invalid(format!("{key} must be greater than zero")).into());
      }
      if self.max_search_results > MAX_SEARCH_RESULTS_CAP {
         return Err(
            ConfigError::Invalid(format!(
               "max_search_results {} exceeds hard cap {}",
               self.max_search_results, MAX_SEARCH_RESULTS_CAP
            ))
            .into(),
         );
      }
      Ok(())
   }

   /// Index database location; defaults to `~/.findex/data/index.db`.
   pub fn effective_database_path(&self) -> PathBuf {
      self
         .database_path
         .clone()
         .unwrap_or_else(|| data_dir().join("index.db"))
   }

   /// Artifact location; defaults to the scanner's cache file under the user
   /// cache directory.
   pub fn effective_artifact_path(&self) -> PathBuf {
      self.artifact_path.clone().unwrap_or_else(|| {
         BaseDirs::new().map_or_else(
            || base_dir().join(DEFAULT_ARTIFACT_NAME),
            |d| d.cache_dir().join(DEFAULT_ARTIFACT_NAME),
         )
      })
   }

   pub fn debounce(&self) -> Duration {
      Duration::from_millis(self.debounce_ms)
   }

   pub fn poll_interval(&self) -> Duration {
      Duration::from_millis(self.poll_interval_ms)
   }

   pub fn request_timeout(&self) -> Duration {
      Duration::from_millis(self.request_timeout_ms)
   }

   pub fn busy_timeout(&self) -> Duration {
      Duration::from_millis(self.busy_timeout_ms)
   }

   pub fn effective_max_search_results(&self) -> usize {
      self.max_search_results.clamp(1, MAX_SEARCH_RESULTS_CAP)
   }
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Returns the base directory for findex data and configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".findex"))
}

fn ensure_global_config() -> PathBuf {
   let config_path = config_file_path();
   if !config_path.exists() {
      Config::create_default_config(config_path);
   }
   config_path.clone()
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}

macro_rules! define_paths {
   ($($fn_name:ident: $path:literal),* $(,)?) => {
      $(
         pub fn $fn_name() -> &'static PathBuf {
            static ONCE: OnceLock<PathBuf> = OnceLock::new();
            ONCE.get_or_init(|| base_dir().join($path))
         }
      )*
   };
}

define_paths! {
   config_file_path: "config.toml",
   data_dir: "data",
   socket_dir: "sockets",
}
