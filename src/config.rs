use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReverieConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub scoring: ScoringConfig,
    pub graph: GraphConfig,
    pub dream: DreamConfig,
    pub coordination: CoordinationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub default_context: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

/// Knobs for the hybrid relevance score. Weights must be non-negative and
/// sum to 1.0; validated by [`crate::scoring::ScoreWeights::validated`].
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    pub weight_vector: f64,
    pub weight_recency: f64,
    pub weight_frequency: f64,
    pub weight_frustration: f64,
    pub recency_half_life_days: f64,
    pub frequency_saturation: u64,
    pub default_max_results: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraphConfig {
    pub max_per_axis: usize,
    pub max_depth: usize,
    pub max_findings: usize,
    pub link_similarity: f64,
    pub contradiction_similarity: f64,
    pub stale_days: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DreamConfig {
    pub dedup_similarity: f64,
    pub rescue_floor: f64,
    pub min_cluster_size: usize,
    pub cohesion_floor: f64,
    pub max_backups: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Bounded wait for the store write lock, in seconds.
    pub lock_timeout_secs: u64,
    /// Bounded wait for the shared-server management lock, in seconds.
    pub server_lock_timeout_secs: u64,
}

impl Default for ReverieConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            scoring: ScoringConfig::default(),
            graph: GraphConfig::default(),
            dream: DreamConfig::default(),
            coordination: CoordinationConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_reverie_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            default_context: "default".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_reverie_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_vector: 0.50,
            weight_recency: 0.20,
            weight_frequency: 0.15,
            weight_frustration: 0.15,
            recency_half_life_days: 30.0,
            frequency_saturation: 100,
            default_max_results: 5,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_per_axis: 5,
            max_depth: 10,
            max_findings: 10,
            link_similarity: 0.70,
            contradiction_similarity: 0.70,
            stale_days: 90,
        }
    }
}

impl Default for DreamConfig {
    fn default() -> Self {
        Self {
            dedup_similarity: 0.95,
            rescue_floor: 0.50,
            min_cluster_size: 3,
            cohesion_floor: 0.5,
            max_backups: 3,
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 5,
            server_lock_timeout_secs: 30,
        }
    }
}

/// Returns `~/.reverie/`
pub fn default_reverie_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".reverie")
}

/// Returns the default config file path: `~/.reverie/config.toml`
pub fn default_config_path() -> PathBuf {
    default_reverie_dir().join("config.toml")
}

impl ReverieConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ReverieConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (REVERIE_DB, REVERIE_CONTEXT, REVERIE_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("REVERIE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("REVERIE_CONTEXT") {
            self.storage.default_context = val;
        }
        if let Ok(val) = std::env::var("REVERIE_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Directory holding coordination state (lock, marker files, logs, backups).
    /// Sits next to the database so everything is keyed to the store location.
    pub fn data_dir(&self) -> PathBuf {
        self.resolved_db_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(default_reverie_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
