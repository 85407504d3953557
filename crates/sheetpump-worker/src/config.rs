use std::env;
use std::path::PathBuf;

/// Worker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Attempts per chunk job
    pub tries: u32,
    /// JSON engine configuration; environment overrides are used when unset
    pub engine_config: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            tries: 1,
            engine_config: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let workers = match env::var("SHEETPUMP_WORKERS") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.workers,
        };
        let tries = match env::var("SHEETPUMP_TRIES") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.tries,
        };
        let engine_config = env::var("SHEETPUMP_CONFIG").ok().map(PathBuf::from);

        if workers == 0 {
            anyhow::bail!("SHEETPUMP_WORKERS must be at least 1");
        }

        Ok(Self {
            workers,
            tries,
            engine_config,
        })
    }

    pub fn load_engine_config(&self) -> anyhow::Result<sheetpump::Config> {
        match &self.engine_config {
            Some(path) => Ok(sheetpump::Config::from_path(path)?),
            None => sheetpump::Config::from_env(),
        }
    }
}
