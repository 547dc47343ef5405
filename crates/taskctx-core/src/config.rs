//! Config - スケジューラの設定
//!
//! 既定スケジューラ（`ThreadPoolScheduler`）は起動時に 1 回だけ作り、
//! 投入 API へ明示的に渡します。その構築パラメータがこの設定です。
//!
//! # 読み込み順
//! 1. 既定値（`SchedulerConfig::default()`）
//! 2. JSON（`from_json_str` / `from_json_file`、省略したフィールドは既定値）
//! 3. 環境変数（`with_env_overrides`）
//! 4. `validate()`

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_WORKER_THREADS: &str = "TASKCTX_WORKER_THREADS";
pub const ENV_MAX_BLOCKING_THREADS: &str = "TASKCTX_MAX_BLOCKING_THREADS";
pub const ENV_THREAD_NAME: &str = "TASKCTX_THREAD_NAME";

const DEFAULT_MAX_BLOCKING_THREADS: usize = 512;
const DEFAULT_THREAD_NAME: &str = "taskctx-worker";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// SchedulerConfig は `ThreadPoolScheduler` の構築パラメータ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Async worker threads. Defaults to the available parallelism.
    pub worker_threads: usize,

    /// Upper bound for threads running blocking callbacks.
    pub max_blocking_threads: usize,

    /// Name given to every pool thread.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_blocking_threads: DEFAULT_MAX_BLOCKING_THREADS,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply `TASKCTX_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (tests pass a map here).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_WORKER_THREADS) {
            self.worker_threads = parse_count(ENV_WORKER_THREADS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_BLOCKING_THREADS) {
            self.max_blocking_threads = parse_count(ENV_MAX_BLOCKING_THREADS, &raw)?;
        }
        if let Some(name) = lookup(ENV_THREAD_NAME) {
            self.thread_name = name;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(invalid("worker_threads", "must be at least 1"));
        }
        if self.max_blocking_threads == 0 {
            return Err(invalid("max_blocking_threads", "must be at least 1"));
        }
        if self.thread_name.trim().is_empty() {
            return Err(invalid("thread_name", "must not be empty"));
        }
        Ok(())
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| invalid(key, &format!("{raw:?} is not a count ({e})")))
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.worker_threads >= 1);
        assert_eq!(config.max_blocking_threads, 512);
        assert_eq!(config.thread_name, "taskctx-worker");
        config.validate().unwrap();
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = SchedulerConfig::from_json_str(r#"{ "worker_threads": 3 }"#).unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.thread_name, "taskctx-worker");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SchedulerConfig::from_json_str("{ worker_threads: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SchedulerConfig::from_json_file("/nonexistent/taskctx.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn overrides_replace_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_WORKER_THREADS, "2"),
            (ENV_THREAD_NAME, "batch"),
        ]);
        let config = SchedulerConfig::default()
            .with_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.max_blocking_threads, 512);
        assert_eq!(config.thread_name, "batch");
    }

    #[test]
    fn non_numeric_override_is_rejected() {
        let err = SchedulerConfig::default()
            .with_overrides_from(|k| (k == ENV_MAX_BLOCKING_THREADS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key, .. } if key == ENV_MAX_BLOCKING_THREADS
        ));
    }

    #[test]
    fn zero_workers_fail_validation() {
        let config = SchedulerConfig {
            worker_threads: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
