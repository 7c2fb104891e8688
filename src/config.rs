use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_name")]
    pub name: String,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_enabled")]
    pub enabled: bool,
    #[serde(default = "default_dashboard_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_enabled")]
    pub enable_cpu: bool,
    #[serde(default = "default_enabled")]
    pub enable_memory: bool,
    #[serde(default = "default_enabled")]
    pub enable_disk: bool,
    #[serde(default = "default_enabled")]
    pub enable_network: bool,
    #[serde(default = "default_cpu_sample_ms")]
    pub cpu_sample_ms: u64,
    #[serde(default)]
    pub disk_path: Option<PathBuf>,
    #[serde(default)]
    pub network: NetworkScope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NetworkScope {
    #[default]
    Total,
    Interface { name: String },
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            name: default_daemon_name(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_dashboard_enabled(),
            listen: default_dashboard_listen(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            enable_cpu: true,
            enable_memory: true,
            enable_disk: true,
            enable_network: true,
            cpu_sample_ms: default_cpu_sample_ms(),
            disk_path: None,
            network: NetworkScope::default(),
        }
    }
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_ms)
    }
}

impl DaemonConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("не удалось сериализовать конфигурацию: {0}")]
    Serialize(#[source] serde_yaml::Error),
    #[error("не удалось записать файл конфигурации {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

impl Config {
    /// Parses only; callers run [`Config::validate`] once overrides are applied.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        Ok(cfg)
    }

    /// Like [`Config::load_from_file`], but a missing file yields the defaults.
    /// The boolean is `true` when the file was actually read.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<(Self, bool), ConfigError> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            return Ok((Self::default(), false));
        }
        Self::load_from_file(path_ref).map(|cfg| (cfg, true))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        if let Some(dir) = path_ref.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: path_display.clone(),
                source,
            })?;
        }

        let text = serde_yaml::to_string(self).map_err(ConfigError::Serialize)?;
        fs::write(path_ref, text).map_err(|source| ConfigError::Write {
            path: path_display,
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_daemon(&self.daemon)?;
        validate_dashboard(&self.dashboard)?;
        validate_logging(&self.logging)?;
        validate_metrics(&self.metrics)?;
        Ok(())
    }

    pub fn dashboard_addr(&self) -> Result<SocketAddr, ConfigError> {
        SocketAddr::from_str(self.dashboard.listen.trim()).map_err(|_| {
            ConfigError::Validation(
                "dashboard.listen должно быть корректным адресом host:port".to_string(),
            )
        })
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_daemon(cfg: &DaemonConfig) -> Result<(), ConfigError> {
    if cfg.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "daemon.name не должен быть пустым".to_string(),
        ));
    }
    if !(1..=300).contains(&cfg.shutdown_timeout_secs) {
        return Err(ConfigError::Validation(format!(
            "daemon.shutdown_timeout_secs недопустимо: {} (должно быть в диапазоне 1..300)",
            cfg.shutdown_timeout_secs
        )));
    }
    Ok(())
}

fn validate_dashboard(cfg: &DashboardConfig) -> Result<(), ConfigError> {
    if cfg.listen.trim().is_empty() {
        return Err(ConfigError::Validation(
            "поле dashboard.listen обязательно".to_string(),
        ));
    }
    let addr = SocketAddr::from_str(cfg.listen.trim()).map_err(|_| {
        ConfigError::Validation(
            "dashboard.listen должно быть корректным адресом host:port".to_string(),
        )
    })?;
    if addr.port() < 1024 {
        return Err(ConfigError::Validation(format!(
            "порт dashboard недопустим: {} (должен быть в диапазоне 1024..65535)",
            addr.port()
        )));
    }
    Ok(())
}

fn validate_logging(cfg: &LoggingConfig) -> Result<(), ConfigError> {
    if !LOG_LEVELS.contains(&cfg.level.as_str()) {
        return Err(ConfigError::Validation(format!(
            "недопустимый logging.level: {} (ожидается debug, info, warn или error)",
            cfg.level
        )));
    }
    Ok(())
}

fn validate_metrics(cfg: &MetricsConfig) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&cfg.interval_secs) {
        return Err(ConfigError::Validation(format!(
            "metrics.interval_secs недопустимо: {} (должно быть в диапазоне 1..3600)",
            cfg.interval_secs
        )));
    }
    // A sample must fit inside the shortest interval.
    if !(100..=1000).contains(&cfg.cpu_sample_ms) {
        return Err(ConfigError::Validation(format!(
            "metrics.cpu_sample_ms недопустимо: {} (должно быть в диапазоне 100..1000)",
            cfg.cpu_sample_ms
        )));
    }
    if let Some(path) = &cfg.disk_path {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "metrics.disk_path не должен быть пустым".to_string(),
            ));
        }
    }
    if let NetworkScope::Interface { name } = &cfg.network {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "metrics.network.name обязателен в режиме interface".to_string(),
            ));
        }
    }
    Ok(())
}

fn default_daemon_name() -> String {
    "syswatchd".to_string()
}

const fn default_shutdown_timeout_secs() -> u64 {
    5
}

const fn default_dashboard_enabled() -> bool {
    true
}

fn default_dashboard_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_interval_secs() -> u64 {
    5
}

const fn default_enabled() -> bool {
    true
}

const fn default_cpu_sample_ms() -> u64 {
    1000
}
