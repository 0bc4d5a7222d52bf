use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const MAX_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default = "default_network_targets")]
    pub network_targets: Vec<TcpCheckConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,
    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,
    #[serde(default = "default_disk_percent")]
    pub disk_percent: f64,
}

/// Per-probe limits for external commands, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_command_ms")]
    pub command_ms: u64,
    #[serde(default = "default_interfaces_ms")]
    pub interfaces_ms: u64,
    #[serde(default = "default_processes_ms")]
    pub processes_ms: u64,
    #[serde(default = "default_packages_ms")]
    pub packages_ms: u64,
    #[serde(default = "default_logins_ms")]
    pub logins_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpCheckConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_command_ms")]
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            log_dir: default_log_dir(),
            thresholds: ThresholdsConfig::default(),
            timeouts: TimeoutsConfig::default(),
            network_targets: default_network_targets(),
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            cpu_percent: default_cpu_percent(),
            memory_percent: default_memory_percent(),
            disk_percent: default_disk_percent(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            command_ms: default_command_ms(),
            interfaces_ms: default_interfaces_ms(),
            processes_ms: default_processes_ms(),
            packages_ms: default_packages_ms(),
            logins_ms: default_logins_ms(),
        }
    }
}

impl TimeoutsConfig {
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    pub fn interfaces(&self) -> Duration {
        Duration::from_millis(self.interfaces_ms)
    }

    pub fn processes(&self) -> Duration {
        Duration::from_millis(self.processes_ms)
    }

    pub fn packages(&self) -> Duration {
        Duration::from_millis(self.packages_ms)
    }

    pub fn logins(&self) -> Duration {
        Duration::from_millis(self.logins_ms)
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
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
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

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "поле report_dir не должно быть пустым".to_string(),
            ));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "поле log_dir не должно быть пустым".to_string(),
            ));
        }

        validate_thresholds(&self.thresholds)?;
        validate_timeouts(&self.timeouts)?;
        validate_tcp_checks(&self.network_targets)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_thresholds(cfg: &ThresholdsConfig) -> Result<(), ConfigError> {
    let fields = [
        ("thresholds.cpu_percent", cfg.cpu_percent),
        ("thresholds.memory_percent", cfg.memory_percent),
        ("thresholds.disk_percent", cfg.disk_percent),
    ];
    for (name, value) in fields {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{name} должно быть в диапазоне 0..100"
            )));
        }
    }
    Ok(())
}

fn validate_timeouts(cfg: &TimeoutsConfig) -> Result<(), ConfigError> {
    let fields = [
        ("timeouts.command_ms", cfg.command_ms),
        ("timeouts.interfaces_ms", cfg.interfaces_ms),
        ("timeouts.processes_ms", cfg.processes_ms),
        ("timeouts.packages_ms", cfg.packages_ms),
        ("timeouts.logins_ms", cfg.logins_ms),
    ];
    for (name, value) in fields {
        if !(1..=MAX_TIMEOUT_MS).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{name} должно быть в диапазоне 1..{MAX_TIMEOUT_MS}"
            )));
        }
    }
    Ok(())
}

fn validate_tcp_checks(checks: &[TcpCheckConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for check in checks {
        if check.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "network_targets[*].name не должен быть пустым".to_string(),
            ));
        }
        if !names.insert(check.name.clone()) {
            return Err(ConfigError::Validation(format!(
                "имя сетевой цели '{}' должно быть уникальным",
                check.name
            )));
        }
        if check.host.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "network_targets '{}' host не должен быть пустым",
                check.name
            )));
        }
        if check.port == 0 {
            return Err(ConfigError::Validation(format!(
                "network_targets '{}' port должен быть в диапазоне 1..65535",
                check.name
            )));
        }
        if !(1..=MAX_TIMEOUT_MS).contains(&check.timeout_ms) {
            return Err(ConfigError::Validation(format!(
                "network_targets '{}' timeout_ms должен быть в диапазоне 1..{MAX_TIMEOUT_MS}",
                check.name
            )));
        }
    }
    Ok(())
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("./reports")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_network_targets() -> Vec<TcpCheckConfig> {
    vec![
        TcpCheckConfig {
            name: "Google DNS".to_string(),
            host: "8.8.8.8".to_string(),
            port: 53,
            timeout_ms: default_command_ms(),
        },
        TcpCheckConfig {
            name: "Cloudflare DNS".to_string(),
            host: "1.1.1.1".to_string(),
            port: 53,
            timeout_ms: default_command_ms(),
        },
    ]
}

const fn default_cpu_percent() -> f64 {
    80.0
}

const fn default_memory_percent() -> f64 {
    85.0
}

const fn default_disk_percent() -> f64 {
    80.0
}

const fn default_command_ms() -> u64 {
    2000
}

const fn default_interfaces_ms() -> u64 {
    5000
}

const fn default_processes_ms() -> u64 {
    5000
}

const fn default_packages_ms() -> u64 {
    30_000
}

const fn default_logins_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("конфигурация по умолчанию должна быть валидной");
        assert_eq!(cfg.thresholds.cpu_percent, 80.0);
        assert_eq!(cfg.thresholds.memory_percent, 85.0);
        assert_eq!(cfg.thresholds.disk_percent, 80.0);
        assert_eq!(cfg.network_targets.len(), 2);
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("разбор примера");
        cfg.validate().expect("пример должен быть валидным");
        assert_eq!(cfg.timeouts.packages_ms, 30_000);
        assert_eq!(cfg.network_targets[1].host, "1.1.1.1");
    }

    #[test]
    fn empty_yaml_falls_back_to_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").expect("разбор пустого конфига");
        cfg.validate().expect("пустой конфиг должен быть валидным");
        assert_eq!(cfg.report_dir, PathBuf::from("./reports"));
        assert_eq!(cfg.timeouts.command(), Duration::from_secs(2));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut cfg = Config::default();
        cfg.thresholds.memory_percent = 120.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        cfg.thresholds.memory_percent = f64::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn timeout_limits_are_enforced() {
        let mut cfg = Config::default();
        cfg.timeouts.packages_ms = 0;
        assert!(cfg.validate().is_err());

        cfg.timeouts.packages_ms = 60_001;
        assert!(cfg.validate().is_err());

        cfg.timeouts.packages_ms = 60_000;
        cfg.validate().expect("60 секунд допустимо");
    }

    #[test]
    fn duplicate_target_names_are_rejected() {
        let mut cfg = Config::default();
        cfg.network_targets[1].name = cfg.network_targets[0].name.clone();
        let err = cfg.validate().expect_err("дубликат имени");
        assert!(err.to_string().contains("уникальным"));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = Config::load_from_file("/nonexistent/sysreport.yaml").expect_err("файла нет");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
