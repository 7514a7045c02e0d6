use std::{env, fs, time::Duration};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub workers: usize,
    pub poll_interval_ms: u64,
    /// Upper bound for a single target's scan; 0 disables it.
    pub scan_timeout_secs: u64,
    pub nmap_path: String,
}

impl AppConfig {
    /// Read the JSON file named by `VULNSCAN_CONFIG` (default `config.json`)
    /// if it exists, then apply `VS_*` environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var("VULNSCAN_CONFIG").unwrap_or_else(|_| "config.json".to_string());
        let mut cfg = Self::from_file(&path)?.unwrap_or_default();
        cfg.apply_env(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(path: &str) -> anyhow::Result<Option<Self>> {
        fs::read_to_string(path)
            .ok()
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .with_context(|| format!("failed to parse {path}"))
    }

    /// Unparseable numbers keep the previous value.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("VS_HOST") {
            self.host = v;
        }
        if let Some(v) = var("VS_PORT") {
            self.port = v.parse().unwrap_or(self.port);
        }
        if let Some(v) = var("VS_DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = var("VS_WORKERS") {
            self.workers = v.parse().unwrap_or(self.workers);
        }
        if let Some(v) = var("VS_POLL_INTERVAL_MS") {
            self.poll_interval_ms = v.parse().unwrap_or(self.poll_interval_ms);
        }
        if let Some(v) = var("VS_SCAN_TIMEOUT_SECS") {
            self.scan_timeout_secs = v.parse().unwrap_or(self.scan_timeout_secs);
        }
        if let Some(v) = var("VS_NMAP_PATH") {
            self.nmap_path = v;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        (self.scan_timeout_secs > 0).then(|| Duration::from_secs(self.scan_timeout_secs))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite://vulnscan.db".to_string(),
            workers: 1,
            poll_interval_ms: 2000,
            scan_timeout_secs: 0,
            nmap_path: "nmap".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_local_and_unbounded() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
        assert_eq!(cfg.scan_timeout(), None);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(vars(&[
            ("VS_PORT", "9090"),
            ("VS_WORKERS", "4"),
            ("VS_SCAN_TIMEOUT_SECS", "600"),
            ("VS_NMAP_PATH", "/usr/local/bin/nmap"),
        ]));

        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.scan_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(cfg.nmap_path, "/usr/local/bin/nmap");
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn malformed_env_value_keeps_previous() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(vars(&[("VS_PORT", "eighty"), ("VS_WORKERS", "-1")]));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.workers, 1);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cfg = AppConfig {
            workers: 0,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 7000, "workers": 2}}"#).unwrap();

        let cfg = AppConfig::from_file(file.path().to_str().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.database_url, "sqlite://vulnscan.db");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        assert!(AppConfig::from_file("/nonexistent/vulnscan.json")
            .unwrap()
            .is_none());
    }
}
