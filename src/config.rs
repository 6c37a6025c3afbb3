use std::{path::PathBuf, time::Duration};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TEMP_DIR: &str = "temp_downloads";
const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 5 * 60;
const DEFAULT_RETENTION_SECONDS: u64 = 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 5 * 60;
pub const MAX_TITLE_CHARS: usize = 100;

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub temp_dir: PathBuf,
    pub yt_dlp_bin: String,
    pub max_concurrent_downloads: usize,
    pub request_timeout: Duration,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub title_max_chars: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            yt_dlp_bin: DEFAULT_YT_DLP_BIN.to_string(),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECONDS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
            title_max_chars: MAX_TITLE_CHARS,
            allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source. Values that are
    /// missing or fail to parse keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read_u64 = |name: &str| {
            lookup(name).and_then(|value| value.trim().parse::<u64>().ok())
        };
        let read_usize = |name: &str| {
            lookup(name).and_then(|value| value.trim().parse::<usize>().ok())
        };

        Self {
            bind_addr: resolve_bind_addr(&lookup),
            temp_dir: lookup("TEMP_DIR")
                .as_deref()
                .and_then(non_empty)
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            yt_dlp_bin: lookup("YT_DLP_BIN")
                .as_deref()
                .and_then(non_empty)
                .map(ToString::to_string)
                .unwrap_or(defaults.yt_dlp_bin),
            max_concurrent_downloads: read_usize("MAX_CONCURRENT_DOWNLOADS")
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_concurrent_downloads),
            request_timeout: read_u64("REQUEST_TIMEOUT_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            retention: read_u64("RETENTION_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
            sweep_interval: read_u64("SWEEP_INTERVAL_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            title_max_chars: read_usize("TITLE_MAX_CHARS")
                .map(|value| value.clamp(1, MAX_TITLE_CHARS))
                .unwrap_or(defaults.title_max_chars),
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn resolve_bind_addr(lookup: &impl Fn(&str) -> Option<String>) -> String {
    if let Some(configured) = lookup("APP_ADDR")
        .as_deref()
        .and_then(non_empty)
        .map(ToString::to_string)
    {
        return configured;
    }

    let port = lookup("PORT")
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    format!("0.0.0.0:{port}")
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.temp_dir, PathBuf::from("temp_downloads"));
        assert_eq!(config.yt_dlp_bin, "yt-dlp");
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.retention, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.title_max_chars, 100);
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn port_selects_bind_port_on_all_interfaces() {
        let config = config_from(&[("PORT", "8080")]);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn app_addr_wins_over_port() {
        let config = config_from(&[("PORT", "8080"), ("APP_ADDR", "127.0.0.1:9000")]);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("MAX_CONCURRENT_DOWNLOADS", "0"),
            ("REQUEST_TIMEOUT_SECONDS", "soon"),
            ("TEMP_DIR", "   "),
            ("RETENTION_SECONDS", "0"),
            ("SWEEP_INTERVAL_SECONDS", "0"),
        ]);
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert_eq!(config.temp_dir, PathBuf::from("temp_downloads"));
        assert_eq!(config.retention, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn title_cap_is_clamped() {
        assert_eq!(config_from(&[("TITLE_MAX_CHARS", "500")]).title_max_chars, 100);
        assert_eq!(config_from(&[("TITLE_MAX_CHARS", "0")]).title_max_chars, 1);
        assert_eq!(config_from(&[("TITLE_MAX_CHARS", "50")]).title_max_chars, 50);
    }

    #[test]
    fn allowed_origins_are_split_and_trimmed() {
        let config = config_from(&[(
            "ALLOWED_ORIGINS",
            " https://a.example , ,http://localhost:5173",
        )]);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "http://localhost:5173"]
        );
    }
}
