use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::frame::HEADER_LEN;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BufferConfig {
    /// Requested element count; the byte capacity is rounded up to a
    /// power of two.
    pub capacity: usize,
    pub element_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            element_size: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    /// Payload length bounds, drawn uniformly per frame.
    pub min_payload: usize,
    pub max_payload: usize,
    /// Backoff sleep between retries when the buffer is full/empty.
    pub poll_interval_us: u64,
    /// Statistics line cadence; 0 disables reporting.
    pub report_interval_secs: u64,
    /// Stop the producer after this many frames; unlimited when absent.
    pub max_frames: Option<u64>,
    /// Stop the whole run after this many seconds; runs until Ctrl-C
    /// when absent.
    pub duration_secs: Option<u64>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            min_payload: 128,
            max_payload: 192,
            poll_interval_us: 500,
            report_interval_secs: 1,
            max_frames: None,
            duration_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Required for `kind = "file"`.
    pub path: Option<String>,
    /// Fixed seed for reproducible traffic; drawn from the OS when absent.
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Random,
            path: None,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Random,
    File,
}

/// Load and validate the harness configuration.
///
/// `None` yields the built-in defaults; a path must exist and parse.
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let cfg = match path {
        None => Config::default(),
        Some(path) => {
            if !Path::new(path).exists() {
                return Err(format!("Config file not found: {}", path).into());
            }
            let content = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;
            let cfg: Config = toml::from_str(&content)
                .map_err(|e| format!("Failed to parse TOML config {}: {}", path, e))?;
            log::info!("Config loaded from: {}", path);
            cfg
        }
    };
    validate(cfg)
}

fn validate(cfg: Config) -> Result<Config, Box<dyn std::error::Error>> {
    if cfg.buffer.capacity == 0 || cfg.buffer.element_size == 0 {
        return Err("buffer capacity and element_size must be positive".into());
    }
    if cfg.traffic.min_payload == 0 {
        return Err("min_payload must be at least 1".into());
    }
    if cfg.traffic.min_payload > cfg.traffic.max_payload {
        return Err(format!(
            "min_payload {} exceeds max_payload {}",
            cfg.traffic.min_payload, cfg.traffic.max_payload
        )
        .into());
    }
    if cfg.traffic.max_payload > u16::MAX as usize {
        return Err("max_payload does not fit the frame header length field".into());
    }
    if cfg.source.kind == SourceKind::File && cfg.source.path.is_none() {
        return Err("source kind \"file\" requires a path".into());
    }

    // A frame larger than the buffer still flows through the retry loops,
    // just with more churn.
    let largest_frame = HEADER_LEN + cfg.traffic.max_payload;
    if let Some(capacity_bytes) = cfg
        .buffer
        .capacity
        .checked_mul(cfg.buffer.element_size)
        .and_then(usize::checked_next_power_of_two)
    {
        if largest_frame > capacity_bytes {
            log::warn!(
                "largest frame ({} bytes) exceeds buffer capacity ({} bytes); expect retry churn",
                largest_frame,
                capacity_bytes
            );
        }
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.buffer.capacity, 256);
        assert_eq!(cfg.buffer.element_size, 1);
        assert_eq!(cfg.traffic.min_payload, 128);
        assert_eq!(cfg.traffic.max_payload, 192);
        assert_eq!(cfg.source.kind, SourceKind::Random);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [buffer]
            capacity = 1024

            [source]
            kind = "file"
            path = "/dev/urandom"
            "#,
        )
        .unwrap();
        let cfg = validate(cfg).unwrap();
        assert_eq!(cfg.buffer.capacity, 1024);
        assert_eq!(cfg.buffer.element_size, 1);
        assert_eq!(cfg.source.kind, SourceKind::File);
        assert_eq!(cfg.source.path.as_deref(), Some("/dev/urandom"));
    }

    #[test]
    fn rejects_inverted_payload_bounds() {
        let mut cfg = Config::default();
        cfg.traffic.min_payload = 64;
        cfg.traffic.max_payload = 32;
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut cfg = Config::default();
        cfg.traffic.max_payload = u16::MAX as usize + 1;
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn file_kind_requires_path() {
        let mut cfg = Config::default();
        cfg.source.kind = SourceKind::File;
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(load_config(Some("/nonexistent/bytering.toml")).is_err());
    }
}
