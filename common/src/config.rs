//! Configuration – environment variables, optionally layered over a
//! `KEY=VALUE` file.
//!
//! The file uses the same syntax as the environment (`URL=http://…`), so a
//! docker `env_file` can be handed to the binary unchanged.  Environment
//! variables always win over the file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use url::Url;

/// Every key the capture daemon understands.
pub const KEYS: &[&str] = &[
    "URL",
    "OUTPUT",
    "IMAGETYPE",
    "INTERVAL",
    "NAME",
    "EXTRA_TAGS",
    "TELEGRAF_HOST",
    "REQUEST_TIMEOUT",
    "MAX_CONSECUTIVE_FAILURES",
];

const JPEG_IMAGE_TYPES: &[&str] = &["jpeg", "jpg", "JPG", "JPEG"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is required but not set")]
    Missing { key: &'static str },

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid EXTRA_TAGS: {0}")]
    ExtraTags(String),

    #[error("cannot determine host name: {0}")]
    Hostname(String),
}

/// Encoded format written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Tiff,
}

impl OutputFormat {
    /// Map the `IMAGETYPE` setting; only the JPEG spellings select JPEG.
    pub fn from_image_type(value: Option<&str>) -> Self {
        match value {
            Some(v) if JPEG_IMAGE_TYPES.contains(&v) => Self::Jpeg,
            _ => Self::Tiff,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Tiff => "tiff",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jpeg => f.write_str("JPEG"),
            Self::Tiff => f.write_str("TIFF"),
        }
    }
}

/// Process-wide capture settings, built once at startup and only read
/// afterwards.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    // ── source ───────────────────────────────────────────────────────
    pub url: Url,
    pub request_timeout: Duration,

    // ── output ───────────────────────────────────────────────────────
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub name: String,

    // ── schedule ─────────────────────────────────────────────────────
    pub interval: Duration,
    /// Abort after this many hard failures in a row; `0` never aborts.
    pub max_consecutive_failures: u32,

    // ── metrics ──────────────────────────────────────────────────────
    pub telegraf_host: String,
    pub extra_tags: BTreeMap<String, String>,
}

impl CaptureConfig {
    /// Host portion of the source URL, including an explicit port.
    pub fn ip_address(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

/// Load the configuration from the optional file plus the environment.
pub fn load(path: Option<&Path>) -> Result<CaptureConfig> {
    let mut map = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read config: {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            parse_conf(&text)
        }
        None => HashMap::new(),
    };

    for key in KEYS {
        if let Ok(value) = std::env::var(key) {
            map.insert(key.to_string(), value);
        }
    }

    Ok(from_map(&map)?)
}

/// Build a [`CaptureConfig`] from already-collected key/value pairs.
///
/// Empty values are treated as unset.
pub fn from_map(map: &HashMap<String, String>) -> Result<CaptureConfig, ConfigError> {
    let get = |key: &str| -> Option<String> {
        map.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    };
    let get_duration = |key: &'static str, default: &str| -> Result<Duration, ConfigError> {
        let value = get(key).unwrap_or_else(|| default.to_string());
        parse_duration(&value).map_err(|reason| ConfigError::Invalid { key, value, reason })
    };

    let raw_url = get("URL").ok_or(ConfigError::Missing { key: "URL" })?;
    let url = parse_source_url(&raw_url).map_err(|reason| ConfigError::Invalid {
        key: "URL",
        value: raw_url.clone(),
        reason,
    })?;

    let name = match get("NAME") {
        Some(name) => name,
        None => hostname()?,
    };

    let max_consecutive_failures = match get("MAX_CONSECUTIVE_FAILURES") {
        Some(value) => value.parse::<u32>().map_err(|e| ConfigError::Invalid {
            key: "MAX_CONSECUTIVE_FAILURES",
            value: value.clone(),
            reason: format!("{e}"),
        })?,
        None => 0,
    };

    Ok(CaptureConfig {
        url,
        request_timeout: get_duration("REQUEST_TIMEOUT", "60s")?,
        output_dir: PathBuf::from(get("OUTPUT").unwrap_or_else(|| "/data".into())),
        output_format: OutputFormat::from_image_type(get("IMAGETYPE").as_deref()),
        name,
        interval: get_duration("INTERVAL", "10m")?,
        max_consecutive_failures,
        telegraf_host: get("TELEGRAF_HOST").unwrap_or_else(|| "telegraf:8092".into()),
        extra_tags: parse_extra_tags(get("EXTRA_TAGS").as_deref().unwrap_or_default())?,
    })
}

fn parse_source_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".into());
    }
    Ok(url)
}

/// Parse `key=value` pairs separated by commas into a tag map.
///
/// Either every pair parses or nothing is returned.
pub fn parse_extra_tags(text: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut tags = BTreeMap::new();
    if text.trim().is_empty() {
        return Ok(tags);
    }

    for pair in text.split(',') {
        let pair = pair.trim();
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() && !v.contains('=') => (k.trim(), v.trim()),
            _ => {
                return Err(ConfigError::ExtraTags(format!(
                    "cannot parse {pair:?} into key=value"
                )))
            }
        };
        if tags.insert(key.to_string(), value.to_string()).is_some() {
            return Err(ConfigError::ExtraTags(format!("duplicate key {key:?}")));
        }
    }
    Ok(tags)
}

/// Parse a duration such as `10m`, `1h30m`, `1.5s` or `250ms`.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".into());
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut nanos = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| format!("expected a number in {text:?}"))?;
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in {text:?}")),
            unit => return Err(format!("unknown unit {unit:?} in {text:?}")),
        };
        nanos += value * scale;
        rest = &rest[unit_end..];
    }

    if nanos < 1.0 {
        return Err("duration must be positive".into());
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

/// Local host name, used as the default camera name.
pub fn hostname() -> Result<String, ConfigError> {
    gethostname::gethostname()
        .into_string()
        .map_err(|raw| ConfigError::Hostname(format!("{raw:?} is not valid UTF-8")))
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────
