use std::path::PathBuf;

use chrono::NaiveTime;

use crate::limits::DEFAULT_BUFFER_SECS;
use crate::model::{Secs, SECS_PER_MINUTE};

/// Booking rules the engine enforces on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Turnover gap enforced around every active reservation.
    pub buffer: Secs,
    /// Earliest bookable start time.
    pub opening: NaiveTime,
    /// Latest bookable end time.
    pub closing: NaiveTime,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_BUFFER_SECS,
            opening: hm(10, 0),
            closing: hm(22, 0),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.opening >= self.closing {
            return Err(ConfigError::OperatingHours {
                opening: self.opening,
                closing: self.closing,
            });
        }
        if self.buffer < 0 {
            return Err(ConfigError::NegativeBuffer(self.buffer));
        }
        Ok(())
    }
}

/// Process-level settings for the `tablebook` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub engine: EngineConfig,
    pub data_dir: PathBuf,
    /// JSON file with the tables and known customers to load at startup.
    pub seed_path: Option<PathBuf>,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Read `TABLEBOOK_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let buffer = match get("TABLEBOOK_BUFFER_MINUTES") {
            Some(raw) => {
                let minutes: Secs = parse_var("TABLEBOOK_BUFFER_MINUTES", &raw)?;
                minutes
                    .checked_mul(SECS_PER_MINUTE)
                    .ok_or(ConfigError::Invalid("TABLEBOOK_BUFFER_MINUTES", raw))?
            }
            None => defaults.buffer,
        };
        let opening = match get("TABLEBOOK_OPENING") {
            Some(raw) => parse_time("TABLEBOOK_OPENING", &raw)?,
            None => defaults.opening,
        };
        let closing = match get("TABLEBOOK_CLOSING") {
            Some(raw) => parse_time("TABLEBOOK_CLOSING", &raw)?,
            None => defaults.closing,
        };
        let engine = EngineConfig { buffer, opening, closing };
        engine.validate()?;

        let data_dir = get("TABLEBOOK_DATA_DIR").unwrap_or_else(|| "./data".into());
        let compact_threshold = match get("TABLEBOOK_COMPACT_THRESHOLD") {
            Some(raw) => parse_var("TABLEBOOK_COMPACT_THRESHOLD", &raw)?,
            None => 1000,
        };
        let metrics_port = get("TABLEBOOK_METRICS_PORT")
            .map(|raw| parse_var("TABLEBOOK_METRICS_PORT", &raw))
            .transpose()?;

        Ok(Self {
            engine,
            data_dir: PathBuf::from(data_dir),
            seed_path: get("TABLEBOOK_SEED").map(PathBuf::from),
            compact_threshold,
            metrics_port,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

fn parse_var<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(key, raw.to_string()))
}

fn parse_time(key: &'static str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| ConfigError::Invalid(key, raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid(&'static str, String),
    OperatingHours { opening: NaiveTime, closing: NaiveTime },
    NegativeBuffer(Secs),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(key, raw) => write!(f, "invalid value for {key}: {raw:?}"),
            ConfigError::OperatingHours { opening, closing } => {
                write!(f, "opening time {opening} must be before closing time {closing}")
            }
            ConfigError::NegativeBuffer(secs) => write!(f, "buffer must not be negative: {secs}s"),
        }
    }
}

impl std::error::Error for ConfigError {}
