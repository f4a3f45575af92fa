use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::api_football::DEFAULT_API_BASE;
use crate::form::{DEFAULT_LOOKBACK, Lookback};
use crate::ingest::{DEFAULT_MISSING_POSSESSION, StatsPolicy};

const APP_DIR: &str = "formcast";
pub const PREMIER_LEAGUE_ID: u32 = 39;
const DEFAULT_MIN_PRIOR_MATCHES: usize = 10;
const DEFAULT_UPCOMING_DAYS: i64 = 14;
const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub league_id: u32,
    /// Season the ingest and live runs operate on. Never inferred.
    pub season: Option<u16>,
    pub db_path: PathBuf,
    pub model_path: PathBuf,
    pub data_dir: PathBuf,
    pub lookback: Lookback,
    pub stats_policy: StatsPolicy,
    pub min_prior_matches: usize,
    pub upcoming_days: i64,
    pub request_delay: Duration,
}

impl AppConfig {
    /// Loads `.env.local` and `.env` (if present) and then reads the process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir = get("FORMCAST_DATA_DIR")
            .map(PathBuf::from)
            .or_else(default_data_dir)
            .unwrap_or_else(|| PathBuf::from("data"));

        let lookback_raw =
            parse_or(get("FORMCAST_LOOKBACK"), "FORMCAST_LOOKBACK", DEFAULT_LOOKBACK)?;
        let lookback = Lookback::new(lookback_raw).context("FORMCAST_LOOKBACK")?;

        let missing_possession = parse_or(
            get("FORMCAST_MISSING_POSSESSION"),
            "FORMCAST_MISSING_POSSESSION",
            DEFAULT_MISSING_POSSESSION,
        )?;
        if !(0.0..=100.0).contains(&missing_possession) {
            return Err(anyhow!(
                "FORMCAST_MISSING_POSSESSION must be within 0..=100, got {missing_possession}"
            ));
        }

        let season = match get("FORMCAST_SEASON") {
            Some(raw) => Some(
                raw.parse::<u16>()
                    .with_context(|| format!("invalid FORMCAST_SEASON {raw:?}"))?,
            ),
            None => None,
        };

        Ok(Self {
            api_key: get("API_FOOTBALL_KEY"),
            api_base: get("FORMCAST_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            league_id: parse_or(
                get("FORMCAST_LEAGUE_ID"),
                "FORMCAST_LEAGUE_ID",
                PREMIER_LEAGUE_ID,
            )?,
            season,
            db_path: get("FORMCAST_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("formcast.sqlite")),
            model_path: get("FORMCAST_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("model.json")),
            data_dir,
            lookback,
            stats_policy: StatsPolicy { missing_possession },
            min_prior_matches: parse_or(
                get("FORMCAST_MIN_PRIOR_MATCHES"),
                "FORMCAST_MIN_PRIOR_MATCHES",
                DEFAULT_MIN_PRIOR_MATCHES,
            )?,
            upcoming_days: parse_or(
                get("FORMCAST_UPCOMING_DAYS"),
                "FORMCAST_UPCOMING_DAYS",
                DEFAULT_UPCOMING_DAYS,
            )?
            .clamp(1, 60),
            request_delay: Duration::from_millis(parse_or(
                get("FORMCAST_REQUEST_DELAY_MS"),
                "FORMCAST_REQUEST_DELAY_MS",
                DEFAULT_REQUEST_DELAY_MS,
            )?),
        })
    }

    pub fn require_season(&self) -> Result<u16> {
        self.season
            .ok_or_else(|| anyhow!("FORMCAST_SEASON is not set (e.g. FORMCAST_SEASON=2025)"))
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("API_FOOTBALL_KEY is not set"))
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("invalid {key} {value:?}: {err}")),
        None => Ok(default),
    }
}

/// `$XDG_DATA_HOME/formcast`, falling back to `~/.local/share/formcast`.
pub fn default_data_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_DATA_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".local").join("share").join(APP_DIR))
}

/// `$XDG_CACHE_HOME/formcast`, falling back to `~/.cache/formcast`.
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}
