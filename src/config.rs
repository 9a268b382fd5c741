use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use crate::forecaster::{Forecaster, ModelId};
use crate::history::SqliteHistory;
use crate::logging::LoggingConfig;
use crate::optim::BfgsConfig;
use crate::rating_store::RatingStore;
use crate::value::DEFAULT_MIN_VALUE;

const CACHE_DIR: &str = "matchday_value";
const DEFAULT_SEASON: &str = "2025";
const MIN_VALUE_RANGE: (f64, f64) = (-1.0, 10.0);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub ratings_dir: PathBuf,
    pub season: String,
    pub model: ModelId,
    pub min_value: f64,
    pub max_iters: Option<usize>,
    pub logging: LoggingConfig,
}

/// Loads `.env.local` then `.env` from the working directory; missing files are fine.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// `$XDG_CACHE_HOME/matchday_value`, falling back to `$HOME/.cache/matchday_value`.
pub fn app_cache_dir() -> Option<PathBuf> {
    cache_dir_from(|key| std::env::var(key).ok())
}

fn cache_dir_from(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(base) = lookup("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
    }
    let home = lookup("HOME")?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let cache = cache_dir_from(&lookup);

        let db_path = get("MATCHDAY_DB_PATH")
            .map(PathBuf::from)
            .or_else(|| cache.as_ref().map(|dir| dir.join("matches.sqlite")))
            .context("unable to resolve sqlite path (set MATCHDAY_DB_PATH)")?;
        let ratings_dir = get("MATCHDAY_RATINGS_DIR")
            .map(PathBuf::from)
            .or_else(|| cache.as_ref().map(|dir| dir.join("ratings")))
            .context("unable to resolve ratings dir (set MATCHDAY_RATINGS_DIR)")?;
        let model = match get("MATCHDAY_MODEL") {
            Some(raw) => raw.parse()?,
            None => ModelId::Rating,
        };
        let min_value = get("MATCHDAY_MIN_VALUE")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_MIN_VALUE)
            .clamp(MIN_VALUE_RANGE.0, MIN_VALUE_RANGE.1);
        let max_iters = get("MATCHDAY_MAX_ITERS")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0);
        let defaults = LoggingConfig::default();

        Ok(Self {
            db_path,
            ratings_dir,
            season: get("MATCHDAY_SEASON").unwrap_or_else(|| DEFAULT_SEASON.to_string()),
            model,
            min_value,
            max_iters,
            logging: LoggingConfig {
                level: get("LOG_LEVEL").unwrap_or(defaults.level),
                format: get("LOG_FORMAT").unwrap_or(defaults.format),
            },
        })
    }

    /// Applies `--db`, `--ratings-dir`, `--season`, `--model` and `--min-value` overrides.
    pub fn with_args(mut self, args: &[String]) -> Result<Self> {
        if let Some(path) = arg_value(args, "--db") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(dir) = arg_value(args, "--ratings-dir") {
            self.ratings_dir = PathBuf::from(dir);
        }
        if let Some(season) = arg_value(args, "--season") {
            self.season = season;
        }
        if let Some(model) = arg_value(args, "--model") {
            self.model = model.parse()?;
        }
        if let Some(raw) = arg_value(args, "--min-value") {
            let v = raw
                .parse::<f64>()
                .map_err(|_| anyhow!("invalid --min-value {raw:?}"))?;
            if !v.is_finite() {
                return Err(anyhow!("invalid --min-value {raw:?}"));
            }
            self.min_value = v.clamp(MIN_VALUE_RANGE.0, MIN_VALUE_RANGE.1);
        }
        Ok(self)
    }

    pub fn optimizer(&self) -> BfgsConfig {
        BfgsConfig {
            max_iters: self.max_iters,
            ..BfgsConfig::default()
        }
    }

    pub fn open_history(&self) -> Result<SqliteHistory> {
        SqliteHistory::open(&self.db_path)
    }

    pub fn open_forecaster(&self) -> Result<Forecaster<SqliteHistory>> {
        let history = self.open_history()?;
        let store = RatingStore::open(&self.ratings_dir)?;
        Ok(Forecaster::new(history, store).with_optimizer(self.optimizer()))
    }
}

/// Value of `--flag=value` or `--flag value`; blank values count as absent.
pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() && !next.starts_with("--") {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

/// Arguments that are neither flags nor flag values, in order.
pub fn positional_args(args: &[String], value_flags: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_next = value_flags.contains(&arg.as_str());
            continue;
        }
        out.push(arg.clone());
    }
    out
}
