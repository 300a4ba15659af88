use std::time::Duration;

use crate::{Error, Result, TradingMode};

/// Process configuration loaded from environment variables at startup.
///
/// Strategy parameters live in a separate TOML file, see
/// `strategy::StrategyFileConfig`.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials. Required in live mode only.
    pub binance_api_key: Option<String>,
    pub binance_secret: Option<String>,

    // Telegram. Without a token, notifications go to the log only.
    pub telegram_token: Option<String>,
    pub telegram_chat_ids: Vec<i64>,

    // Trading
    pub trading_mode: TradingMode,
    pub paper_slippage_bps: f64,
    pub poll_interval: Duration,

    // Database
    pub database_url: String,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let trading_mode = match env.required("TRADING_MODE")?.to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let binance_api_key = env.optional("BINANCE_API_KEY");
        let binance_secret = env.optional("BINANCE_SECRET");
        if trading_mode == TradingMode::Live
            && (binance_api_key.is_none() || binance_secret.is_none())
        {
            return Err(Error::Config(
                "BINANCE_API_KEY and BINANCE_SECRET are required in live mode".into(),
            ));
        }

        let telegram_chat_ids = match env.optional("TELEGRAM_CHAT_IDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>().map_err(|_| {
                        Error::Config(format!("TELEGRAM_CHAT_IDS contains non-numeric ID: '{s}'"))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Config {
            binance_api_key,
            binance_secret,
            telegram_token: env.optional("TELEGRAM_TOKEN"),
            telegram_chat_ids,
            trading_mode,
            paper_slippage_bps: env.parsed("PAPER_SLIPPAGE_BPS", 10.0)?,
            poll_interval: Duration::from_secs(env.parsed("POLL_INTERVAL_SECS", 30u64)?),
            database_url: env.required("DATABASE_URL")?,
            strategy_config_path: env
                .optional("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key).ok_or_else(|| {
            Error::Config(format!(
                "Required environment variable '{key}' is not set. Check your .env file."
            ))
        })
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
            None => Ok(default),
        }
    }
}
