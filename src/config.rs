//! Configuration management with validation and defaults
//!
//! Timings, store lifetimes, payout ratios and the winner-selection policy all
//! live here so operators can tune them without touching the room engine.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete orchestrator configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BingoConfig {
    /// Start the countdown as soon as a bet brings the room to `min_players`
    pub auto_start_countdown: bool,
    pub timing: TimingConfig,
    pub ttl: TtlConfig,
    pub payout: PayoutConfig,
    pub winners: WinnerPolicy,
    pub server: ServerConfig,
}

impl Default for BingoConfig {
    fn default() -> Self {
        Self {
            auto_start_countdown: true,
            timing: TimingConfig::default(),
            ttl: TtlConfig::default(),
            payout: PayoutConfig::default(),
            winners: WinnerPolicy::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Timer cadence and lock bounds, all in milliseconds
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub countdown_ms: u64,
    pub countdown_check_ms: u64,
    pub draw_interval_ms: u64,
    pub reset_delay_ms: u64,
    pub lock_wait_ms: u64,
    pub lock_ttl_ms: u64,
    pub lock_retry_ms: u64,
    pub auto_play_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            countdown_ms: 30_000,
            countdown_check_ms: 500,
            draw_interval_ms: 3_000,
            reset_delay_ms: 5_000,
            lock_wait_ms: 3_000,
            lock_ttl_ms: 5_000,
            lock_retry_ms: 50,
            auto_play_ms: 3_600_000,
        }
    }
}

/// Ephemeral record lifetimes, in seconds
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub room_state_secs: u64,
    pub claims_secs: u64,
    pub game_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            room_state_secs: 86_400,
            claims_secs: 86_400,
            game_secs: 7_200,
        }
    }
}

/// House economics
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    /// Share of the pot paid to winners
    pub payout_ratio: f64,
    /// Share of the payout booked as revenue when a winner exists
    pub revenue_share: f64,
    /// Multiplier applied to the unpaid pool when nobody wins
    pub no_winner_markup: f64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            payout_ratio: 0.8,
            revenue_share: 0.25,
            no_winner_markup: 1.25,
        }
    }
}

/// Business rules for the winner selector
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WinnerPolicy {
    pub min_players: usize,
    pub multi_winner_probability: f64,
    /// Population above which a second winner may be drawn
    pub two_winner_population: usize,
    /// Population above which up to three winners may be drawn
    pub three_winner_population: usize,
    /// Lifetime games a real player needs before winning in demo-heavy rooms
    pub eligibility_games_played: u64,
}

impl Default for WinnerPolicy {
    fn default() -> Self {
        Self {
            min_players: 2,
            multi_winner_probability: 0.3,
            two_winner_population: 80,
            three_winner_population: 150,
            eligibility_games_played: 5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

impl BingoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond-scale timings for tests and local demos
    pub fn fast() -> Self {
        Self {
            timing: TimingConfig {
                countdown_ms: 200,
                countdown_check_ms: 20,
                draw_interval_ms: 10,
                reset_delay_ms: 50,
                lock_wait_ms: 500,
                lock_ttl_ms: 1_000,
                lock_retry_ms: 5,
                auto_play_ms: 60_000,
            },
            ..Self::new()
        }
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.timing.countdown_ms)
    }

    pub fn countdown_check(&self) -> Duration {
        Duration::from_millis(self.timing.countdown_check_ms)
    }

    pub fn draw_interval(&self) -> Duration {
        Duration::from_millis(self.timing.draw_interval_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.timing.reset_delay_ms)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timings = [
            ("timing.countdown_ms", self.timing.countdown_ms),
            ("timing.countdown_check_ms", self.timing.countdown_check_ms),
            ("timing.draw_interval_ms", self.timing.draw_interval_ms),
            ("timing.lock_wait_ms", self.timing.lock_wait_ms),
            ("timing.lock_ttl_ms", self.timing.lock_ttl_ms),
            ("timing.lock_retry_ms", self.timing.lock_retry_ms),
        ];
        for (field, value) in timings {
            if value == 0 {
                return Err(ConfigError::invalid(field, "0", "must be greater than zero"));
            }
        }

        let ratios = [
            ("payout.payout_ratio", self.payout.payout_ratio),
            ("payout.revenue_share", self.payout.revenue_share),
            ("winners.multi_winner_probability", self.winners.multi_winner_probability),
        ];
        for (field, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, value, "must be within 0.0..=1.0"));
            }
        }

        if self.payout.no_winner_markup < 0.0 {
            return Err(ConfigError::invalid(
                "payout.no_winner_markup",
                self.payout.no_winner_markup,
                "cannot be negative",
            ));
        }

        if self.winners.min_players < 2 {
            return Err(ConfigError::invalid(
                "winners.min_players",
                self.winners.min_players,
                "a game needs at least two players",
            ));
        }

        if self.winners.three_winner_population < self.winners.two_winner_population {
            return Err(ConfigError::invalid(
                "winners.three_winner_population",
                self.winners.three_winner_population,
                "must not be below winners.two_winner_population",
            ));
        }

        Ok(())
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> Result<BingoConfig, ConfigError> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => BingoConfig::new(),
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(path: &str) -> Result<BingoConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(config: &mut BingoConfig) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("BINGO_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_env("BINGO_PORT")? {
            config.server.port = port;
        }
        if let Some(ms) = parse_env("BINGO_COUNTDOWN_MS")? {
            config.timing.countdown_ms = ms;
        }
        if let Some(ms) = parse_env("BINGO_DRAW_INTERVAL_MS")? {
            config.timing.draw_interval_ms = ms;
        }
        if let Some(ms) = parse_env("BINGO_RESET_DELAY_MS")? {
            config.timing.reset_delay_ms = ms;
        }
        if let Some(enabled) = parse_env("BINGO_AUTO_START_COUNTDOWN")? {
            config.auto_start_countdown = enabled;
        }
        Ok(())
    }

    /// Write a configuration as TOML
    pub fn save(config: &BingoConfig, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to write to {}: {}", path, e)))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, raw, "could not be parsed")),
        Err(_) => Ok(None),
    }
}
