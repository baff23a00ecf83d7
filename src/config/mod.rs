//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::lobby::IdTakenPolicy;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
    /// Max signaling frames per second per broker connection
    pub signal_rate_limit: u32,
    /// Fallback when a hosted room code is already taken
    pub id_taken_policy: IdTakenPolicy,
    /// Gameplay settings
    pub game: GameConfig,
}

/// Gameplay knobs shared by every peer in a session
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    /// Session length in seconds
    pub session_secs: u32,
    /// Concurrent target cap
    pub max_targets: usize,
    /// Score awarded per hit
    pub hit_score: u32,
    /// Rows shown on the leaderboard
    pub leaderboard_limit: usize,
    /// Render frames per second
    pub frame_rate: u32,
    pub field_width: f32,
    pub field_height: f32,
    pub target_radius: f32,
    /// Max per-axis target speed in pixels per frame
    pub target_speed: f32,
    /// Pointer movement multiplier
    pub sensitivity: f32,
    /// Fixed seed for target generation (random when unset)
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            session_secs: 30,
            max_targets: 5,
            hit_score: 100,
            leaderboard_limit: 5,
            frame_rate: 60,
            field_width: 1280.0,
            field_height: 720.0,
            target_radius: 25.0,
            target_speed: 4.0,
            sensitivity: 1.0,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Load gameplay overrides from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            session_secs: parse_var("SESSION_SECS", defaults.session_secs)?,
            max_targets: parse_var("MAX_TARGETS", defaults.max_targets)?,
            hit_score: parse_var("HIT_SCORE", defaults.hit_score)?,
            leaderboard_limit: parse_var("LEADERBOARD_LIMIT", defaults.leaderboard_limit)?,
            frame_rate: parse_var("FRAME_RATE", defaults.frame_rate)?,
            field_width: parse_var("FIELD_WIDTH", defaults.field_width)?,
            field_height: parse_var("FIELD_HEIGHT", defaults.field_height)?,
            target_radius: parse_var("TARGET_RADIUS", defaults.target_radius)?,
            target_speed: parse_var("TARGET_SPEED", defaults.target_speed)?,
            sensitivity: parse_var("SENSITIVITY", defaults.sensitivity)?,
            seed: match env::var("TARGET_SEED") {
                Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid("TARGET_SEED"))?),
                Err(_) => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_secs == 0 {
            return Err(ConfigError::Invalid("SESSION_SECS"));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::Invalid("FRAME_RATE"));
        }
        // "NaN" and "inf" parse as f32 and slip past plain comparisons
        if !self.target_radius.is_finite() || self.target_radius <= 0.0 {
            return Err(ConfigError::Invalid("TARGET_RADIUS"));
        }
        if !self.field_width.is_finite() || self.field_width < 2.0 * self.target_radius {
            return Err(ConfigError::Invalid("FIELD_WIDTH"));
        }
        if !self.field_height.is_finite() || self.field_height < 2.0 * self.target_radius {
            return Err(ConfigError::Invalid("FIELD_HEIGHT"));
        }
        if !self.target_speed.is_finite() || self.target_speed < 0.0 {
            return Err(ConfigError::Invalid("TARGET_SPEED"));
        }
        if !self.sensitivity.is_finite() {
            return Err(ConfigError::Invalid("SENSITIVITY"));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),

            signal_rate_limit: parse_var("SIGNAL_RATE_LIMIT", 60)?,

            id_taken_policy: match env::var("ID_TAKEN_POLICY") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|_| ConfigError::Invalid("ID_TAKEN_POLICY"))?,
                Err(_) => IdTakenPolicy::default(),
            },

            game: GameConfig::from_env()?,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
