//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HMAC secret shared with the auth service that signs connection tokens
    pub auth_jwt_secret: String,

    /// Supabase project URL (records fall back to memory when unset)
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,

    /// Allowed client origin for CORS
    pub client_origin: String,

    /// Match tuning
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = GameConfig::default();
        let game = GameConfig {
            match_duration_secs: parse_or("MATCH_DURATION_SECS", defaults.match_duration_secs)?,
            min_players: parse_or("MATCH_MIN_PLAYERS", defaults.min_players)?,
            start_delay: Duration::from_millis(parse_or(
                "MATCH_START_DELAY_MS",
                defaults.start_delay.as_millis() as u64,
            )?),
            removal_grace: Duration::from_millis(parse_or(
                "MATCH_REMOVAL_GRACE_MS",
                defaults.removal_grace.as_millis() as u64,
            )?),
            ..defaults
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            auth_jwt_secret: env::var("AUTH_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("AUTH_JWT_SECRET"))?,

            supabase_url: env::var("SUPABASE_URL").ok(),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),

            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            game,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Tuning knobs for match orchestration, spawning and action validation
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Countdown length once a match is active
    pub match_duration_secs: u32,
    /// Minimum roster size for a match to activate
    pub min_players: usize,
    /// Delay between `match_pending` and activation
    pub start_delay: Duration,
    /// How long an ended match stays resolvable before removal
    pub removal_grace: Duration,
    /// Starting (and maximum) health of every participant
    pub max_health: f32,
    /// Play area `(min_x, min_y, max_x, max_y)` used for item spawns
    pub play_bounds: (f32, f32, f32, f32),
    /// Spawn points indexed by slot, wrapping when the roster is larger
    pub spawn_points: Vec<(f32, f32)>,
    pub spawner: SpawnerConfig,
    pub validator: ValidatorConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            match_duration_secs: 180,
            min_players: 2,
            start_delay: Duration::from_millis(2000),
            removal_grace: Duration::from_millis(5000),
            max_health: 100.0,
            play_bounds: (0.0, 0.0, 1600.0, 900.0),
            spawn_points: vec![
                (200.0, 700.0),
                (1400.0, 700.0),
                (500.0, 400.0),
                (1100.0, 400.0),
                (800.0, 200.0),
                (800.0, 700.0),
            ],
            spawner: SpawnerConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }
}

/// Weapon and powerup spawn cadence
#[derive(Clone, Debug)]
pub struct SpawnerConfig {
    pub weapon_seed_delay: Duration,
    pub weapon_interval: Duration,
    pub powerup_interval: Duration,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            weapon_seed_delay: Duration::from_secs(1),
            weapon_interval: Duration::from_secs(10),
            powerup_interval: Duration::from_secs(20),
        }
    }
}

/// Physical bounds used to judge reported ranged attacks
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Launch speed of a full-power (power = 1.0) release, units per second
    pub launch_speed: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub min_damage: f32,
    pub max_damage: f32,
    /// Pending projectiles older than this are discarded
    pub projectile_ttl: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            launch_speed: 800.0,
            min_speed: 100.0,
            max_speed: 1200.0,
            min_damage: 1.0,
            max_damage: 50.0,
            projectile_ttl: Duration::from_secs(10),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
