use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
    /// Dispatch tunables (offer windows, radii, TTLs).
    pub dispatch: DispatchConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default   |
    /// |------------------------|-----------|
    /// | `HOST`                 | `0.0.0.0` |
    /// | `PORT`                 | `3000`    |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `30`      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            dispatch: DispatchConfig::from_env(),
        }
    }
}

/// Tunables for the dispatch coordinator, geofencing gates, presence
/// freshness, and the location broadcaster.
///
/// The offer window and presence TTL were deliberately chosen on the
/// conservative side; both are env-overridable.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long one offer round stays open (default: 20 s).
    pub offer_expiry_secs: u64,
    /// Offer rounds attempted before giving up (default: 3).
    pub max_offer_rounds: u32,
    /// Candidate search radius for the first round, meters (default: 5000).
    pub search_radius_m: f64,
    /// Radius multiplier applied on each retry round (default: 1.5).
    pub search_radius_growth: f64,
    /// Hard cap on the search radius, meters (default: 10000).
    pub search_radius_max_m: f64,
    /// Maximum drivers notified per round (default: 20).
    pub max_candidates: usize,
    /// Presence records older than this are treated as offline (default: 45 s).
    pub presence_ttl_secs: u64,
    /// Pickup-proximity gate for arrival/start/driver-cancel, meters
    /// (default: 2000).
    pub geofence_radius_m: f64,
    /// Location broadcast tick (default: 2 s).
    pub broadcast_interval_secs: u64,
    /// Re-emit an unchanged position after this long (default: 10 s).
    pub broadcast_max_silence_secs: u64,
}

impl DispatchConfig {
    /// Load dispatch tunables from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `OFFER_EXPIRY_SECS`           | `20`    |
    /// | `MAX_OFFER_ROUNDS`            | `3`     |
    /// | `SEARCH_RADIUS_M`             | `5000`  |
    /// | `SEARCH_RADIUS_GROWTH`        | `1.5`   |
    /// | `SEARCH_RADIUS_MAX_M`         | `10000` |
    /// | `MAX_CANDIDATES`              | `20`    |
    /// | `PRESENCE_TTL_SECS`           | `45`    |
    /// | `GEOFENCE_RADIUS_M`           | `2000`  |
    /// | `BROADCAST_INTERVAL_SECS`     | `2`     |
    /// | `BROADCAST_MAX_SILENCE_SECS`  | `10`    |
    pub fn from_env() -> Self {
        Self {
            offer_expiry_secs: env_parse("OFFER_EXPIRY_SECS", 20),
            max_offer_rounds: env_parse("MAX_OFFER_ROUNDS", 3),
            search_radius_m: env_parse("SEARCH_RADIUS_M", 5000.0),
            search_radius_growth: env_parse("SEARCH_RADIUS_GROWTH", 1.5),
            search_radius_max_m: env_parse("SEARCH_RADIUS_MAX_M", 10000.0),
            max_candidates: env_parse("MAX_CANDIDATES", 20),
            presence_ttl_secs: env_parse("PRESENCE_TTL_SECS", 45),
            geofence_radius_m: env_parse("GEOFENCE_RADIUS_M", 2000.0),
            broadcast_interval_secs: env_parse("BROADCAST_INTERVAL_SECS", 2),
            broadcast_max_silence_secs: env_parse("BROADCAST_MAX_SILENCE_SECS", 10),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_expiry_secs: 20,
            max_offer_rounds: 3,
            search_radius_m: 5000.0,
            search_radius_growth: 1.5,
            search_radius_max_m: 10000.0,
            max_candidates: 20,
            presence_ttl_secs: 45,
            geofence_radius_m: 2000.0,
            broadcast_interval_secs: 2,
            broadcast_max_silence_secs: 10,
        }
    }
}

/// Parse an env var, falling back to `default` when unset.
///
/// Panics on a present-but-malformed value; misconfiguration should fail
/// at startup, not at first use.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be valid: {e}")),
        Err(_) => default,
    }
}
