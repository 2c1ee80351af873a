use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_SESSION_DURATION_SECONDS: u64 = 600;
pub const DEFAULT_SESSION_TICK_MILLIS: u64 = 250;
pub const DEFAULT_SLOT_SEARCH_DAYS: i64 = 14;
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub hospital_api_url: String,
    pub hospital_api_key: String,
    pub jwt_secret: String,
    pub session_duration_seconds: u64,
    pub session_tick_millis: u64,
    pub slot_search_days: i64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hospital_api_url: "http://localhost:8080/api".to_string(),
            hospital_api_key: String::new(),
            jwt_secret: String::new(),
            session_duration_seconds: DEFAULT_SESSION_DURATION_SECONDS,
            session_tick_millis: DEFAULT_SESSION_TICK_MILLIS,
            slot_search_days: DEFAULT_SLOT_SEARCH_DAYS,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            hospital_api_url: env::var("HOSPITAL_API_URL")
                .unwrap_or_else(|_| {
                    warn!("HOSPITAL_API_URL not set, using default");
                    defaults.hospital_api_url.clone()
                }),
            hospital_api_key: env::var("HOSPITAL_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("HOSPITAL_API_KEY not set, using empty value");
                    String::new()
                }),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            session_duration_seconds: parse_or(
                "CHAT_SESSION_DURATION_SECONDS",
                defaults.session_duration_seconds,
            ),
            session_tick_millis: parse_or("SESSION_TICK_MILLIS", defaults.session_tick_millis),
            slot_search_days: parse_or("SLOT_SEARCH_DAYS", defaults.slot_search_days),
            port: parse_or("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.hospital_api_url.is_empty()
            && !self.jwt_secret.is_empty()
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
