//! Process configuration loaded from environment variables.
//!
//! Call `dotenvy::dotenv().ok()` before [`Environment::from_env`] so a local
//! `.env` file can supply the variables during development. Every knob has a
//! default except the credentials and connection secrets, which fail startup
//! with the name of the missing variable.

use crate::error::Error;

pub const ENVIRONMENT_PRODUCTION: &str = "production";
pub const ENVIRONMENT_DEVELOPMENT: &str = "development";

/// Resolved configuration for the whole process.
#[derive(Debug, Clone)]
pub struct Environment {
    /// App environment (development/production)
    pub environment: String,
    /// Port the HTTP server binds to
    pub http_port: u16,

    /// Path to the Chromium binary used by the browser pool
    pub chromium_binary_path: String,
    /// Max concurrent Chromium browser processes
    pub max_chromium_browsers: usize,
    /// Max tabs per browser process
    pub max_chromium_tabs_per_browser: usize,
    /// Seconds a pooled tab may sit idle before it is closed
    pub max_chromium_tab_idle_seconds: u64,

    /// S3-compatible endpoint URL
    pub aws_s3_endpoint_url: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_region: String,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: String,
    pub redis_db: i64,

    /// Shared secret for the bearer check
    pub auth_secret: String,
}

impl Environment {
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            environment: optional("ENVIRONMENT", ENVIRONMENT_DEVELOPMENT.to_string()),
            http_port: parsed("HTTP_PORT", 3000),
            chromium_binary_path: optional(
                "CHROMIUM_BINARY_PATH",
                "/usr/bin/chromium-browser".to_string(),
            ),
            max_chromium_browsers: parsed("MAX_CHROMIUM_BROWSERS", 1),
            max_chromium_tabs_per_browser: parsed("MAX_CHROMIUM_TABS_PER_BROWSER", 4),
            max_chromium_tab_idle_seconds: parsed("MAX_CHROMIUM_TAB_IDLE_SECONDS", 30),
            aws_s3_endpoint_url: optional(
                "AWS_S3_ENDPOINT_URL",
                "https://s3.amazonaws.com".to_string(),
            ),
            aws_access_key_id: required("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
            aws_region: optional("AWS_REGION", "us-east-1".to_string()),
            redis_host: required("REDIS_HOST")?,
            redis_port: parsed("REDIS_PORT", 6379),
            redis_password: required("REDIS_PASSWORD")?,
            redis_db: parsed("REDIS_DB", 0),
            auth_secret: required("AUTH_SECRET")?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == ENVIRONMENT_PRODUCTION
    }

    /// Connection URL for the Redis client, including password and db number.
    pub fn redis_url(&self) -> String {
        format!(
            "redis://:{}@{}:{}/{}",
            self.redis_password, self.redis_host, self.redis_port, self.redis_db
        )
    }
}

fn required(name: &str) -> Result<String, Error> {
    std::env::var(name)
        .map_err(|_| Error::Internal(format!("required environment variable {name} is not set")))
}

fn optional(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
