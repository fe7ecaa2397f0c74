use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// B2 application key id
    #[arg(long, env = "B2_KEY_ID", hide_env_values = true)]
    pub b2_key_id: Option<String>,

    /// B2 application key
    #[arg(long, env = "B2_APP_KEY", hide_env_values = true)]
    pub b2_app_key: Option<String>,

    /// B2 bucket name
    #[arg(long, env = "B2_BUCKET")]
    pub b2_bucket: Option<String>,

    /// B2 S3-compatible endpoint URL
    #[arg(long, env = "B2_ENDPOINT")]
    pub b2_endpoint: Option<String>,

    /// B2 region
    #[arg(long, env = "B2_REGION")]
    pub b2_region: Option<String>,

    /// Shared secret for admin endpoints; admin endpoints are disabled when unset
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    pub resilience: ResilienceConfig,
    pub routes: RouteConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("key_id", &self.key_id)
            .field("app_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub token: Option<String>,
}

impl AdminConfig {
    /// The configured token, if any. Blank values count as unset.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("token", &self.token().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub timeout_disabled: bool,
    /// Whole-request budget enforced by middleware.
    pub request_timeout_secs: u64,
    /// Budget for each individual database or object-store call.
    pub call_timeout_secs: u64,
}

/// Per-route switches. A disabled route is not mounted.
#[derive(Debug, Deserialize, Clone)]
pub struct RouteConfig {
    pub b2_test: bool,
    pub db_test: bool,
    pub db_init: bool,
    pub artifact_test: bool,
    pub run_api: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub json: bool,
}

/// Settings that must be present for the service to start, with the
/// environment variable each one is conventionally supplied through.
const REQUIRED: &[(&str, &str)] = &[
    ("database.url", "DATABASE_URL"),
    ("storage.key_id", "B2_KEY_ID"),
    ("storage.app_key", "B2_APP_KEY"),
    ("storage.bucket", "B2_BUCKET"),
    ("storage.endpoint", "B2_ENDPOINT"),
    ("storage.region", "B2_REGION"),
];

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?
            .set_default("resilience.call_timeout_secs", 10)?
            .set_default("routes.b2_test", true)?
            .set_default("routes.db_test", true)?
            .set_default("routes.db_init", true)?
            .set_default("routes.artifact_test", true)?
            .set_default("routes.run_api", true)?
            .set_default("telemetry.json", false)?;

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config.yaml").required(false));
        }

        // 3. Prefixed environment, e.g. OPENCLAW_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("OPENCLAW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags and the plain env names clap reads for them
        let overrides: [(&str, Option<String>); 7] = [
            ("database.url", cli.database_url),
            ("storage.key_id", cli.b2_key_id),
            ("storage.app_key", cli.b2_app_key),
            ("storage.bucket", cli.b2_bucket),
            ("storage.endpoint", cli.b2_endpoint),
            ("storage.region", cli.b2_region),
            ("admin.token", cli.admin_token),
        ];
        for (key, value) in overrides {
            if let Some(value) = value {
                builder = builder.set_override(key, value)?;
            }
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }

        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail fast on missing required settings or an unusable endpoint.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        for (key, env_name) in REQUIRED {
            if self.value_of(key).is_none_or(|v| v.trim().is_empty()) {
                return Err(config::ConfigError::Message(format!(
                    "Missing required env var: {env_name}"
                )));
            }
        }

        let endpoint = url::Url::parse(&self.storage.endpoint).map_err(|e| {
            config::ConfigError::Message(format!("B2_ENDPOINT is not a valid URL: {e}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(config::ConfigError::Message(format!(
                "B2_ENDPOINT must use http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        if self.resilience.call_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "resilience.call_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn value_of(&self, key: &str) -> Option<&str> {
        let value = match key {
            "database.url" => &self.database.url,
            "storage.key_id" => &self.storage.key_id,
            "storage.app_key" => &self.storage.app_key,
            "storage.bucket" => &self.storage.bucket,
            "storage.endpoint" => &self.storage.endpoint,
            "storage.region" => &self.storage.region,
            _ => return None,
        };
        Some(value.as_str())
    }

    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.resilience.call_timeout_secs)
    }
}
