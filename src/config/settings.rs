//! Application settings and configuration structures.

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Which persistence backend holds rooms and messages
    pub storage: StorageSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// How callers prove who they are
    pub identity: IdentitySettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// WebSocket gateway configuration
    pub websocket: WebSocketSettings,

    /// Chat behaviour (history paging, seeding, announcements)
    pub chat: ChatSettings,

    /// Attachment uploads (local blob store)
    pub uploads: UploadSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL (required for the postgres backend)
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,

    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Accept the identity a client announces
    Trusted,
    /// Require an HS256 token issued by the portal
    Jwt,
}

/// Identity provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySettings {
    pub mode: IdentityMode,

    /// Shared secret for `jwt` mode
    #[serde(default)]
    pub jwt_secret: String,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-1023)
    pub machine_id: u16,

    /// Custom epoch timestamp in milliseconds
    pub epoch: u64,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins; empty means any origin
    pub allowed_origins: Vec<String>,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum message size in bytes (default: 64KB)
    pub max_message_size: usize,

    /// Maximum frame size in bytes (default: 16KB)
    pub max_frame_size: usize,

    /// Expected client heartbeat interval in milliseconds (default: 25000)
    pub heartbeat_interval_ms: u64,

    /// Extra silence tolerated past the heartbeat interval before closing
    pub heartbeat_grace_ms: u64,

    /// Time a fresh connection has to identify, in seconds (default: 30)
    pub identify_timeout_secs: u64,

    /// Typing indicators older than this are cleared; 0 disables expiry
    pub typing_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    pub history_default_limit: u32,
    pub history_max_limit: u32,
    pub room_list_limit: u32,
    /// Ensure the general/students/teachers rooms exist at startup
    pub seed_default_rooms: bool,
    /// Post "joined"/"left" system messages on REST membership changes
    pub announce_membership: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    /// Directory files are written to
    pub dir: String,
    /// URL prefix the directory is served under
    pub public_path: String,
    /// Upper bound on a single upload, in bytes
    pub max_file_size: usize,
}

/// Minimum required length for the JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. built-in defaults
    /// 2. config/default.toml (base configuration)
    /// 3. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 4. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed, or
    /// if the chosen backends are missing what they need.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let settings: Self = Self::builder(&environment)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option(
                "identity.jwt_secret",
                std::env::var("IDENTITY_JWT_SECRET").ok(),
            )?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Built-in defaults only: in-memory storage, trusted identities.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder("test")?.build()?.try_deserialize()
    }

    fn builder(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let builder = Config::builder()
            .set_default("environment", environment)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("storage.backend", "memory")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("database.run_migrations", true)?
            .set_default("identity.mode", "trusted")?
            .set_default("identity.jwt_secret", "")?
            .set_default("snowflake.machine_id", 1)?
            .set_default("snowflake.epoch", 1_704_067_200_000_u64)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            // WebSocket limits
            .set_default("websocket.max_message_size", 65536_i64)? // 64KB
            .set_default("websocket.max_frame_size", 16384_i64)? // 16KB
            .set_default("websocket.heartbeat_interval_ms", 25000_i64)?
            .set_default("websocket.heartbeat_grace_ms", 10000_i64)?
            .set_default("websocket.identify_timeout_secs", 30_i64)?
            .set_default("websocket.typing_ttl_secs", 10_i64)?
            .set_default("chat.history_default_limit", 50)?
            .set_default("chat.history_max_limit", 100)?
            .set_default("chat.room_list_limit", 50)?
            .set_default("chat.seed_default_rooms", true)?
            .set_default("chat.announce_membership", true)?
            .set_default("uploads.dir", "uploads")?
            .set_default("uploads.public_path", "/uploads")?
            .set_default("uploads.max_file_size", 52_428_800_i64)?; // 50MB
        Ok(builder)
    }

    /// Check cross-field requirements that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_none() {
            return Err(ConfigError::Message(
                "storage.backend = postgres requires database.url (or DATABASE_URL)".into(),
            ));
        }
        if self.identity.mode == IdentityMode::Jwt
            && self.identity.jwt_secret.len() < MIN_JWT_SECRET_LENGTH
        {
            return Err(ConfigError::Message(format!(
                "identity.jwt_secret must be at least {} characters in jwt mode. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.identity.jwt_secret.len()
            )));
        }
        if self.chat.history_default_limit == 0
            || self.chat.history_default_limit > self.chat.history_max_limit
        {
            return Err(ConfigError::Message(
                "chat.history_default_limit must be between 1 and chat.history_max_limit".into(),
            ));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
