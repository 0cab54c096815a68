use std::time::Duration;

/// Heartbeat interval for live connections: ping the client and refresh presence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A connection with no inbound traffic (frames or pongs) for this long is dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

pub const MAX_MESSAGE_LENGTH: u64 = 5000;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MAX_MEDIA_SIZE: usize = 10 * 1024 * 1024;

pub struct Env {
    pub jwt_secret: String,
    pub database_url: String,
    pub redis_url: String,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
    pub presence_ttl: u64,
    pub friendship_cache_ttl: u64,
    pub upload_dir: String,
    pub upload_base_url: String,
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let redis_url = std::env::var("REDIS_URL")
            .expect("REDIS_URL must be set in .env file or environment variable");

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16 integer");

        let presence_ttl = std::env::var("PRESENCE_TTL")
            .unwrap_or_else(|_| "86400".to_string())
            .parse::<u64>()
            .expect("PRESENCE_TTL must be a valid u64 integer");
        let friendship_cache_ttl = std::env::var("FRIENDSHIP_CACHE_TTL")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .expect("FRIENDSHIP_CACHE_TTL must be a valid u64 integer");

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());
        let upload_base_url =
            std::env::var("UPLOAD_BASE_URL").unwrap_or_else(|_| "/uploads".to_string());

        Env {
            jwt_secret,
            database_url,
            redis_url,
            frontend_url,
            ip,
            port,
            presence_ttl,
            friendship_cache_ttl,
            upload_dir,
            upload_base_url,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
