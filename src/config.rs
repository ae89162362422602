use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::env;
use config;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlogConfig {
    /// Page size shared by every paginated listing.
    pub posts_per_page: u32,
    pub max_upload_size_mb: u64,
}

impl Default for BlogConfig {
    fn default() -> Self {
        BlogConfig { posts_per_page: 10, max_upload_size_mb: 5 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    #[serde(default)]
    pub blog: BlogConfig,
    // Populated from the .env file
    pub database_path: String,
    pub media_path: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub admin_url_prefix: String,
    pub use_secure_cookies: bool,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| config::ConfigError::Message(format!(
        "FATAL: Environment variable '{}' is not set in your .env file.", name
    )))
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let database_path = required_var("DATABASE_PATH")?;
        let media_path = required_var("MEDIA_PATH")?;
        let session_secret_key = required_var("SESSION_SECRET_KEY")?;

        // 128 hex characters decode to the 64 bytes the cookie key needs.
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string()
            ));
        }

        let admin_url_prefix = required_var("ADMIN_URL_PREFIX")?;
        if !is_valid_url_prefix(&admin_url_prefix) {
            return Err(config::ConfigError::Message(
                "FATAL: 'ADMIN_URL_PREFIX' must not be empty and can only contain letters, numbers, underscores, and hyphens.".to_string()
            ));
        }

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        for (name, value) in [("DATABASE_PATH", &database_path), ("MEDIA_PATH", &media_path)] {
            if Path::new(value).is_relative() {
                return Err(config::ConfigError::Message(format!(
                    "FATAL: The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                    name, value
                )));
            }
        }

        let builder = config::Config::builder()
            // Web host/port and blog tuning come from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("media_path", media_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("admin_url_prefix", admin_url_prefix)?
            .build()?;

        builder.try_deserialize()
    }

    /// Full path of the SQLite file holding every blog table.
    pub fn blog_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("blog")
            .join("blog.db")
    }

    pub fn admin_root(&self) -> String {
        format!("/management/{}", self.admin_url_prefix)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.blog.max_upload_size_mb * 1024 * 1024
    }
}

pub fn is_valid_url_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_prefix_rejects_slashes_and_empty() {
        assert!(is_valid_url_prefix("site-admin_1"));
        assert!(!is_valid_url_prefix(""));
        assert!(!is_valid_url_prefix("admin/panel"));
        assert!(!is_valid_url_prefix("admin panel"));
    }

    #[test]
    fn blog_db_path_is_nested_under_database_path() {
        let config = Config {
            web: WebConfig { host: "127.0.0.1".into(), port: 8000 },
            blog: BlogConfig::default(),
            database_path: "/var/lib/blogicum".into(),
            media_path: "/var/lib/blogicum/media".into(),
            log_level: "info".into(),
            session_secret_key: "00".repeat(64),
            admin_url_prefix: "staff".into(),
            use_secure_cookies: false,
        };
        assert_eq!(config.blog_db_path(), PathBuf::from("/var/lib/blogicum/blog/blog.db"));
        assert_eq!(config.admin_root(), "/management/staff");
        assert_eq!(config.max_upload_bytes(), 5 * 1024 * 1024);
    }
}
