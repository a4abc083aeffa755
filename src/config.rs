use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "ardu", about = "Moderated social posting backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Secret used to sign JWTs
    #[arg(long, env = "ARDU_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub bootstrap: BootstrapConfig,
    pub media: MediaConfig,
    pub otp: OtpConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub jwt_expiration_secs: u64,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

/// The main admin created on first start.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BootstrapConfig {
    pub main_admin_email: String,
    pub main_admin_name: String,
    pub main_admin_mobile: String,
    pub main_admin_password: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MediaConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub users_folder: String,
    pub admins_folder: String,
    pub posts_folder: String,
    pub stories_folder: String,
    pub max_video_seconds: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OtpConfig {
    pub ttl_secs: i64,
    /// Wrong guesses allowed before an outstanding code is dropped.
    pub max_attempts: u32,
    /// Log codes instead of delivering them.
    pub log_only: bool,
    pub smtp: Option<SmtpConfig>,
    pub vonage: Option<VonageConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct VonageConfig {
    pub api_key: String,
    pub api_secret: String,
    pub from_number: String,
    pub sandbox_enabled: bool,
    pub sandbox_from_number: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LifecycleConfig {
    pub sweep_hour_utc: u32,
    pub membership_days: i64,
    /// Offset of the civil calendar used for membership dates.
    pub utc_offset_minutes: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: 86_400,
            cookie_name: "jwt".to_string(),
            cookie_secure: false,
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            main_admin_email: "mainadmin@example.com".to_string(),
            main_admin_name: "Main Admin".to_string(),
            main_admin_mobile: "9999999999".to_string(),
            main_admin_password: None,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            users_folder: "ardu_users".to_string(),
            admins_folder: "ardu_admins".to_string(),
            posts_folder: "ardu_posts".to_string(),
            stories_folder: "ardu_stories".to_string(),
            max_video_seconds: 60,
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_attempts: 5,
            log_only: false,
            smtp: None,
            vonage: None,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            from: "no-reply@example.com".to_string(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_hour_utc: 2,
            membership_days: 364,
            utc_offset_minutes: 330,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref secret) = cli.jwt_secret {
            config.auth.jwt_secret = Some(secret.clone());
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("ardu.db"));
        }
        if config.lifecycle.sweep_hour_utc > 23 {
            anyhow::bail!(
                "lifecycle.sweep_hour_utc must be 0-23, got {}",
                config.lifecycle.sweep_hour_utc
            );
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
        match cli.data_dir.clone() {
            Some(dir) => Ok(dir),
            None => dirs::home_dir()
                .map(|home| home.join(".ardu"))
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory")),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ardu.db"))
    }
}
