//! Configuration file management for waypoint.
//!
//! Provides a TOML-based config file at `~/.config/waypoint/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use waypoint_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub services: ServicesSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServicesSection {
    /// Base URL of the semantic retrieval service.
    pub retrieval_url: String,
    /// Base URL of the question-authoring service.
    pub authoring_url: String,
    /// Base URL of the content-snippet store.
    pub content_url: String,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            retrieval_url: ServiceEndpoints::DEFAULT_RETRIEVAL_URL.to_string(),
            authoring_url: ServiceEndpoints::DEFAULT_AUTHORING_URL.to_string(),
            content_url: ServiceEndpoints::DEFAULT_CONTENT_URL.to_string(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the waypoint config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/waypoint` or `~/.config/waypoint`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("waypoint");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("waypoint")
}

/// Return the path to the waypoint config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Resolved base URLs for the downstream collaborators.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub retrieval_url: String,
    pub authoring_url: String,
    pub content_url: String,
}

impl ServiceEndpoints {
    pub const DEFAULT_RETRIEVAL_URL: &str = "http://localhost:8001";
    pub const DEFAULT_AUTHORING_URL: &str = "http://localhost:8002";
    pub const DEFAULT_CONTENT_URL: &str = "http://localhost:8003";
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct WaypointConfig {
    pub db_config: DbConfig,
    pub services: ServiceEndpoints,
}

impl WaypointConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - DB URL: `cli_db_url` > `WAYPOINT_DATABASE_URL` env >
    ///   `config_file.database.url` > `DbConfig::DEFAULT_URL`
    /// - Service URLs: `WAYPOINT_{RETRIEVAL,AUTHORING,CONTENT}_URL` env >
    ///   `config_file.services.*` > compiled defaults
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        // DB URL resolution.
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("WAYPOINT_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        let resolve_service = |env_key: &str, from_file: Option<&String>, default: &str| {
            if let Ok(url) = std::env::var(env_key) {
                url
            } else if let Some(url) = from_file {
                url.clone()
            } else {
                default.to_string()
            }
        };

        let services = ServiceEndpoints {
            retrieval_url: resolve_service(
                "WAYPOINT_RETRIEVAL_URL",
                file_config.as_ref().map(|c| &c.services.retrieval_url),
                ServiceEndpoints::DEFAULT_RETRIEVAL_URL,
            ),
            authoring_url: resolve_service(
                "WAYPOINT_AUTHORING_URL",
                file_config.as_ref().map(|c| &c.services.authoring_url),
                ServiceEndpoints::DEFAULT_AUTHORING_URL,
            ),
            content_url: resolve_service(
                "WAYPOINT_CONTENT_URL",
                file_config.as_ref().map(|c| &c.services.content_url),
                ServiceEndpoints::DEFAULT_CONTENT_URL,
            ),
        };

        Ok(Self {
            db_config,
            services,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use super::*;

    /// Env-var manipulation is process-global; serialize the tests that do it.
    fn lock_env() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clear_waypoint_env() {
        for key in [
            "WAYPOINT_DATABASE_URL",
            "WAYPOINT_RETRIEVAL_URL",
            "WAYPOINT_AUTHORING_URL",
            "WAYPOINT_CONTENT_URL",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("waypoint");
        let path = dir.join("config.toml");

        let original = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            services: ServicesSection {
                retrieval_url: "http://retrieval:9000".to_string(),
                authoring_url: "http://authoring:9001".to_string(),
                content_url: "http://content:9002".to_string(),
            },
        };

        std::fs::create_dir_all(&dir).unwrap();
        let contents = toml::to_string_pretty(&original).unwrap();
        std::fs::write(&path, &contents).unwrap();

        let loaded_contents = std::fs::read_to_string(&path).unwrap();
        let loaded: ConfigFile = toml::from_str(&loaded_contents).unwrap();

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.services.retrieval_url, original.services.retrieval_url);
        assert_eq!(loaded.services.content_url, original.services.content_url);
    }

    #[test]
    fn config_file_without_services_section_uses_defaults() {
        let parsed: ConfigFile =
            toml::from_str("[database]\nurl = \"postgresql://localhost:5432/waypoint\"\n")
                .expect("services section should be optional");
        assert_eq!(
            parsed.services.retrieval_url,
            ServiceEndpoints::DEFAULT_RETRIEVAL_URL
        );
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();
        clear_waypoint_env();

        unsafe { std::env::set_var("WAYPOINT_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config = WaypointConfig::resolve(Some("postgresql://cli:5432/clidb")).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        clear_waypoint_env();
    }

    #[test]
    fn resolve_with_env_var_overrides_defaults() {
        let _lock = lock_env();
        clear_waypoint_env();

        // Point the config lookup at an empty temp dir so a developer's real
        // config file cannot interfere with the default assertions.
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        unsafe { std::env::set_var("WAYPOINT_DATABASE_URL", "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var("WAYPOINT_RETRIEVAL_URL", "http://env-retrieval:1234") };

        let config = WaypointConfig::resolve(None).unwrap();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        clear_waypoint_env();

        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.services.retrieval_url, "http://env-retrieval:1234");
        assert_eq!(
            config.services.authoring_url,
            ServiceEndpoints::DEFAULT_AUTHORING_URL
        );
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();
        clear_waypoint_env();

        // Point HOME and XDG_CONFIG_HOME at a temp dir so a real config file
        // cannot interfere.
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_home = std::env::var("HOME").ok();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("HOME", tmp.path()) };
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };

        let config = WaypointConfig::resolve(None).unwrap();

        match orig_home {
            Some(h) => unsafe { std::env::set_var("HOME", h) },
            None => unsafe { std::env::remove_var("HOME") },
        }
        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(
            config.services.retrieval_url,
            ServiceEndpoints::DEFAULT_RETRIEVAL_URL
        );
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("waypoint/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
