//! Application configuration management.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via `-f` flag or
//! `PHOTODROP_CONFIG` environment variable. A missing file is not an error: every field has a
//! default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `PHOTODROP_` override YAML values
//! 3. **PORT** - Special case: overrides `port` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `PHOTODROP_UPLOADS__MAX_FILE_SIZE=1048576` sets the `uploads.max_file_size` field.
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 3001
//! public_dir: public
//! uploads:
//!   subdir: uploads/profile-photos
//!   max_file_size: 5242880
//!   allowed_mime_prefix: "image/"
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "PHOTODROP_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Directory served as static files; uploads live underneath it
    pub public_dir: PathBuf,
    /// Upload handling
    pub uploads: UploadsConfig,
}

/// Upload storage and validation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Directory for stored photos, relative to `public_dir`. Also the URL prefix of the
    /// returned paths.
    pub subdir: PathBuf,
    /// Maximum file size in bytes.
    /// Default: 5MB
    pub max_file_size: u64,
    /// Declared content type of the file part must start with this.
    pub allowed_mime_prefix: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            subdir: PathBuf::from("uploads/profile-photos"),
            max_file_size: 5 * 1024 * 1024, // 5MB
            allowed_mime_prefix: "image/".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            public_dir: PathBuf::from("public"),
            uploads: UploadsConfig::default(),
        }
    }
}

/// Reasons a loaded configuration is rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("uploads.max_file_size must be greater than 0")]
    ZeroFileSize,
    #[error("uploads.subdir must be a relative path without '..' components, got {0:?}")]
    InvalidSubdir(PathBuf),
    #[error("uploads.allowed_mime_prefix must not be empty")]
    EmptyMimePrefix,
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uploads.max_file_size == 0 {
            return Err(ConfigError::ZeroFileSize);
        }

        if !is_plain_relative(&self.uploads.subdir) {
            return Err(ConfigError::InvalidSubdir(self.uploads.subdir.clone()));
        }

        if self.uploads.allowed_mime_prefix.is_empty() {
            return Err(ConfigError::EmptyMimePrefix);
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // PHOTODROP_CONFIG names the file itself and is consumed by clap
            .merge(Env::prefixed("PHOTODROP_").ignore(&["CONFIG"]).split("__"))
            // Conventional PORT variable used by most hosting platforms
            .merge(Env::raw().only(&["PORT"]).map(|_| "port".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute-or-cwd-relative directory the photos are written to.
    pub fn upload_dir(&self) -> PathBuf {
        self.public_dir.join(&self.uploads.subdir)
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components().next().is_some() && path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.host, "0.0.0.0");
            assert_eq!(config.port, 3001);
            assert_eq!(config.public_dir, PathBuf::from("public"));
            assert_eq!(config.uploads.max_file_size, 5_242_880);
            assert_eq!(config.upload_dir(), PathBuf::from("public/uploads/profile-photos"));

            Ok(())
        });
    }

    #[test]
    fn test_port_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("PORT", "8080");

            let config = Config::load(&args("config.yaml"))?;
            assert_eq!(config.port, 8080);
            assert_eq!(config.bind_address(), "0.0.0.0:8080");

            Ok(())
        });
    }

    #[test]
    fn test_port_env_beats_prefixed_env_and_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 4000\n")?;
            jail.set_env("PHOTODROP_PORT", "5000");
            jail.set_env("PORT", "6000");

            let config = Config::load(&args("test.yaml"))?;
            assert_eq!(config.port, 6000);

            Ok(())
        });
    }

    #[test]
    fn test_yaml_and_nested_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
host: 127.0.0.1
public_dir: /srv/www
uploads:
  subdir: avatars
  max_file_size: 1024
"#,
            )?;
            jail.set_env("PHOTODROP_UPLOADS__MAX_FILE_SIZE", "2048");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.upload_dir(), PathBuf::from("/srv/www/avatars"));
            // Env vars should override
            assert_eq!(config.uploads.max_file_size, 2048);
            // Untouched values keep their defaults
            assert_eq!(config.uploads.allowed_mime_prefix, "image/");

            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "database_url: postgres://nope\n")?;
            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validation_zero_file_size() {
        let mut config = Config::default();
        config.uploads.max_file_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroFileSize)));
    }

    #[test]
    fn test_validation_subdir_must_stay_inside_public_dir() {
        for bad in ["../outside", "/etc", "uploads/../../x", ""] {
            let mut config = Config::default();
            config.uploads.subdir = PathBuf::from(bad);
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidSubdir(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validation_empty_mime_prefix() {
        let mut config = Config::default();
        config.uploads.allowed_mime_prefix.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyMimePrefix)));
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(Config::default().validate().is_ok());
    }
}
