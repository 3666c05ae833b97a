//! Configuration management for the DIALS REST API.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `DIALS_REST_` prefix
//! - A secrets directory for file-based secret provisioning
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `DIALS_REST_HOST` - Server bind address (default: 0.0.0.0)
//! - `DIALS_REST_PORT` - Server port (default: 8000)
//! - `DIALS_REST_JWT_SECRET` - Shared secret for token signing (required)
//! - `DIALS_REST_SECRETS_DIR` - Directory holding a `jwt_secret` file
//!   (default: /opt/secrets), consulted when the secret is not set directly
//! - `DIALS_REST_AUTH_ENABLED` - Enforce authentication (default: true)
//! - `DIALS_REST_FIND_SPOTS_CMD` - Spot-finding helper executable
//! - `DIALS_REST_EXPORT_BITMAP_CMD` - Bitmap helper executable
//! - `DIALS_REST_CORS_ORIGINS` - Allowed CORS origins (comma-separated)

use std::path::PathBuf;
use std::time::SystemTime;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default secrets directory.
pub const DEFAULT_SECRETS_DIR: &str = "/opt/secrets";

/// Name of the secret file inside the secrets directory.
pub const SECRET_FILE_NAME: &str = "jwt_secret";

/// Default spot-finding helper executable.
pub const DEFAULT_FIND_SPOTS_CMD: &str = "dials.rest.find_spots";

/// Default bitmap export helper executable.
pub const DEFAULT_EXPORT_BITMAP_CMD: &str = "dials.rest.export_bitmap";

// =============================================================================
// CLI
// =============================================================================

/// DIALS REST API - a RESTful interface to a (limited) subset of DIALS.
///
/// Exposes spot-finding statistics and bitmap export over HTTP, protected by
/// JWT bearer authentication. The scientific computation is delegated to the
/// DIALS toolkit's helper executables.
#[derive(Parser, Debug)]
#[command(name = "dials-rest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the API server
    Serve(ServeConfig),

    /// Issue an access token and print it to stdout
    Token(TokenConfig),
}

// =============================================================================
// Shared Secret Configuration
// =============================================================================

/// Where the shared signing secret comes from.
///
/// Resolution order: the `--jwt-secret` flag / environment variable, then a
/// `jwt_secret` file inside the secrets directory. The resolved value is
/// never logged.
#[derive(Args, Debug, Clone)]
pub struct SecretConfig {
    /// Shared secret for signing and verifying access tokens.
    #[arg(long, env = "DIALS_REST_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Directory containing a `jwt_secret` file, consulted when the secret
    /// is not set directly.
    #[arg(long, default_value = DEFAULT_SECRETS_DIR, env = "DIALS_REST_SECRETS_DIR")]
    pub secrets_dir: PathBuf,
}

impl SecretConfig {
    /// Resolve the shared secret, reading the secrets directory if needed.
    pub fn resolve(&self) -> Result<String, String> {
        if let Some(secret) = &self.jwt_secret {
            if !secret.is_empty() {
                return Ok(secret.clone());
            }
        }

        let path = self.secrets_dir.join(SECRET_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let secret = contents.trim().to_string();
                if secret.is_empty() {
                    Err(format!("Secret file {} is empty", path.display()))
                } else {
                    Ok(secret)
                }
            }
            Err(_) => Err(format!(
                "No JWT secret configured. Set --jwt-secret or DIALS_REST_JWT_SECRET, \
                 or provide {}",
                path.display()
            )),
        }
    }
}

// =============================================================================
// Serve Configuration
// =============================================================================

/// Configuration for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "DIALS_REST_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "DIALS_REST_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub secret: SecretConfig,

    /// Enforce bearer authentication on the analysis routes.
    ///
    /// When disabled, all analysis requests are allowed without a token.
    /// WARNING: Only disable authentication in development/testing.
    #[arg(long, default_value_t = true, env = "DIALS_REST_AUTH_ENABLED")]
    pub auth_enabled: bool,

    /// Spot-finding helper executable.
    #[arg(long, default_value = DEFAULT_FIND_SPOTS_CMD, env = "DIALS_REST_FIND_SPOTS_CMD")]
    pub find_spots_cmd: String,

    /// Bitmap export helper executable.
    #[arg(long, default_value = DEFAULT_EXPORT_BITMAP_CMD, env = "DIALS_REST_EXPORT_BITMAP_CMD")]
    pub export_bitmap_cmd: String,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "DIALS_REST_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_enabled {
            self.secret.resolve()?;
        }

        if self.find_spots_cmd.is_empty() || self.export_bitmap_cmd.is_empty() {
            return Err("Backend helper executables must not be empty".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Token Configuration
// =============================================================================

/// Configuration for the `token` subcommand.
#[derive(Args, Debug, Clone)]
pub struct TokenConfig {
    #[command(flatten)]
    pub secret: SecretConfig,

    /// Absolute expiry instant, RFC 3339 (e.g. 2026-01-31T12:00:00Z).
    #[arg(long, short)]
    pub expiry: Option<String>,

    /// Token lifetime in seconds, counted from now.
    ///
    /// Ignored when --expiry is given; defaults to 30 minutes when neither
    /// is set.
    #[arg(long)]
    pub ttl: Option<u64>,
}

impl TokenConfig {
    /// Parse the explicit expiry, if any.
    pub fn expires_at(&self) -> Result<Option<SystemTime>, String> {
        match &self.expiry {
            None => Ok(None),
            Some(text) => chrono::DateTime::parse_from_rfc3339(text)
                .map(|dt| Some(SystemTime::from(dt)))
                .map_err(|e| {
                    format!("Invalid --expiry {text:?}: {e} (expected RFC 3339, e.g. 2026-01-31T12:00:00Z)")
                }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
