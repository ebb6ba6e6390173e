//! SSH key material and one-shot loading

use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use russh::keys::{PrivateKey, decode_secret_key, load_secret_key};
use tracing::{info, warn};

/// Where the private key comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Key file on disk, optionally encrypted
    Path {
        path: PathBuf,
        passphrase: Option<String>,
    },
    /// Base64-encoded key held in an environment variable
    Env {
        var: String,
        passphrase: Option<String>,
    },
}

impl KeySource {
    /// Key file with no passphrase
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path {
            path: path.into(),
            passphrase: None,
        }
    }

    /// Description safe to log (never includes the passphrase)
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            KeySource::Path { path, .. } => format!("file {}", path.display()),
            KeySource::Env { var, .. } => format!("env {var}"),
        }
    }

    /// Parse the configured key into a usable private key
    ///
    /// # Errors
    /// Returns `KeyError` if the key is missing, too permissive or undecodable
    pub fn load(&self) -> Result<PrivateKey, KeyError> {
        match self {
            KeySource::Path { path, passphrase } => {
                if !path.exists() {
                    return Err(KeyError::NotFound(path.display().to_string()));
                }
                validate_key_permissions(path)?;
                load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| KeyError::Decode(e.to_string()))
            }
            KeySource::Env { var, passphrase } => {
                let encoded = env::var(var).map_err(|_| KeyError::EnvNotSet(var.clone()))?;
                let bytes = base64_decode(&encoded).map_err(|_| KeyError::InvalidBase64)?;
                let pem = String::from_utf8(bytes).map_err(|_| KeyError::InvalidBase64)?;
                decode_secret_key(&pem, passphrase.as_deref())
                    .map_err(|e| KeyError::Decode(e.to_string()))
            }
        }
    }
}

/// Key resolution errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("cannot decode key: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Loads the key once and hands out the cached result
///
/// A failed load is cached as well: every later dial sees the same
/// configuration error until the process is restarted with a fixed key.
pub struct KeyStore {
    source: KeySource,
    loaded: OnceLock<Result<Arc<PrivateKey>, KeyError>>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("source", &self.source.describe())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl KeyStore {
    pub fn new(source: KeySource) -> Self {
        Self {
            source,
            loaded: OnceLock::new(),
        }
    }

    /// The configured key source
    pub fn source(&self) -> &KeySource {
        &self.source
    }

    /// Get the key, loading it on first use
    ///
    /// # Errors
    /// Returns the (cached) `KeyError` if loading failed
    pub fn get(&self) -> Result<Arc<PrivateKey>, KeyError> {
        self.loaded
            .get_or_init(|| match self.source.load() {
                Ok(key) => {
                    info!(source = %self.source.describe(), "loaded ssh key");
                    Ok(Arc::new(key))
                }
                Err(e) => {
                    warn!(source = %self.source.describe(), error = %e, "ssh key unavailable");
                    Err(e)
                }
            })
            .clone()
    }

    /// Whether a load has been attempted
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| KeyError::Io(e.to_string()))?;

    // group and other bits must be clear
    if metadata.permissions().mode() & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}
