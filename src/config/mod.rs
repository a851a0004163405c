//! Configuration management
//!
//! arpguard.toml is what the operator writes; arpguard.lock is its
//! generated form with every default made explicit, which the daemon
//! consumes. The lock carries a digest of its source so drift between the
//! two files is visible.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, Diagnostic, Severity, ValidationResult};

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Read and parse a TOML file into any config-layer type, carrying the
/// path in the error so diagnostics name the offending file.
fn read_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let content = std::fs::read_to_string(&path).map_err(Error::Io)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))
}

/// Load the user-written configuration
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    read_toml(path)
}

/// Load a generated lock file
pub fn load_lock<P: AsRef<Path>>(path: P) -> Result<ConfigLock> {
    read_toml(path)
}

/// Generate a lock file, stamping it with a digest of the source text
pub fn generate_lock(config: &Config, source_content: &str) -> ConfigLock {
    ConfigLock::from_config(config, source_digest(source_content))
}

fn source_digest(content: &str) -> String {
    Sha256::digest(content.as_bytes())
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}
