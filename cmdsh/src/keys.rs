//! Host key loading and generation.

use std::path::Path;

use log::info;
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::LineEnding;
use russh::keys::{Algorithm, PrivateKey};

use crate::Result;

/// Loads an OpenSSH private key. Encrypted keys are not supported.
pub fn load_host_key<P: AsRef<Path>>(path: P) -> Result<PrivateKey> {
    Ok(russh::keys::load_secret_key(path, None)?)
}

/// A fresh Ed25519 key, not written anywhere.
pub fn generate_host_key() -> Result<PrivateKey> {
    Ok(PrivateKey::random(&mut OsRng, Algorithm::Ed25519)?)
}

/// Loads the host key at `path`, creating an Ed25519 key there first
/// if the file does not exist. New key files are only readable by
/// their owner.
pub fn load_or_generate_host_key<P: AsRef<Path>>(path: P) -> Result<PrivateKey> {
    let path = path.as_ref();
    if path.exists() {
        return load_host_key(path);
    }

    info!("generating a new Ed25519 host key at {}", path.display());
    let key = generate_host_key()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let encoded = key.to_openssh(LineEnding::LF)?;
    std::fs::write(path, encoded.as_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(key)
}
