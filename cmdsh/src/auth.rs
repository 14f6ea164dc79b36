//! Public key authentication against an `authorized_keys` file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use russh::keys::ssh_key::{AuthorizedKeys, Fingerprint};
use russh::keys::{HashAlg, PublicKey};

use crate::{Error, Result};

/// Extension under which [Permissions] records the fingerprint of the
/// accepted key.
pub const PUBKEY_FINGERPRINT: &str = "pubkey-fp";

/// What an accepted authentication attempt grants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    pub extensions: HashMap<String, String>,
}

impl Permissions {
    /// SHA-256 fingerprint of the key that was accepted.
    pub fn fingerprint(&self) -> Option<&str> {
        self.extensions.get(PUBKEY_FINGERPRINT).map(String::as_str)
    }
}

/// The set of keys allowed to log in, kept in an OpenSSH
/// `authorized_keys` file.
///
/// The file is read again on every lookup, so keys can be added or
/// revoked without restarting the server.
#[derive(Debug, Clone)]
pub struct TrustStore {
    path: PathBuf,
}

impl TrustStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        TrustStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a key with this exact fingerprint is listed. Entries are
    /// parsed in order; an unreadable file, or a malformed entry before
    /// the match, is an error.
    pub fn contains(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Auth(format!(
                "failed to load {}: {}",
                self.path.display(),
                e
            ))
        })?;
        for entry in AuthorizedKeys::new(&contents) {
            let entry = entry.map_err(|e| {
                Error::Auth(format!(
                    "error parsing authorized key in {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            if entry.public_key().fingerprint(HashAlg::Sha256) == *fingerprint {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Decides whether a connecting user may log in.
#[derive(Debug, Clone)]
pub struct Authenticator {
    trust_store: TrustStore,
}

impl Authenticator {
    pub fn new(trust_store: TrustStore) -> Self {
        Authenticator { trust_store }
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }

    /// Accepts `key` if the trust store lists it. Fails closed: any
    /// problem with the trust store rejects the key.
    pub fn check_public_key(&self, user: &str, key: &PublicKey) -> Result<Permissions> {
        let fingerprint = key.fingerprint(HashAlg::Sha256);
        debug!(
            "attempting to authenticate user {} with key {}",
            user, fingerprint
        );
        match self.trust_store.contains(&fingerprint) {
            Ok(true) => {
                info!("public key authentication successful for user: {}", user);
                let mut permissions = Permissions::default();
                permissions
                    .extensions
                    .insert(PUBKEY_FINGERPRINT.to_string(), fingerprint.to_string());
                Ok(permissions)
            }
            Ok(false) => Err(Error::Auth(format!(
                "public key authentication failed for {:?}",
                user
            ))),
            Err(e) => {
                warn!("{}", e);
                Err(e)
            }
        }
    }

    /// Keyboard-interactive authentication is never granted.
    pub fn check_keyboard_interactive(&self, user: &str) -> Result<Permissions> {
        info!("keyboard interactive auth attempt from user {}", user);
        Err(Error::Auth(
            "keyboard-interactive authentication not supported".into(),
        ))
    }
}
