use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use russh::{MethodKind, MethodSet};

use crate::{keys, Error, Result};

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Turns logging on or off.
    pub enabled: bool,
    /// Append log records to this file.
    pub file_path: Option<PathBuf>,
    /// Also write log records to stdout.
    pub log_to_stdout: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            enabled: true,
            file_path: Some(PathBuf::from("ssh_server.log")),
            log_to_stdout: true,
        }
    }
}

/// Configuration of a [Server](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address and port to listen on, e.g. `0.0.0.0:2222`.
    pub listen_address: String,
    /// OpenSSH private key identifying the server.
    pub host_key_file: PathBuf,
    /// `authorized_keys` file listing the keys allowed to log in.
    pub authorized_keys_file: PathBuf,
    /// Let every client in without authentication.
    pub no_client_auth: bool,
    /// Advertise keyboard-interactive authentication. Such attempts
    /// are always rejected.
    pub allow_keyboard_interactive: bool,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_address: "0.0.0.0:2222".to_string(),
            host_key_file: PathBuf::from("server_key"),
            authorized_keys_file: PathBuf::from("authorized_keys"),
            no_client_auth: false,
            allow_keyboard_interactive: false,
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Checks that the server can run with this configuration. When
    /// client authentication is required, both the host key and the
    /// authorized keys file must exist.
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.is_empty() {
            return Err(Error::Config("listen address cannot be empty".into()));
        }
        if self.no_client_auth {
            return Ok(());
        }
        if self.host_key_file.as_os_str().is_empty() {
            return Err(Error::Config(
                "host key file path cannot be empty when client auth is enabled".into(),
            ));
        }
        if self.authorized_keys_file.as_os_str().is_empty() {
            return Err(Error::Config(
                "authorized keys file path cannot be empty when client auth is enabled".into(),
            ));
        }
        if let Err(e) = std::fs::metadata(&self.host_key_file) {
            return Err(Error::Config(format!(
                "host key file not found at {}: {}",
                self.host_key_file.display(),
                e
            )));
        }
        if let Err(e) = std::fs::metadata(&self.authorized_keys_file) {
            return Err(Error::Config(format!(
                "authorized keys file not found at {}: {}",
                self.authorized_keys_file.display(),
                e
            )));
        }
        Ok(())
    }

    /// Builds the transport configuration: host key, advertised
    /// authentication methods, and no inactivity timeout.
    pub(crate) fn russh_config(&self) -> Result<Arc<russh::server::Config>> {
        let host_key = if self.no_client_auth && !self.host_key_file.exists() {
            warn!(
                "host key {} not found, using an ephemeral key",
                self.host_key_file.display()
            );
            keys::generate_host_key()?
        } else {
            keys::load_host_key(&self.host_key_file)?
        };

        let methods: &[MethodKind] = match (self.no_client_auth, self.allow_keyboard_interactive) {
            (true, _) => &[MethodKind::None],
            (false, true) => &[MethodKind::PublicKey, MethodKind::KeyboardInteractive],
            (false, false) => &[MethodKind::PublicKey],
        };

        Ok(Arc::new(russh::server::Config {
            methods: MethodSet::from(methods),
            keys: vec![host_key],
            inactivity_timeout: None,
            auth_rejection_time: std::time::Duration::from_secs(1),
            auth_rejection_time_initial: Some(std::time::Duration::ZERO),
            ..Default::default()
        }))
    }
}

/// Resolves a relative path against the working directory, then
/// against the directory of the running executable. The first
/// candidate that exists wins; otherwise `path` is returned as is.
pub fn resolve_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let cwd = std::env::current_dir().ok();
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    cwd.into_iter()
        .chain(exe_dir)
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}
