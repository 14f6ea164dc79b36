//! Log sink wiring.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use crate::{LogConfig, Result};

/// Writes every record to stdout and/or an append-only file.
struct Tee {
    stdout: Option<io::Stdout>,
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(ref mut stdout) = self.stdout {
            stdout.write_all(buf)?;
        }
        if let Some(ref mut file) = self.file {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(ref mut stdout) = self.stdout {
            stdout.flush()?;
        }
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }
}

fn open_sink(config: &LogConfig) -> Result<Tee> {
    let file = match config.file_path {
        Some(ref path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
        None => None,
    };
    Ok(Tee {
        stdout: config.log_to_stdout.then(io::stdout),
        file,
    })
}

/// Installs the global logger described by `config`, at `info` level
/// unless `RUST_LOG` says otherwise. Does nothing when logging is
/// disabled, or when a logger is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    let sink = open_sink(config)?;
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(sink)))
        .try_init();
    Ok(())
}
