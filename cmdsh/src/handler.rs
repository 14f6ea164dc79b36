//! A ready-made [CommandProcessor] dispatching on command names.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::debug;

use crate::{CommandOutput, CommandProcessor, Error, Result};

/// The body of a command registered on a [DefaultCommandHandler].
pub type Command = dyn Fn() -> Result<String> + Send + Sync;

type Registry = BTreeMap<String, Arc<Command>>;

/// Runs commands looked up by exact name. Comes with `hello`,
/// `getDate`, `uptime` and `help`; more can be added with
/// [DefaultCommandHandler::register_command], even while serving.
pub struct DefaultCommandHandler {
    commands: Arc<RwLock<Registry>>,
}

impl Default for DefaultCommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCommandHandler {
    pub fn new() -> Self {
        let handler = DefaultCommandHandler {
            commands: Arc::new(RwLock::new(BTreeMap::new())),
        };

        handler.register_command("hello", || Ok("Hello from SSH Server!".to_string()));
        handler.register_command("getDate", || {
            Ok(format!(
                "Current server time: {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            ))
        });
        handler.register_command("uptime", || Ok(format_uptime(system_uptime()?)));

        let registry = Arc::downgrade(&handler.commands);
        handler.register_command("help", move || {
            let names = match registry.upgrade() {
                Some(commands) => read(&commands).keys().cloned().collect::<Vec<_>>(),
                None => Vec::new(),
            };
            Ok(format!("Available commands: {}", names.join(", ")))
        });

        handler
    }

    /// Adds `command` under `name`, replacing any command already
    /// registered with that name.
    pub fn register_command<F>(&self, name: &str, command: F)
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        let mut commands = self.commands.write().unwrap_or_else(|e| e.into_inner());
        commands.insert(name.to_string(), Arc::new(command));
    }

    fn lookup(&self, name: &str) -> Option<Arc<Command>> {
        read(&self.commands).get(name).cloned()
    }
}

fn read(commands: &RwLock<Registry>) -> std::sync::RwLockReadGuard<'_, Registry> {
    commands.read().unwrap_or_else(|e| e.into_inner())
}

impl CommandProcessor for DefaultCommandHandler {
    fn execute(&self, command: &str) -> CommandOutput {
        let command = command.trim();
        if command.is_empty() {
            return CommandOutput::success("");
        }
        // The lock is released before running, so commands may
        // register other commands.
        let Some(body) = self.lookup(command) else {
            debug!("unknown command {:?}", command);
            return CommandOutput::failure(format!(
                "Unknown command: {}\nUse 'help' to see available commands",
                command
            ));
        };
        match body() {
            Ok(output) => CommandOutput::success(output),
            Err(e) => CommandOutput::failure(format!("Error: {}", e)),
        }
    }

    fn prompt(&self) -> String {
        "$ ".into()
    }

    fn welcome_message(&self) -> String {
        "Welcome to SSH Server!\nType 'help' to see available commands".into()
    }
}

#[cfg(target_os = "linux")]
fn system_uptime() -> Result<Duration> {
    let contents = std::fs::read_to_string("/proc/uptime")
        .map_err(|e| Error::Command(format!("error getting system info: {}", e)))?;
    contents
        .split_whitespace()
        .next()
        .and_then(|seconds| seconds.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
        .ok_or_else(|| Error::Command("error getting system info: unreadable /proc/uptime".into()))
}

#[cfg(not(target_os = "linux"))]
fn system_uptime() -> Result<Duration> {
    Err(Error::Command(
        "error getting system info: not supported on this platform".into(),
    ))
}

fn format_uptime(uptime: Duration) -> String {
    let minutes = uptime.as_secs() / 60;
    format!(
        "Server uptime: {} days, {} hours, {} minutes",
        minutes / (24 * 60),
        (minutes / 60) % 24,
        minutes % 60
    )
}
