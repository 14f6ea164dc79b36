///
/// A chat room: every authenticated user gets their own processor, and
/// all processors share one room.
///
/// Run this example with:
/// cargo run --example chat_server -- --listen 127.0.0.1:2226
///
/// then connect with `ssh -p 2226 <username>@localhost` from several
/// terminals.
///
use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Local};
use clap::Parser;
use cmdsh::config::resolve_path;
use cmdsh::{CommandOutput, CommandProcessor, LogConfig, Server, ServerConfig};
use log::info;

const MAX_MESSAGES: usize = 100;
const MAX_HISTORY: usize = 50;

const HELP: &str = "Chat Commands:
/help                Show this help message
/users, /who         List online users
/history [count]     Show recent messages (default: 10)
/me <action>         Send an action message
/stats               Show chat statistics
/time                Show current time
/quit, /exit         Leave the chat

To send a message, just type it and press Enter.
Messages starting with / are treated as commands.";

#[derive(Clone)]
enum Kind {
    Message,
    Action,
    Notice,
}

#[derive(Clone)]
struct Message {
    from: String,
    text: String,
    at: DateTime<Local>,
    kind: Kind,
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let at = self.at.format("%H:%M:%S");
        match self.kind {
            Kind::Message => write!(f, "[{}] <{}> {}", at, self.from, self.text),
            Kind::Action => write!(f, "[{}] * {} {}", at, self.from, self.text),
            Kind::Notice => write!(f, "[{}] * {}", at, self.text),
        }
    }
}

#[derive(Default)]
struct Room {
    users: BTreeSet<String>,
    messages: VecDeque<Message>,
}

impl Room {
    fn post(&mut self, from: &str, text: String, kind: Kind) {
        self.messages.push_back(Message {
            from: from.to_string(),
            text,
            at: Local::now(),
            kind,
        });
        while self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }
    }
}

/// State shared by every connected user.
#[derive(Default)]
struct ChatRoom {
    inner: Mutex<Room>,
}

impl ChatRoom {
    fn lock(&self) -> MutexGuard<'_, Room> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn join(&self, user: &str) {
        let mut room = self.lock();
        if room.users.insert(user.to_string()) {
            room.post(user, format!("{} joined the chat", user), Kind::Notice);
        }
    }

    fn leave(&self, user: &str) {
        let mut room = self.lock();
        if room.users.remove(user) {
            room.post(user, format!("{} left the chat", user), Kind::Notice);
        }
    }

    fn say(&self, user: &str, text: String, kind: Kind) {
        self.lock().post(user, text, kind);
    }

    fn users(&self) -> Vec<String> {
        self.lock().users.iter().cloned().collect()
    }

    fn recent(&self, count: usize) -> Vec<Message> {
        let room = self.lock();
        let skip = room.messages.len().saturating_sub(count);
        room.messages.iter().skip(skip).cloned().collect()
    }
}

struct ChatHandler {
    user: String,
    room: Arc<ChatRoom>,
}

impl ChatHandler {
    fn list_users(&self) -> String {
        let users = self.room.users();
        if users.is_empty() {
            return "No users online".into();
        }
        let mut out = format!("Online users ({}):", users.len());
        for user in users {
            out.push_str("\n  ");
            out.push_str(&user);
            if user == self.user {
                out.push_str(" (you)");
            }
        }
        out
    }

    fn history(&self, args: &[&str]) -> CommandOutput {
        let count = match args.first() {
            None => 10,
            Some(n) => match n.parse::<usize>() {
                Ok(n) => n.min(MAX_HISTORY),
                Err(_) => return CommandOutput::failure("Usage: /history [count]"),
            },
        };
        let messages = self.room.recent(count);
        if messages.is_empty() {
            return CommandOutput::success("No messages in history");
        }
        let mut out = format!("Last {} messages:", messages.len());
        for message in messages {
            out.push_str(&format!("\n{}", message));
        }
        CommandOutput::success(out)
    }

    fn stats(&self) -> String {
        let messages = self.room.recent(MAX_MESSAGES);
        let mut out = format!(
            "=== CHAT STATISTICS ===\nOnline users: {}\nTotal messages: {}",
            self.room.users().len(),
            messages.len()
        );
        if let (Some(first), Some(last)) = (messages.first(), messages.last()) {
            out.push_str(&format!(
                "\nChat duration: {}s",
                (last.at - first.at).num_seconds()
            ));
        }
        out
    }
}

impl CommandProcessor for ChatHandler {
    fn execute(&self, command: &str) -> CommandOutput {
        let command = command.trim();
        self.room.join(&self.user);
        let words: Vec<&str> = command.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return CommandOutput::success("");
        };

        match name {
            "/help" => CommandOutput::success(HELP),
            "/users" | "/who" => CommandOutput::success(self.list_users()),
            "/history" => self.history(args),
            "/me" if args.is_empty() => CommandOutput::failure("Usage: /me <action>"),
            "/me" => {
                self.room.say(&self.user, args.join(" "), Kind::Action);
                CommandOutput::success("")
            }
            "/quit" | "/exit" => {
                self.room.leave(&self.user);
                CommandOutput::success("Goodbye! Disconnecting...")
            }
            "/stats" => CommandOutput::success(self.stats()),
            "/time" => CommandOutput::success(format!(
                "Current time: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            )),
            other if other.starts_with('/') => CommandOutput::failure(format!(
                "Unknown command: {}\nType /help for available commands",
                other
            )),
            _ => {
                self.room.say(&self.user, command.to_string(), Kind::Message);
                CommandOutput::success("")
            }
        }
    }

    fn prompt(&self) -> String {
        format!("[{}] ", self.user)
    }

    fn welcome_message(&self) -> String {
        format!(
            "Welcome to the Chat Server, {}!\n\
             There are currently {} users online.\n\
             Type /help for commands or just start chatting!\n\
             Type /users to see who's online.",
            self.user,
            self.room.users().len()
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ServerConfig {
        listen_address: cli.listen,
        host_key_file: resolve_path(cli.host_key),
        authorized_keys_file: resolve_path(cli.authorized_keys),
        no_client_auth: cli.no_client_auth,
        log: LogConfig {
            file_path: Some(PathBuf::from("chat_server.log")),
            ..Default::default()
        },
        ..Default::default()
    };

    let room = Arc::new(ChatRoom::default());
    let mut server = Server::with_factory(config, move |user: &str| {
        let processor: Arc<dyn CommandProcessor> = Arc::new(ChatHandler {
            user: user.to_string(),
            room: room.clone(),
        });
        processor
    })?;
    server.start().await?;
    if let Some(addr) = server.local_addr() {
        info!("Chat server started on {}", addr);
        info!("Connect with: ssh -p {} <username>@localhost", addr.port());
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down chat server...");
    server.stop().await;
    Ok(())
}

#[derive(clap::Parser)]
pub struct Cli {
    #[clap(long, short, default_value = "0.0.0.0:2226")]
    listen: String,

    #[clap(long, default_value = "server_key")]
    host_key: PathBuf,

    #[clap(long, default_value = "authorized_keys")]
    authorized_keys: PathBuf,

    #[clap(long)]
    no_client_auth: bool,
}
