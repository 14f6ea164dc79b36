///
/// A processor with its own command set: arithmetic, random numbers,
/// text helpers and server statistics.
///
/// Run this example with:
/// cargo run --example custom_handler -- --listen 127.0.0.1:2223
///
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Local};
use clap::Parser;
use cmdsh::config::resolve_path;
use cmdsh::{CommandOutput, CommandProcessor, LogConfig, Server, ServerConfig};
use log::info;
use rand::Rng;

const HELP: &str = "Available Commands:
- echo <message>          Echo back the message
- calc <n1> <op> <n2>     Calculator (+, -, *, /)
- random [max]            Generate random number
- random <min> <max>      Generate random number in range
- stats                   Show server statistics
- time [format]           Show current time (unix, iso, rfc)
- reverse <text>          Reverse the text
- upper <text>            Convert to uppercase
- lower <text>            Convert to lowercase
- help                    Show this help message";

struct CustomHandler {
    started: Instant,
    started_at: DateTime<Local>,
    executed: AtomicU64,
}

impl CustomHandler {
    fn new() -> Self {
        CustomHandler {
            started: Instant::now(),
            started_at: Local::now(),
            executed: AtomicU64::new(0),
        }
    }

    fn stats(&self) -> CommandOutput {
        let uptime = Duration::from_secs(self.started.elapsed().as_secs());
        CommandOutput::success(format!(
            "Server Statistics:\n- Uptime: {:?}\n- Commands executed: {}\n- Started at: {}",
            uptime,
            self.executed.load(Ordering::Relaxed),
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        ))
    }
}

fn usage(text: &str) -> CommandOutput {
    CommandOutput::failure(format!("Usage: {}", text))
}

fn calc(args: &[&str]) -> CommandOutput {
    let [a, op, b] = args else {
        return usage("calc <number1> <operator> <number2>\nOperators: +, -, *, /");
    };
    let Ok(x) = a.parse::<f64>() else {
        return CommandOutput::failure(format!("Invalid number: {}", a));
    };
    let Ok(y) = b.parse::<f64>() else {
        return CommandOutput::failure(format!("Invalid number: {}", b));
    };
    let result = match *op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" if y == 0.0 => return CommandOutput::failure("Error: Division by zero"),
        "/" => x / y,
        other => return CommandOutput::failure(format!("Unknown operator: {}", other)),
    };
    CommandOutput::success(format!("{:.2} {} {:.2} = {:.2}", x, op, y, result))
}

fn random(args: &[&str]) -> CommandOutput {
    const USAGE: &str = "random [max] or random <min> <max>";
    let mut rng = rand::thread_rng();
    match args {
        [] => CommandOutput::success(format!("Random number: {}", rng.gen_range(1..=100))),
        [max] => match max.parse::<i64>() {
            Ok(max) if max >= 1 => CommandOutput::success(format!(
                "Random number (1-{}): {}",
                max,
                rng.gen_range(1..=max)
            )),
            _ => usage(USAGE),
        },
        [min, max] => match (min.parse::<i64>(), max.parse::<i64>()) {
            (Ok(min), Ok(max)) if min < max => CommandOutput::success(format!(
                "Random number ({}-{}): {}",
                min,
                max,
                rng.gen_range(min..=max)
            )),
            (Ok(_), Ok(_)) => CommandOutput::failure("Error: min must be less than max"),
            _ => usage(USAGE),
        },
        _ => usage(USAGE),
    }
}

fn time(args: &[&str]) -> CommandOutput {
    let now = Local::now();
    match args.join(" ").as_str() {
        "" => CommandOutput::success(format!(
            "Current time: {}",
            now.format("%Y-%m-%d %H:%M:%S")
        )),
        "unix" => CommandOutput::success(format!("Unix timestamp: {}", now.timestamp())),
        "iso" => CommandOutput::success(format!("ISO format: {}", now.to_rfc3339())),
        "rfc" => CommandOutput::success(format!("RFC format: {}", now.to_rfc2822())),
        other => CommandOutput::failure(format!(
            "Unknown time format: {}\nAvailable: unix, iso, rfc",
            other
        )),
    }
}

impl CommandProcessor for CustomHandler {
    fn execute(&self, command: &str) -> CommandOutput {
        self.executed.fetch_add(1, Ordering::Relaxed);
        let words: Vec<&str> = command.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return CommandOutput::success("");
        };
        let text = args.join(" ");

        match name {
            "echo" if args.is_empty() => usage("echo <message>"),
            "echo" => CommandOutput::success(text),
            "calc" => calc(args),
            "random" => random(args),
            "stats" => self.stats(),
            "time" => time(args),
            "reverse" if args.is_empty() => usage("reverse <text>"),
            "reverse" => CommandOutput::success(text.chars().rev().collect::<String>()),
            "upper" if args.is_empty() => usage("upper <text>"),
            "upper" => CommandOutput::success(text.to_uppercase()),
            "lower" if args.is_empty() => usage("lower <text>"),
            "lower" => CommandOutput::success(text.to_lowercase()),
            "help" => CommandOutput::success(HELP),
            other => CommandOutput::failure(format!(
                "Unknown command: {}\nType 'help' for available commands",
                other
            )),
        }
    }

    fn prompt(&self) -> String {
        "custom> ".into()
    }

    fn welcome_message(&self) -> String {
        "Welcome to Custom SSH Server!\n\
         This server has enhanced commands for calculations, text processing, and more.\n\
         Type 'help' to see all available commands."
            .into()
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
            file_path: Some(PathBuf::from("custom_server.log")),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut server = Server::new(config, Arc::new(CustomHandler::new()))?;
    server.start().await?;
    if let Some(addr) = server.local_addr() {
        info!("Custom SSH server started on {}", addr);
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down server...");
    server.stop().await;
    Ok(())
}

#[derive(clap::Parser)]
pub struct Cli {
    #[clap(long, short, default_value = "0.0.0.0:2223")]
    listen: String,

    #[clap(long, default_value = "server_key")]
    host_key: PathBuf,

    #[clap(long, default_value = "authorized_keys")]
    authorized_keys: PathBuf,

    #[clap(long)]
    no_client_auth: bool,
}
