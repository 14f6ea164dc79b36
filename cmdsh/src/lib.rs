#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
// Copyright 2016 Pierre-Étienne Meunier
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A command-oriented session server built on top of
//! [russh](https://docs.rs/russh).
//!
//! Each accepted connection is authenticated against an
//! `authorized_keys` file, then multiplexed into session channels. A
//! session channel runs in one of two modes:
//!
//! * `exec`: one command is decoded from the request, passed to the
//!   [CommandProcessor], and its output and exit status are sent back
//!   before the channel is closed.
//! * `shell`: an interactive, locally echoed line editor hands every
//!   completed line to the [CommandProcessor].
//!
//! The business logic lives entirely in the processor:
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmdsh::{CommandOutput, CommandProcessor, Server, ServerConfig};
//!
//! struct Echo;
//!
//! impl CommandProcessor for Echo {
//!     fn execute(&self, command: &str) -> CommandOutput {
//!         CommandOutput::success(command)
//!     }
//!     fn prompt(&self) -> String {
//!         "echo> ".into()
//!     }
//!     fn welcome_message(&self) -> String {
//!         "Everything you type comes back.".into()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cmdsh::Error> {
//!     let mut config = ServerConfig::default();
//!     config.listen_address = "127.0.0.1:2222".into();
//!     let mut server = Server::new(config, Arc::new(Echo))?;
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Shutting down
//!
//! [Server::stop] closes the listener and then waits for every
//! connection to end on its own: a peer idling in a shell keeps it
//! from returning. [Server::force_stop] additionally disconnects all
//! live sessions.

pub mod auth;
pub mod config;
mod connection;
pub mod editor;
mod error;
pub mod exec;
pub mod handler;
pub mod keys;
pub mod logging;
pub mod processor;
pub mod router;
mod server;

pub use auth::{Authenticator, Permissions, TrustStore};
pub use config::{LogConfig, ServerConfig};
pub use error::{Error, Result};
pub use handler::DefaultCommandHandler;
pub use processor::{CommandOutput, CommandProcessor, ProcessorFactory};
pub use router::{ChannelEvent, ChannelRequest, Mode, RequestState, SessionChannel, Verdict};
pub use server::Server;
