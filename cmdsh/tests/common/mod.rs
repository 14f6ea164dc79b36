#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cmdsh::{CommandOutput, CommandProcessor, LogConfig, ServerConfig};
use russh::client;
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::{Algorithm, PrivateKey, PrivateKeyWithHashAlg};
use russh::{Channel, ChannelMsg, Disconnect};
use tempfile::TempDir;

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A server configuration with a fresh host key and a trust store
/// listing `client_key`, all kept in `dir`.
pub struct Fixture {
    pub dir: TempDir,
    pub client_key: PrivateKey,
    pub config: ServerConfig,
}

pub fn fixture() -> Fixture {
    let _ = env_logger::try_init();

    let dir = tempfile::tempdir().unwrap();
    let host_key = dir.path().join("server_key");
    let authorized_keys = dir.path().join("authorized_keys");
    cmdsh::keys::load_or_generate_host_key(&host_key).unwrap();

    let client_key = random_key();
    let line = client_key.public_key().to_openssh().unwrap();
    std::fs::write(&authorized_keys, format!("{}\n", line)).unwrap();

    let config = ServerConfig {
        listen_address: "127.0.0.1:0".into(),
        host_key_file: host_key,
        authorized_keys_file: authorized_keys,
        log: LogConfig {
            enabled: false,
            file_path: None,
            log_to_stdout: false,
        },
        ..Default::default()
    };
    Fixture {
        dir,
        client_key,
        config,
    }
}

pub fn random_key() -> PrivateKey {
    PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap()
}

pub struct Client;

impl client::Handler for Client {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub async fn connect(addr: SocketAddr) -> anyhow::Result<client::Handle<Client>> {
    let config = Arc::new(client::Config::default());
    Ok(client::connect(config, addr, Client).await?)
}

/// Connects and logs in as `alice` with `key`, failing if the key is
/// refused.
pub async fn login(addr: SocketAddr, key: &PrivateKey) -> anyhow::Result<client::Handle<Client>> {
    let mut session = connect(addr).await?;
    let authenticated = session
        .authenticate_publickey("alice", PrivateKeyWithHashAlg::new(Arc::new(key.clone()), None))
        .await?
        .success();
    if !authenticated {
        anyhow::bail!("authentication failed");
    }
    Ok(session)
}

pub async fn disconnect(session: &client::Handle<Client>) {
    let _ = session.disconnect(Disconnect::ByApplication, "", "").await;
}

/// What a channel sent back until it was closed.
#[derive(Debug, Default)]
pub struct Transcript {
    pub output: String,
    pub exit_status: Option<u32>,
    pub replies: Vec<bool>,
}

pub async fn drain(channel: &mut Channel<client::Msg>, transcript: &mut Transcript) {
    loop {
        match tokio::time::timeout(TIMEOUT, channel.wait()).await {
            Ok(Some(ChannelMsg::Data { data })) => {
                transcript.output.push_str(&String::from_utf8_lossy(&data))
            }
            Ok(Some(ChannelMsg::ExitStatus { exit_status })) => {
                transcript.exit_status = Some(exit_status)
            }
            Ok(Some(ChannelMsg::Success)) => transcript.replies.push(true),
            Ok(Some(ChannelMsg::Failure)) => transcript.replies.push(false),
            Ok(Some(ChannelMsg::Close)) | Ok(None) => return,
            Ok(Some(_)) => {}
            Err(_) => panic!("channel still open after {:?}: {:?}", TIMEOUT, transcript),
        }
    }
}

/// Reads from `channel` until its output ends with `suffix`.
pub async fn read_until(channel: &mut Channel<client::Msg>, suffix: &str) -> Transcript {
    let mut transcript = Transcript::default();
    while !transcript.output.ends_with(suffix) {
        match tokio::time::timeout(TIMEOUT, channel.wait()).await {
            Ok(Some(ChannelMsg::Data { data })) => {
                transcript.output.push_str(&String::from_utf8_lossy(&data))
            }
            Ok(Some(ChannelMsg::Success)) => transcript.replies.push(true),
            Ok(Some(ChannelMsg::Failure)) => transcript.replies.push(false),
            Ok(Some(_)) => {}
            Ok(None) => panic!("channel closed while waiting for {:?}: {:?}", suffix, transcript),
            Err(_) => panic!("timed out waiting for {:?}: {:?}", suffix, transcript),
        }
    }
    transcript
}

pub async fn exec(session: &client::Handle<Client>, command: &str) -> anyhow::Result<Transcript> {
    let mut channel = session.channel_open_session().await?;
    channel.exec(true, command).await?;
    let mut transcript = Transcript::default();
    drain(&mut channel, &mut transcript).await;
    Ok(transcript)
}

/// Opens a shell with a terminal and waits for the first prompt.
pub async fn open_shell(
    session: &client::Handle<Client>,
    prompt: &str,
) -> anyhow::Result<(Channel<client::Msg>, Transcript)> {
    let mut channel = session.channel_open_session().await?;
    channel.request_pty(true, "xterm", 80, 24, 0, 0, &[]).await?;
    channel.request_shell(true).await?;
    let transcript = read_until(&mut channel, prompt).await;
    Ok((channel, transcript))
}

/// Counts commands and answers `ok <command>`.
#[derive(Default)]
pub struct Counter {
    pub calls: AtomicUsize,
}

impl Counter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CommandProcessor for Counter {
    fn execute(&self, command: &str) -> CommandOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CommandOutput::success(format!("ok {}", command))
    }

    fn prompt(&self) -> String {
        "count> ".into()
    }

    fn welcome_message(&self) -> String {
        "counting".into()
    }
}
