//! Drives one session channel through its requests.
//!
//! A channel waits for requests until either `shell` or `exec`
//! arrives; whichever comes first decides what the channel does for
//! the rest of its life. `pty-req` is acknowledged without being
//! interpreted, everything else is refused.
//!
//! Requests are answered where they are received, in order, by
//! [RequestState]. Only the outcome that starts the channel travels to
//! the task serving it, as [ChannelEvent::Start].

use std::future::Future;

use bytes::Bytes;
use log::{debug, warn};

use crate::{editor, exec, CommandProcessor, Result};

/// A request made on a session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequest {
    /// `pty-req`. Terminal settings are not used.
    Pty,
    /// `shell`.
    Shell,
    /// `exec`, with the request payload as it appears on the wire.
    Exec(Bytes),
    /// Any other request type.
    Unsupported(String),
}

impl ChannelRequest {
    pub fn parse(kind: &str, payload: Bytes) -> Self {
        match kind {
            "pty-req" => ChannelRequest::Pty,
            "shell" => ChannelRequest::Shell,
            "exec" => ChannelRequest::Exec(payload),
            other => ChannelRequest::Unsupported(other.to_string()),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ChannelRequest::Pty => "pty-req",
            ChannelRequest::Shell => "shell",
            ChannelRequest::Exec(_) => "exec",
            ChannelRequest::Unsupported(kind) => kind,
        }
    }
}

/// What a channel was started as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Shell,
    /// A single decoded command.
    Exec(String),
}

/// How a request is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Refuse,
    /// Accept, and start serving the channel.
    Start(Mode),
}

impl Verdict {
    /// Whether the peer gets a success reply.
    pub fn accepted(&self) -> bool {
        !matches!(self, Verdict::Refuse)
    }
}

/// Request handling for one channel. Once a channel is started, every
/// further request is refused.
#[derive(Debug, Default)]
pub struct RequestState {
    started: bool,
}

impl RequestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn handle(&mut self, request: ChannelRequest) -> Verdict {
        if self.started {
            debug!("refusing {} request on a started channel", request.kind());
            return Verdict::Refuse;
        }
        match request {
            ChannelRequest::Pty => Verdict::Accept,
            ChannelRequest::Shell => {
                self.started = true;
                Verdict::Start(Mode::Shell)
            }
            ChannelRequest::Exec(payload) => match exec::decode(&payload) {
                Ok(command) => {
                    self.started = true;
                    Verdict::Start(Mode::Exec(command))
                }
                Err(e) => {
                    warn!("error parsing exec payload: {}", e);
                    Verdict::Refuse
                }
            },
            ChannelRequest::Unsupported(_) => Verdict::Refuse,
        }
    }
}

/// What reaches the task serving a channel, in the order the peer sent
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Start(Mode),
    Data(Bytes),
    Eof,
}

/// The server side of one session channel.
pub trait SessionChannel: Send {
    /// The next event, or `None` once the channel is gone.
    fn recv(&mut self) -> impl Future<Output = Result<Option<ChannelEvent>>> + Send;

    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    fn exit_status(&mut self, status: u32) -> impl Future<Output = Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Serves `channel` until it is done, then closes it.
pub async fn run<C: SessionChannel>(channel: &mut C, processor: &dyn CommandProcessor) -> Result<()> {
    let result = serve(channel, processor).await;
    channel.close().await?;
    result
}

async fn serve<C: SessionChannel>(channel: &mut C, processor: &dyn CommandProcessor) -> Result<()> {
    let mode = loop {
        match channel.recv().await {
            Ok(Some(ChannelEvent::Start(mode))) => break mode,
            Ok(Some(ChannelEvent::Data(data))) => {
                debug!("discarding {} bytes sent before shell or exec", data.len());
            }
            Ok(Some(ChannelEvent::Eof)) | Ok(None) => return Ok(()),
            Err(e) => {
                warn!("error reading from channel: {}", e);
                return Ok(());
            }
        }
    };

    match mode {
        Mode::Shell => {
            let mut welcome = editor::to_crlf(&processor.welcome_message());
            welcome.extend_from_slice(b"\r\n");
            channel.write(&welcome).await?;
            editor::run(channel, processor).await?;
            channel.exit_status(0).await
        }
        Mode::Exec(command) => {
            let result = processor.execute(&command);
            debug!("exec {:?} exited with {}", command, result.status);
            let mut output = result.output.into_bytes();
            output.push(b'\n');
            channel.write(&output).await?;
            channel.exit_status(result.status).await
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::{CommandOutput, Error};

    /// A channel fed from a script of events, recording what the server
    /// does with it.
    #[derive(Debug, Default)]
    pub struct ScriptedChannel {
        pub events: VecDeque<Result<ChannelEvent, String>>,
        pub written: Vec<u8>,
        pub exit_status: Option<u32>,
        pub closed: bool,
    }

    impl ScriptedChannel {
        pub fn new<I: IntoIterator<Item = ChannelEvent>>(events: I) -> Self {
            ScriptedChannel {
                events: events.into_iter().map(Ok).collect(),
                ..Default::default()
            }
        }

        pub fn output(&self) -> String {
            String::from_utf8_lossy(&self.written).into_owned()
        }
    }

    impl SessionChannel for ScriptedChannel {
        async fn recv(&mut self) -> Result<Option<ChannelEvent>> {
            match self.events.pop_front() {
                Some(Ok(event)) => Ok(Some(event)),
                Some(Err(e)) => Err(Error::TransportRead(e)),
                None => Ok(None),
            }
        }

        async fn write(&mut self, data: &[u8]) -> Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }

        async fn exit_status(&mut self, status: u32) -> Result<()> {
            self.exit_status = Some(status);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    /// Remembers every command, answers `ok <command>`, and fails
    /// commands starting with `fail`.
    #[derive(Debug, Default)]
    pub struct Recorder {
        pub commands: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl Recorder {
        pub fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    impl CommandProcessor for Recorder {
        fn execute(&self, command: &str) -> CommandOutput {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.commands
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(command.to_string());
            if command.starts_with("fail") {
                CommandOutput::failure(format!("failed {}", command))
            } else {
                CommandOutput::success(format!("ok {}", command))
            }
        }

        fn prompt(&self) -> String {
            "> ".into()
        }

        fn welcome_message(&self) -> String {
            "hi\nthere".into()
        }
    }

    pub fn data(bytes: &[u8]) -> ChannelEvent {
        ChannelEvent::Data(Bytes::copy_from_slice(bytes))
    }

    pub fn shell() -> ChannelEvent {
        ChannelEvent::Start(Mode::Shell)
    }

    pub fn exec(command: &str) -> ChannelEvent {
        ChannelEvent::Start(Mode::Exec(command.to_string()))
    }

    pub fn exec_request(command: &str) -> ChannelRequest {
        ChannelRequest::Exec(exec::encode(command.as_bytes()))
    }
}
