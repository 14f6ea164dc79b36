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
//

//! One accepted connection: handshake, authentication, and fanning out
//! session channels to router tasks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};
use russh::keys::PublicKey;
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Disconnect};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::router::{self, ChannelEvent, ChannelRequest, RequestState, SessionChannel, Verdict};
use crate::{exec, Authenticator, CommandProcessor, Error, Permissions, ProcessorFactory, Result};

/// State every connection of a server refers to.
pub(crate) struct Shared {
    /// `None` when clients are let in without authentication.
    pub authenticator: Option<Authenticator>,
    pub factory: Arc<dyn ProcessorFactory>,
    pub tracker: TaskTracker,
}

/// Runs one connection to completion. When `force` is cancelled the
/// peer is disconnected; otherwise this only returns once the peer
/// goes away.
pub(crate) async fn supervise(
    stream: TcpStream,
    config: Arc<server::Config>,
    shared: Arc<Shared>,
    force: CancellationToken,
) {
    let peer = stream.peer_addr().ok();
    info!("new connection from {:?}", peer);

    let handler = Connection::new(shared, peer);
    let session = match server::run_stream(config, stream, handler).await {
        Ok(session) => session,
        Err(e) => {
            warn!("failed to handshake with {:?}: {}", peer, e);
            return;
        }
    };

    let handle = session.handle();
    tokio::pin!(session);
    let result = tokio::select! {
        result = &mut session => result,
        _ = force.cancelled() => {
            info!("disconnecting {:?}", peer);
            let _ = handle
                .disconnect(
                    Disconnect::ByApplication,
                    "server shutting down".into(),
                    String::new(),
                )
                .await;
            session.await
        }
    };
    match result {
        Ok(()) => info!("connection from {:?} closed", peer),
        Err(e) => warn!("connection from {:?} ended: {}", peer, e),
    }
}

/// Request handling state of one session channel, and the queue to
/// the task serving it.
struct ChannelSlot {
    state: RequestState,
    events: UnboundedSender<ChannelEvent>,
}

/// The per-connection russh handler.
pub(crate) struct Connection {
    shared: Arc<Shared>,
    peer: Option<SocketAddr>,
    user: Option<String>,
    processor: Option<Arc<dyn CommandProcessor>>,
    channels: HashMap<ChannelId, ChannelSlot>,
}

impl Connection {
    fn new(shared: Arc<Shared>, peer: Option<SocketAddr>) -> Self {
        Connection {
            shared,
            peer,
            user: None,
            processor: None,
            channels: HashMap::new(),
        }
    }

    fn accept(&mut self, user: &str, permissions: Option<Permissions>) -> Auth {
        info!(
            "connection established from {:?} (user: {}, key: {})",
            self.peer,
            user,
            permissions
                .as_ref()
                .and_then(Permissions::fingerprint)
                .unwrap_or("none")
        );
        self.user = Some(user.to_string());
        Auth::Accept
    }

    fn processor(&mut self) -> Arc<dyn CommandProcessor> {
        let shared = &self.shared;
        let user = self.user.as_deref().unwrap_or_default();
        self.processor
            .get_or_insert_with(|| shared.factory.processor(user))
            .clone()
    }

    fn forward(&mut self, channel: ChannelId, event: ChannelEvent) {
        if let Some(slot) = self.channels.get(&channel) {
            if slot.events.send(event).is_err() {
                debug!("channel {:?} is no longer served", channel);
                self.channels.remove(&channel);
            }
        }
    }

    /// Answers a channel request before returning to russh, so replies
    /// leave in the order the requests arrived.
    fn request(&mut self, channel: ChannelId, kind: &str, payload: Bytes, session: &mut Session) {
        debug!("received channel request {} on {:?}", kind, channel);
        let request = ChannelRequest::parse(kind, payload);
        let verdict = match self.channels.get_mut(&channel) {
            Some(slot) => slot.state.handle(request),
            None => Verdict::Refuse,
        };
        let _ = if verdict.accepted() {
            session.channel_success(channel)
        } else {
            session.channel_failure(channel)
        };
        if let Verdict::Start(mode) = verdict {
            self.forward(channel, ChannelEvent::Start(mode));
        }
    }
}

fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
        partial_success: false,
    }
}

impl server::Handler for Connection {
    type Error = Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth> {
        if self.shared.authenticator.is_none() {
            return Ok(self.accept(user, None));
        }
        Ok(reject())
    }

    async fn auth_publickey(&mut self, user: &str, public_key: &PublicKey) -> Result<Auth> {
        let shared = self.shared.clone();
        let checked = match shared.authenticator {
            None => return Ok(self.accept(user, None)),
            Some(ref authenticator) => authenticator.check_public_key(user, public_key),
        };
        match checked {
            Ok(permissions) => Ok(self.accept(user, Some(permissions))),
            Err(e) => {
                info!("rejecting {:?}: {}", self.peer, e);
                Ok(reject())
            }
        }
    }

    async fn auth_keyboard_interactive(
        &mut self,
        user: &str,
        _submethods: &str,
        _response: Option<server::Response<'_>>,
    ) -> Result<Auth> {
        if let Some(ref authenticator) = self.shared.authenticator {
            if let Err(e) = authenticator.check_keyboard_interactive(user) {
                debug!("{}", e);
            }
        }
        Ok(reject())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool> {
        let id = channel.id();
        let (sender, events) = unbounded_channel();
        self.channels.insert(
            id,
            ChannelSlot {
                state: RequestState::new(),
                events: sender,
            },
        );

        let processor = self.processor();
        let mut channel = RusshChannel {
            id,
            handle: session.handle(),
            events,
        };
        self.shared.tracker.spawn(async move {
            if let Err(e) = router::run(&mut channel, processor.as_ref()).await {
                debug!("channel {:?} ended: {}", id, e);
            }
        });
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool> {
        info!(
            "refusing direct-tcpip channel to {}:{} from {:?}",
            host_to_connect, port_to_connect, self.peer
        );
        Ok(false)
    }

    async fn channel_eof(&mut self, channel: ChannelId, _session: &mut Session) -> Result<()> {
        self.forward(channel, ChannelEvent::Eof);
        Ok(())
    }

    async fn channel_close(&mut self, channel: ChannelId, _session: &mut Session) -> Result<()> {
        self.channels.remove(&channel);
        Ok(())
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], _session: &mut Session) -> Result<()> {
        self.forward(channel, ChannelEvent::Data(Bytes::copy_from_slice(data)));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<()> {
        self.request(channel, "pty-req", Bytes::new(), session);
        Ok(())
    }

    async fn shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<()> {
        self.request(channel, "shell", Bytes::new(), session);
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<()> {
        // russh hands over the bare command, the request state expects
        // the request payload.
        self.request(channel, "exec", exec::encode(data), session);
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        _variable_name: &str,
        _variable_value: &str,
        session: &mut Session,
    ) -> Result<()> {
        self.request(channel, "env", Bytes::new(), session);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<()> {
        self.request(channel, "subsystem", Bytes::copy_from_slice(name.as_bytes()), session);
        Ok(())
    }

    async fn x11_request(
        &mut self,
        channel: ChannelId,
        _single_connection: bool,
        _x11_auth_protocol: &str,
        _x11_auth_cookie: &str,
        _x11_screen_number: u32,
        session: &mut Session,
    ) -> Result<()> {
        self.request(channel, "x11-req", Bytes::new(), session);
        Ok(())
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> Result<bool> {
        info!("refusing global request tcpip-forward {}:{}", address, port);
        Ok(false)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> Result<bool> {
        info!("refusing global request cancel-tcpip-forward {}:{}", address, port);
        Ok(false)
    }
}

/// A session channel served through a russh [server::Handle], fed by
/// the connection's handler.
struct RusshChannel {
    id: ChannelId,
    handle: server::Handle,
    events: UnboundedReceiver<ChannelEvent>,
}

impl SessionChannel for RusshChannel {
    async fn recv(&mut self) -> Result<Option<ChannelEvent>> {
        Ok(self.events.recv().await)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.handle
            .data(self.id, CryptoVec::from_slice(data))
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn exit_status(&mut self, status: u32) -> Result<()> {
        self.handle
            .exit_status_request(self.id, status)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.handle.eof(self.id).await;
        self.handle
            .close(self.id)
            .await
            .map_err(|_| Error::ChannelClosed)
    }
}
