use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::connection::{self, Shared};
use crate::{
    logging, Authenticator, CommandProcessor, Error, ProcessorFactory, Result, ServerConfig,
    TrustStore,
};

/// A listening command server.
///
/// ```no_run
/// # use std::sync::Arc;
/// # async fn f(config: cmdsh::ServerConfig) -> Result<(), cmdsh::Error> {
/// let mut server = cmdsh::Server::new(config, Arc::new(cmdsh::DefaultCommandHandler::new()))?;
/// server.start().await?;
/// println!("listening on {:?}", server.local_addr());
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: ServerConfig,
    russh_config: Arc<russh::server::Config>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    force: CancellationToken,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// A server handing every connection to the same processor.
    pub fn new(config: ServerConfig, processor: Arc<dyn CommandProcessor>) -> Result<Self> {
        Self::with_factory(config, move |_user: &str| processor.clone())
    }

    /// A server asking `factory` for a processor once per
    /// authenticated connection.
    ///
    /// Fails if the configuration is invalid, or if the host key
    /// cannot be loaded. Nothing is bound yet.
    pub fn with_factory<F>(config: ServerConfig, factory: F) -> Result<Self>
    where
        F: ProcessorFactory + 'static,
    {
        config.validate()?;
        logging::init(&config.log)?;
        let russh_config = config.russh_config()?;

        let authenticator = if config.no_client_auth {
            info!("client authentication is disabled");
            None
        } else {
            Some(Authenticator::new(TrustStore::new(
                &config.authorized_keys_file,
            )))
        };

        Ok(Server {
            config,
            russh_config,
            shared: Arc::new(Shared {
                authenticator,
                factory: Arc::new(factory),
                tracker: TaskTracker::new(),
            }),
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            local_addr: None,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Binds the listen address and starts accepting connections in
    /// the background.
    pub async fn start(&mut self) -> Result<()> {
        if self.local_addr.is_some() || self.shutdown.is_cancelled() {
            return Err(Error::Config("server was already started".into()));
        }

        let listener = TcpListener::bind(self.config.listen_address.as_str())
            .await
            .map_err(|source| Error::ListenerBind {
                address: self.config.listen_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("SSH server listening on {}", local_addr);
        self.local_addr = Some(local_addr);

        self.shared.tracker.spawn(accept_loop(
            listener,
            self.russh_config.clone(),
            self.shared.clone(),
            self.shutdown.clone(),
            self.force.clone(),
        ));
        Ok(())
    }

    /// Stops accepting connections and waits for every connection to
    /// end. Live sessions are not interrupted.
    pub async fn stop(&self) {
        info!("stopping server");
        self.shutdown.cancel();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        info!("server stopped");
    }

    /// Like [Server::stop], but disconnects live sessions first.
    pub async fn force_stop(&self) {
        self.force.cancel();
        self.stop().await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<russh::server::Config>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    force: CancellationToken,
) {
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {}", peer);
                    stream
                }
                Err(e) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    error!("failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {}", e);
        }
        shared.tracker.spawn(connection::supervise(
            stream,
            config.clone(),
            shared.clone(),
            force.clone(),
        ));
    }
    info!("no longer accepting connections");
}
