//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds to sockets and spawns Connection tasks for each
//! incoming client. Supports both plain (`ws://`) and TLS (`wss://`)
//! listeners. Every handshake checks the `Origin` header against the
//! configured allow-list and caps frame and message sizes.

use crate::config::{Config, ListenConfig, TlsConfig};
use crate::handlers::Registry;
use crate::network::{Connection, Keepalive};
use crate::state::Hub;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::{BufReader, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{error, info, instrument, warn};

/// State every accepted socket needs.
struct Shared {
    hub: Arc<Hub>,
    registry: Arc<Registry>,
    listen: ListenConfig,
    websocket: WebSocketConfig,
    keepalive: Keepalive,
    shutdown: broadcast::Sender<()>,
}

/// The Gateway accepts incoming TCP/TLS connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    tls_listener: Option<(TcpListener, TlsAcceptor)>,
    shared: Arc<Shared>,
}

impl Gateway {
    /// Bind the gateway to the configured addresses.
    ///
    /// Sending on `shutdown` stops the accept loops and closes every live
    /// connection with `io server disconnect`.
    pub async fn bind(
        config: &Config,
        hub: Arc<Hub>,
        shutdown: broadcast::Sender<()>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.listen.address).await?;
        info!(address = %config.listen.address, "WebSocket listener bound");

        let tls_listener = if let Some(tls_cfg) = &config.tls {
            let tls_acceptor = Self::load_tls(tls_cfg)?;
            let listener = TcpListener::bind(tls_cfg.address).await?;
            info!(address = %tls_cfg.address, "TLS listener bound");
            Some((listener, tls_acceptor))
        } else {
            None
        };

        let mut websocket = WebSocketConfig::default();
        websocket.max_frame_size = Some(config.limits.max_frame_bytes);
        websocket.max_message_size = Some(config.limits.max_frame_bytes);

        Ok(Self {
            listener,
            tls_listener,
            shared: Arc::new(Shared {
                hub,
                registry: Arc::new(Registry::new()),
                listen: config.listen.clone(),
                websocket,
                keepalive: Keepalive {
                    ping: Duration::from_secs(config.timeouts.ping),
                    timeout: Duration::from_secs(config.timeouts.timeout),
                },
                shutdown,
            }),
        })
    }

    /// Load TLS certificates and create TlsAcceptor.
    fn load_tls(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
        // Load certificates
        let cert_file = std::fs::read(&config.cert_path)?;
        let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
        let certs: Vec<CertificateDer> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;

        if certs.is_empty() {
            anyhow::bail!("No certificates found in {}", config.cert_path);
        }

        // Load private key
        let key_file = std::fs::read(&config.key_path)?;
        let key_reader = &mut BufReader::new(Cursor::new(key_file));
        let mut keys: Vec<PrivateKeyDer> = pkcs8_private_keys(key_reader)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(PrivateKeyDer::from)
            .collect();

        if keys.is_empty() {
            anyhow::bail!("No private keys found in {}", config.key_path);
        }

        let key = keys.remove(0);

        let tls_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    /// Run the gateway until shutdown is signalled.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        if let Some((tls_listener, tls_acceptor)) = self.tls_listener {
            let shared = Arc::clone(&self.shared);
            let mut shutdown = shared.shutdown.subscribe();

            tokio::spawn(async move {
                loop {
                    let accepted = tokio::select! {
                        _ = shutdown.recv() => break,
                        accepted = tls_listener.accept() => accepted,
                    };
                    match accepted {
                        Ok((stream, addr)) => {
                            info!(%addr, "TLS connection accepted");
                            let shared = Arc::clone(&shared);
                            let acceptor = tls_acceptor.clone();

                            tokio::spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(tls_stream) => serve(tls_stream, addr, true, shared).await,
                                    Err(e) => warn!(%addr, error = %e, "TLS handshake failed"),
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept TLS connection");
                        }
                    }
                }
                info!("TLS listener stopped");
            });
        }

        let mut shutdown = self.shared.shutdown.subscribe();
        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%addr, error = %e, "Failed to set TCP_NODELAY");
                    }
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(serve(stream, addr, false, shared));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
        info!("WebSocket listener stopped");
        Ok(())
    }
}

/// Perform the WebSocket handshake and run the connection to completion.
async fn serve<S>(stream: S, addr: SocketAddr, tls: bool, shared: Arc<Shared>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let listen = &shared.listen;
    let origin_check = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get(http::header::ORIGIN)
            .and_then(|o| o.to_str().ok());
        if listen.origin_allowed(origin) {
            return Ok(response);
        }
        warn!(%addr, origin = origin.unwrap_or("-"), "WebSocket origin rejected");
        let mut rejection = http::Response::new(Some("origin not allowed".to_string()));
        *rejection.status_mut() = http::StatusCode::FORBIDDEN;
        Err(rejection)
    };

    let accepted = accept_hdr_async_with_config(stream, origin_check, Some(shared.websocket)).await;
    let ws = match accepted {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let conn = shared.hub.next_conn_id();
    let connection = Connection::new(
        conn.clone(),
        addr,
        tls,
        Arc::clone(&shared.hub),
        Arc::clone(&shared.registry),
        ws,
        shared.keepalive,
        shared.shutdown.subscribe(),
    );
    if let Err(e) = connection.run().await {
        error!(%conn, %addr, error = %e, "Connection error");
    }
}
