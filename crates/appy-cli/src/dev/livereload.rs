//! Browser live-reload endpoints.
//!
//! Two WebSocket listeners share one upgrade path: a plain one on
//! `host:ws_port` and, when SSL is enabled, a TLS one on `host:wss_port`.
//! Each endpoint keeps only its most recently accepted client; older clients
//! stay connected but no longer receive anything.

use crate::error::{DevError, Result, ResultExt};
use appy_config::{HttpConfig, LiveReloadConfig};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Payload pushed to clients after an API restart.
pub const RELOAD_MESSAGE: &str = "reload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Plain,
    Secure,
}

impl Endpoint {
    fn index(self) -> usize {
        match self {
            Endpoint::Plain => 0,
            Endpoint::Secure => 1,
        }
    }
}

#[derive(Debug)]
struct Client {
    id: u64,
    tx: mpsc::Sender<Message>,
}

/// The current client of each endpoint.
#[derive(Debug, Default)]
pub struct LiveReloadHub {
    clients: Mutex<[Option<Client>; 2]>,
    next_id: AtomicU64,
}

impl LiveReloadHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `tx` the client of `endpoint`, superseding any previous one.
    /// Returns an id for [`LiveReloadHub::clear_client`].
    pub fn set_client(&self, endpoint: Endpoint, tx: mpsc::Sender<Message>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock()[endpoint.index()] = Some(Client { id, tx });
        id
    }

    /// Forget the client of `endpoint` if it is still `id`.
    pub fn clear_client(&self, endpoint: Endpoint, id: u64) {
        let mut clients = self.clients.lock();
        let slot = &mut clients[endpoint.index()];
        if slot.as_ref().is_some_and(|c| c.id == id) {
            *slot = None;
        }
    }

    /// Push [`RELOAD_MESSAGE`] to the current clients. Best effort.
    pub fn notify_reload(&self) {
        for client in self.clients.lock().iter().flatten() {
            if let Err(err) = client.tx.try_send(Message::text(RELOAD_MESSAGE)) {
                debug!("reload notification dropped: {}", err);
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().iter().flatten().count()
    }
}

/// Load `cert.pem` and `key.pem` from `cert_dir`.
pub fn build_acceptor(cert_dir: &Path) -> Result<TlsAcceptor> {
    let cert_path = cert_dir.join("cert.pem");
    let key_path = cert_dir.join("key.pem");

    let cert_file = File::open(&cert_path).map_err(|e| {
        DevError::Tls(format!("failed to open {}: {}", cert_path.display(), e))
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DevError::Tls(format!("failed to parse certificates: {}", e)))?;
    if certs.is_empty() {
        return Err(DevError::Tls(format!(
            "no certificates found in {}",
            cert_path.display()
        )));
    }

    let key_file = File::open(&key_path)
        .map_err(|e| DevError::Tls(format!("failed to open {}: {}", key_path.display(), e)))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| DevError::Tls(format!("failed to parse private key: {}", e)))?
        .ok_or_else(|| DevError::Tls(format!("no private key found in {}", key_path.display())))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| DevError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Bound live-reload listeners, ready to [`run`](LiveReloadServer::run).
pub struct LiveReloadServer {
    plain: TcpListener,
    secure: Option<(TcpListener, TlsAcceptor)>,
    path: Arc<str>,
    hub: Arc<LiveReloadHub>,
}

impl LiveReloadServer {
    /// Bind the plain endpoint and, if `http.ssl_enabled`, the TLS one with
    /// certificates from `root/http.ssl_cert_path`.
    ///
    /// # Errors
    ///
    /// Returns `DevError::LiveReload` if a port cannot be bound and
    /// `DevError::Tls` if the certificates cannot be loaded.
    pub async fn bind(
        config: &LiveReloadConfig,
        http: &HttpConfig,
        root: &Path,
        hub: Arc<LiveReloadHub>,
    ) -> Result<Self> {
        let plain = bind_listener(&http.host, config.ws_port).await?;

        let secure = if http.ssl_enabled {
            let acceptor = build_acceptor(&root.join(&http.ssl_cert_path))?;
            let listener = bind_listener(&http.host, config.wss_port).await?;
            Some((listener, acceptor))
        } else {
            None
        };

        Ok(Self {
            plain,
            secure,
            path: Arc::from(config.path.as_str()),
            hub,
        })
    }

    pub fn local_addr(&self, endpoint: Endpoint) -> Option<SocketAddr> {
        match endpoint {
            Endpoint::Plain => self.plain.local_addr().ok(),
            Endpoint::Secure => self
                .secure
                .as_ref()
                .and_then(|(listener, _)| listener.local_addr().ok()),
        }
    }

    /// Accept clients until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `DevError::LiveReload` when a listener stops accepting.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let Self {
            plain,
            secure,
            path,
            hub,
        } = self;

        let plain_loop = accept_loop(
            plain,
            None,
            Endpoint::Plain,
            Arc::clone(&path),
            Arc::clone(&hub),
            token.clone(),
        );

        match secure {
            Some((listener, acceptor)) => {
                let secure_loop =
                    accept_loop(listener, Some(acceptor), Endpoint::Secure, path, hub, token);
                tokio::try_join!(plain_loop, secure_loop)?;
            }
            None => plain_loop.await?,
        }

        Ok(())
    }
}

async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|e| DevError::LiveReload(format!("failed to bind {}:{}: {}", host, port, e)))
        .with_hint(format!(
            "is another `appy start` running? Free port {} or change live_reload.ws_port / wss_port",
            port
        ))
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    endpoint: Endpoint,
    path: Arc<str>,
    hub: Arc<LiveReloadHub>,
    token: CancellationToken,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted
                .map_err(|e| DevError::LiveReload(format!("accept failed: {}", e)))?,
        };
        debug!("live reload connection from {} ({:?})", peer, endpoint);

        let path = Arc::clone(&path);
        let hub = Arc::clone(&hub);
        let token = token.clone();
        match &acceptor {
            None => {
                tokio::spawn(serve_client(stream, endpoint, path, hub, token));
            }
            Some(acceptor) => {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls) => serve_client(tls, endpoint, path, hub, token).await,
                        Err(err) => warn!("TLS handshake with {} failed: {}", peer, err),
                    }
                });
            }
        }
    }
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(None);
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

async fn serve_client<S>(
    stream: S,
    endpoint: Endpoint,
    path: Arc<str>,
    hub: Arc<LiveReloadHub>,
    token: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let check_path = |request: &Request, response: Response| {
        if request.uri().path() == &*path {
            Ok(response)
        } else {
            Err(not_found())
        }
    };

    let ws = match accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!("live reload handshake failed: {}", err);
            return;
        }
    };

    let (mut sink, mut incoming) = ws.split();
    let (tx, mut rx) = mpsc::channel(8);
    let id = hub.set_client(endpoint, tx);

    let mut current = true;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            outgoing = rx.recv(), if current => match outgoing {
                Some(message) => {
                    if let Err(err) = sink.send(message).await {
                        debug!("live reload send failed: {}", err);
                        break;
                    }
                }
                // superseded by a newer client
                None => current = false,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.clear_client(endpoint, id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    fn config() -> (LiveReloadConfig, HttpConfig) {
        let live_reload = LiveReloadConfig {
            ws_port: 0,
            wss_port: 0,
            ..LiveReloadConfig::default()
        };
        let http = HttpConfig {
            host: "127.0.0.1".to_string(),
            ..HttpConfig::default()
        };
        (live_reload, http)
    }

    async fn start(hub: Arc<LiveReloadHub>) -> (SocketAddr, CancellationToken) {
        let (live_reload, http) = config();
        let server = LiveReloadServer::bind(&live_reload, &http, Path::new("."), hub)
            .await
            .unwrap();
        let addr = server.local_addr(Endpoint::Plain).unwrap();
        assert!(server.local_addr(Endpoint::Secure).is_none());

        let token = CancellationToken::new();
        tokio::spawn(server.run(token.clone()));
        (addr, token)
    }

    async fn wait_for_clients(hub: &LiveReloadHub, count: usize) {
        for _ in 0..100 {
            if hub.client_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} live reload clients", count);
    }

    #[test]
    fn test_notify_without_clients_is_noop() {
        let hub = LiveReloadHub::new();
        hub.notify_reload();
        assert_eq!(hub.client_count(), 0);
    }

    #[test]
    fn test_clear_client_ignores_superseded_id() {
        let hub = LiveReloadHub::new();
        let (old_tx, _old_rx) = mpsc::channel(1);
        let (new_tx, mut new_rx) = mpsc::channel(1);

        let old = hub.set_client(Endpoint::Plain, old_tx);
        let new = hub.set_client(Endpoint::Plain, new_tx);
        hub.clear_client(Endpoint::Plain, old);
        assert_eq!(hub.client_count(), 1);

        hub.notify_reload();
        assert_eq!(new_rx.try_recv().unwrap(), Message::text(RELOAD_MESSAGE));

        hub.clear_client(Endpoint::Plain, new);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_client_receives_reload() {
        let hub = LiveReloadHub::new();
        let (addr, token) = start(Arc::clone(&hub)).await;

        let (mut ws, _) = connect_async(format!("ws://{}/reload", addr)).await.unwrap();
        wait_for_clients(&hub, 1).await;

        hub.notify_reload();
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(message, Message::text(RELOAD_MESSAGE));

        token.cancel();
    }

    #[tokio::test]
    async fn test_newer_client_supersedes_older() {
        let hub = LiveReloadHub::new();
        let (addr, token) = start(Arc::clone(&hub)).await;

        let (mut first, _) = connect_async(format!("ws://{}/reload", addr)).await.unwrap();
        wait_for_clients(&hub, 1).await;
        let (mut second, _) = connect_async(format!("ws://{}/reload", addr)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hub.client_count(), 1);

        hub.notify_reload();
        let message = tokio::time::timeout(Duration::from_secs(5), second.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(message, Message::text(RELOAD_MESSAGE));

        let stale = tokio::time::timeout(Duration::from_millis(200), first.next()).await;
        assert!(stale.is_err(), "superseded client must not be notified");

        token.cancel();
    }

    #[tokio::test]
    async fn test_wrong_path_is_rejected() {
        let hub = LiveReloadHub::new();
        let (addr, token) = start(Arc::clone(&hub)).await;

        let result = connect_async(format!("ws://{}/elsewhere", addr)).await;
        assert!(result.is_err());
        assert_eq!(hub.client_count(), 0);

        token.cancel();
    }

    #[test]
    fn test_build_acceptor_requires_cert_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let Err(err) = build_acceptor(temp.path()) else {
            panic!("acceptor built without certificates");
        };
        assert!(matches!(err, DevError::Tls(_)));
        assert!(err.to_string().contains("cert.pem"));
    }

    #[tokio::test]
    async fn test_bind_conflict_carries_hint() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let Err(err) = bind_listener("127.0.0.1", port).await else {
            panic!("second bind on {} should fail", port);
        };
        let message = err.to_string();
        assert!(message.contains(&format!("failed to bind 127.0.0.1:{}", port)));
        assert!(message.contains("Hint: is another `appy start` running?"));
    }
}
