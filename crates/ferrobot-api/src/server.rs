//! [`ApiServer`] – binds the listener and serves the router until stopped.
//!
//! Lifecycle: `Off → Starting → Running → Stopping → Off`. Requests that
//! arrive outside `Running` are answered with 503, and open event streams
//! end as soon as the state leaves `Running`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferrobot_kernel::{ApiService, Manager};
use ferrobot_types::FerroError;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ApiConfig;
use crate::routes::router;

/// How long `stop` waits for in-flight requests before aborting them.
pub const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Off = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServerState::Off => "off",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        })
    }
}

/// Shared view of the server state. Event streams subscribe to it and end
/// once the server leaves `Running`.
#[derive(Debug)]
pub struct ServerStatus(watch::Sender<ServerState>);

impl ServerStatus {
    pub fn new(state: ServerState) -> Self {
        Self(watch::channel(state).0)
    }

    pub fn get(&self) -> ServerState {
        *self.0.borrow()
    }

    pub fn set(&self, state: ServerState) {
        self.0.send_replace(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.0.subscribe()
    }

    /// Move from `from` to `to`; `false` if the state was not `from`.
    fn transition(&self, from: ServerState, to: ServerState) -> bool {
        self.0.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self::new(ServerState::Off)
    }
}

struct Serving {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    address: SocketAddr,
}

pub struct ApiServer {
    config: ApiConfig,
    status: Arc<ServerStatus>,
    serving: Mutex<Option<Serving>>,
}

impl ApiServer {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            status: Arc::new(ServerStatus::default()),
            serving: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        self.status.get()
    }

    /// Bound address while serving; useful with port `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.serving.lock().as_ref().map(|s| s.address)
    }

    async fn serve(&self, manager: Manager) -> Result<Serving, FerroError> {
        self.config.validate()?;
        let app = router(manager, &self.config, Arc::clone(&self.status))?;
        let address = self.config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| FerroError::io(address.clone(), e.to_string()))?;
        let local = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = if self.config.uses_tls() {
            tls_task(&self.config, listener, app, signal)?
        } else {
            warn!("API using insecure connection; configure a certificate and key to enable TLS");
            tokio::spawn(async move {
                let stopped = async {
                    let _ = signal.await;
                };
                if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stopped).await {
                    error!(error = %e, "api server failed");
                }
            })
        };
        Ok(Serving {
            shutdown,
            task,
            address: local,
        })
    }
}

#[cfg(feature = "tls")]
fn tls_task(
    config: &ApiConfig,
    listener: TcpListener,
    app: axum::Router,
    signal: oneshot::Receiver<()>,
) -> Result<JoinHandle<()>, FerroError> {
    let acceptor = crate::tls::acceptor(&config.cert, &config.key)?;
    Ok(tokio::spawn(crate::tls::serve(listener, acceptor, app, signal)))
}

#[cfg(not(feature = "tls"))]
fn tls_task(
    _config: &ApiConfig,
    _listener: TcpListener,
    _app: axum::Router,
    _signal: oneshot::Receiver<()>,
) -> Result<JoinHandle<()>, FerroError> {
    Err(FerroError::Config(
        "a certificate and key are configured but ferrobot-api was built without the `tls` feature"
            .into(),
    ))
}

#[async_trait]
impl ApiService for ApiServer {
    async fn start(&self, manager: Manager) -> Result<(), FerroError> {
        if !self.status.transition(ServerState::Off, ServerState::Starting) {
            warn!(state = %self.status.get(), "api start ignored");
            return Ok(());
        }
        info!(address = %self.config.address(), "initializing api");
        match self.serve(manager).await {
            Ok(serving) => {
                info!(address = %serving.address, tls = self.config.uses_tls(), "api listening");
                *self.serving.lock() = Some(serving);
                self.status.set(ServerState::Running);
                Ok(())
            }
            Err(e) => {
                self.status.set(ServerState::Off);
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<(), FerroError> {
        if !self.status.transition(ServerState::Running, ServerState::Stopping) {
            return Ok(());
        }
        let serving = self.serving.lock().take();
        if let Some(mut serving) = serving {
            let _ = serving.shutdown.send(());
            match tokio::time::timeout(GRACEFUL_TIMEOUT, &mut serving.task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "api server task ended abnormally"),
                Err(_) => {
                    warn!(timeout = ?GRACEFUL_TIMEOUT, "api requests still in flight; aborting");
                    serving.task.abort();
                }
            }
        }
        self.status.set(ServerState::Off);
        info!("api stopped");
        Ok(())
    }
}

impl fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiServer")
            .field("config", &self.config)
            .field("state", &self.status.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions() {
        let status = ServerStatus::default();
        assert_eq!(status.get(), ServerState::Off);
        assert!(status.transition(ServerState::Off, ServerState::Starting));
        assert!(!status.transition(ServerState::Off, ServerState::Starting));
        status.set(ServerState::Running);
        assert_eq!(status.get().to_string(), "running");
    }

    #[tokio::test]
    async fn serves_until_stopped() {
        let server = ApiServer::new(ApiConfig::new().with_host("127.0.0.1").with_port("0"));
        server.start(Manager::new()).await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
        let address = server.local_addr().unwrap();
        assert_ne!(address.port(), 0);

        // Second start is a no-op while running.
        server.start(Manager::new()).await.unwrap();
        assert_eq!(server.local_addr(), Some(address));

        server.stop().await.unwrap();
        assert_eq!(server.state(), ServerState::Off);
        assert!(server.local_addr().is_none());
        assert!(tokio::net::TcpStream::connect(address).await.is_err());
    }

    #[tokio::test]
    async fn bind_failure_returns_to_off() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port().to_string();
        let server = ApiServer::new(ApiConfig::new().with_host("127.0.0.1").with_port(port));
        assert!(matches!(server.start(Manager::new()).await, Err(FerroError::Io { .. })));
        assert_eq!(server.state(), ServerState::Off);
    }

    #[cfg(not(feature = "tls"))]
    #[tokio::test]
    async fn tls_without_feature_is_a_config_error() {
        let config = ApiConfig::new()
            .with_host("127.0.0.1")
            .with_port("0")
            .with_tls("cert.pem", "key.pem");
        let server = ApiServer::new(config);
        assert!(matches!(server.start(Manager::new()).await, Err(FerroError::Config(_))));
        assert_eq!(server.state(), ServerState::Off);
    }

    #[tokio::test]
    async fn stop_closes_open_event_streams() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let server = Arc::new(ApiServer::new(ApiConfig::new().with_host("127.0.0.1").with_port("0")));
        let manager = Manager::new().with_api(server.clone());
        manager.eventer().add_event("status");
        manager.start().await.unwrap();

        let mut client = tokio::net::TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
        client
            .write_all(b"GET /api/events/status HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut head = [0u8; 64];
        let read = client.read(&mut head).await.unwrap();
        assert!(String::from_utf8_lossy(&head[..read]).starts_with("HTTP/1.1 200 OK"));

        tokio::time::timeout(Duration::from_secs(3), manager.halt())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.state(), ServerState::Off);
    }

    #[tokio::test]
    async fn manager_drives_the_server() {
        let server = Arc::new(ApiServer::new(ApiConfig::new().with_host("127.0.0.1").with_port("0")));
        let manager = Manager::new().with_api(server.clone());
        manager.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
        manager.halt().await.unwrap();
        assert_eq!(server.state(), ServerState::Off);
    }
}
