use std::net::{IpAddr, SocketAddr};

use axum::Router;
use axum::routing::{any, get, post};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError};
use crate::http::handlers::{chat_completions, list_models, ping};
use crate::http::state::AppState;
use crate::http::tls::{load_server_config, serve_tls};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    fn name(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }
}

struct ListenerHandle {
    bound: Option<oneshot::Receiver<Option<SocketAddr>>>,
    addr: Option<SocketAddr>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    async fn bound_addr(&mut self) -> Option<SocketAddr> {
        if let Some(receiver) = self.bound.take() {
            self.addr = receiver.await.ok().flatten();
        }
        self.addr
    }
}

#[derive(Clone, Debug)]
struct TlsFiles {
    certificate: String,
    private_key: String,
}

pub fn build_router(state: AppState, assets_dir: &str) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/v1/models", any(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .nest_service("/api/assets", ServeDir::new(assets_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct GatewayServer {
    ip: IpAddr,
    http_enabled: bool,
    http_port: i64,
    https_port: i64,
    tls: Option<TlsFiles>,
    router: Router,
    http: Option<ListenerHandle>,
    https: Option<ListenerHandle>,
}

impl GatewayServer {
    pub fn new(config: &Config, state: AppState) -> Result<Self, ConfigError> {
        let ip = config.bind_ip()?;
        let tls = config.https_enabled().then(|| TlsFiles {
            certificate: config.https_certificate.clone(),
            private_key: config.https_private_key.clone(),
        });

        Ok(Self {
            ip,
            http_enabled: config.http_enabled(),
            http_port: config.port,
            https_port: config.https_port,
            tls,
            router: build_router(state, &config.assets_dir),
            http: None,
            https: None,
        })
    }

    /// Launches the plain HTTP listener in the background. Returns `false` when HTTP
    /// is disabled by configuration.
    pub fn start_http(&mut self) -> bool {
        if self.http.is_some() {
            warn!("HTTP server already started");
            return true;
        }

        if !self.http_enabled {
            warn!(port = self.http_port, "HTTP server closed");
            return false;
        }
        let Some(addr) = self.listen_addr(Protocol::Http, self.http_port) else {
            return false;
        };

        let router = self.router.clone();
        let (bound_tx, bound_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let listener = match TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(error) => {
                    error!(%addr, %error, "HTTP server failed to bind");
                    let _ = bound_tx.send(None);
                    return;
                }
            };
            let _ = bound_tx.send(listener.local_addr().ok());

            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(error) = axum::serve(listener, service).await {
                error!(%addr, %error, "HTTP server stopped");
            }
        });

        info!(%addr, "HTTP server starting");
        self.http = Some(ListenerHandle {
            bound: Some(bound_rx),
            addr: None,
            task,
        });
        true
    }

    /// Launches the HTTPS listener in the background. Returns `false` when the port is
    /// not positive or certificate material is not configured.
    pub fn start_https(&mut self) -> bool {
        if self.https.is_some() {
            warn!("HTTPS server already started");
            return true;
        }

        let Some(tls) = self.tls.clone() else {
            warn!(port = self.https_port, "HTTPS server closed");
            return false;
        };
        let Some(addr) = self.listen_addr(Protocol::Https, self.https_port) else {
            return false;
        };

        let router = self.router.clone();
        let (bound_tx, bound_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let config = match load_server_config(&tls.certificate, &tls.private_key) {
                Ok(config) => config,
                Err(error) => {
                    error!(%error, "HTTPS server failed to load certificate");
                    let _ = bound_tx.send(None);
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(error) => {
                    error!(%addr, %error, "HTTPS server failed to bind");
                    let _ = bound_tx.send(None);
                    return;
                }
            };
            let _ = bound_tx.send(listener.local_addr().ok());

            serve_tls(listener, TlsAcceptor::from(config), router).await;
        });

        info!(%addr, "HTTPS server starting");
        self.https = Some(ListenerHandle {
            bound: Some(bound_rx),
            addr: None,
            task,
        });
        true
    }

    fn listen_addr(&self, protocol: Protocol, port: i64) -> Option<SocketAddr> {
        match u16::try_from(port) {
            Ok(port) => Some(SocketAddr::new(self.ip, port)),
            Err(_) => {
                error!(port, "{} port out of range", protocol.name());
                None
            }
        }
    }

    /// Waits for the listener's bind outcome. `None` when the protocol was never
    /// started or the bind failed.
    pub async fn bound_addr(&mut self, protocol: Protocol) -> Option<SocketAddr> {
        let handle = match protocol {
            Protocol::Http => self.http.as_mut(),
            Protocol::Https => self.https.as_mut(),
        }?;
        handle.bound_addr().await
    }

    pub fn is_started(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Http => self.http.is_some(),
            Protocol::Https => self.https.is_some(),
        }
    }

    /// Drops both accept loops. In-flight requests are not drained.
    pub fn stop(&mut self) {
        for handle in [self.http.take(), self.https.take()].into_iter().flatten() {
            handle.task.abort();
        }
    }
}

impl Drop for GatewayServer {
    fn drop(&mut self) {
        self.stop();
    }
}
