use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::cache::{self, CacheStore};
use crate::config::Config;
use crate::error::StartupError;
use crate::http::server::GatewayServer;
use crate::http::state::AppState;
use crate::identity::{self, AddressClassLookup, HttpLocationLookup, LocationLookup};
use crate::providers::registry::ModelRegistry;
use crate::sdk::UpstreamClient;
use crate::sdk::openai::OpenAiClient;

/// A fully started gateway: the catalog is loaded and the server is constructed, but
/// no listener is running until [`Gateway::start_listeners`].
pub struct Gateway {
    server: GatewayServer,
    cache: Arc<dyn CacheStore>,
    upstream: Arc<dyn UpstreamClient>,
}

impl Gateway {
    /// Runs every startup stage in order: host identity, cache connection, provider
    /// handshake, model warm-up, server construction. Any failure after the cache is
    /// connected releases it before returning.
    pub async fn start(config: &Config) -> Result<Self, StartupError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let locator: Arc<dyn LocationLookup> = match config.geoip_url.clone() {
            Some(url) => Arc::new(HttpLocationLookup::new(http_client.clone(), url)),
            None => Arc::new(AddressClassLookup),
        };
        identity::log_local_identity(config.identity_interface.as_deref(), locator.as_ref()).await;

        let cache = cache::connect(&config.cache_address).await?;

        let upstream: Arc<dyn UpstreamClient> = Arc::new(OpenAiClient::new(
            http_client,
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.organization.clone(),
        ));

        match Self::assemble(config, upstream, Arc::clone(&cache), locator).await {
            Ok(gateway) => Ok(gateway),
            Err(startup_error) => {
                cache.release().await;
                Err(startup_error)
            }
        }
    }

    pub async fn assemble(
        config: &Config,
        upstream: Arc<dyn UpstreamClient>,
        cache: Arc<dyn CacheStore>,
        locator: Arc<dyn LocationLookup>,
    ) -> Result<Self, StartupError> {
        upstream
            .handshake()
            .await
            .map_err(StartupError::Handshake)?;

        let (registry, _) = ModelRegistry::warm_up(
            upstream.as_ref(),
            Some(cache.as_ref()),
            Duration::from_secs(config.model_cache_ttl_secs),
        )
        .await
        .map_err(StartupError::WarmUp)?;

        let state = AppState::new(
            Arc::new(registry),
            Arc::clone(&upstream),
            Arc::clone(&cache),
            locator,
        )
        .with_client_context_ttl(Duration::from_secs(config.client_context_ttl_secs));
        let server = GatewayServer::new(config, state)?;

        Ok(Self {
            server,
            cache,
            upstream,
        })
    }

    pub fn server(&mut self) -> &mut GatewayServer {
        &mut self.server
    }

    pub fn start_listeners(&mut self) -> (bool, bool) {
        let http = self.server.start_http();
        let https = self.server.start_https();
        (http, https)
    }

    pub async fn run_until<F>(mut self, signal: F)
    where
        F: Future<Output = ()>,
    {
        let (http, https) = self.start_listeners();
        if !http && !https {
            error!("no listener is enabled; waiting for termination signal");
        }

        await_termination(signal).await;
        self.shutdown().await;
    }

    /// Releases the cache first, then provider-local state, then drops the listeners.
    pub async fn shutdown(mut self) {
        info!("exiting");
        self.cache.release().await;
        self.upstream.release().await;
        self.server.stop();
        info!("gateway stopped");
    }
}

/// The only point where the main task waits; listeners never end the process themselves.
pub async fn await_termination<F>(signal: F)
where
    F: Future<Output = ()>,
{
    info!("waiting for termination signal");
    signal.await;
}

pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received interrupt, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
