use llm_gateway::config::Config;
use llm_gateway::lifecycle::{Gateway, termination_signal};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "failed to load configuration");
            return;
        }
    };

    info!("gateway loading");
    let gateway = match Gateway::start(&config).await {
        Ok(gateway) => gateway,
        Err(error) => {
            error!(%error, "gateway failed to start");
            return;
        }
    };

    info!("gateway starting");
    gateway.run_until(termination_signal()).await;
}
