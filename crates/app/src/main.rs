mod problem;
mod review;
mod router;
mod session;
mod telemetry;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tracing::info;

use id_review_store::{ImageResolver, RestRequestStore};
use id_review_util::{load_env_file, AppConfig};

const STORE_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let http = reqwest::Client::builder().timeout(STORE_TIMEOUT).build()?;
    let store = RestRequestStore::new(
        config.store.api_key.clone(),
        config.store.rest_url.clone(),
        config.store.table.clone(),
        http,
    );
    let images = ImageResolver::new(
        &config.store.image_base_url,
        config.store.placeholder_image_url.clone(),
    );

    let state = router::AppState::new(metrics, Arc::new(store), images);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), store = %config.store.url, table = %config.store.table, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
