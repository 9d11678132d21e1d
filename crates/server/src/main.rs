use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use server::{DeploymentImpl, app};
use services::services::{
    config::Config,
    local_mirror::{LocalMirror, SqliteSlot},
    postgrest::PostgrestClient,
    samples::SampleStore,
};
use tracing::info;
use utils::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    info!(
        remote_url = %config.remote.url,
        remote_key = %config.remote.masked_key(),
        table = %config.remote.table,
        "Remote store configured"
    );

    let db = DBService::new(&config.database_url)
        .await
        .with_context(|| format!("failed to open local database {}", config.database_url))?;
    let remote = PostgrestClient::new(&config.remote)?;
    let mirror = LocalMirror::new(Arc::new(SqliteSlot::new(db)));
    let deployment = DeploymentImpl::new(SampleStore::new(Arc::new(remote), mirror));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");
    axum::serve(listener, app(deployment)).await?;

    Ok(())
}
