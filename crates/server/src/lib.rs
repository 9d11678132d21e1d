use std::{collections::HashMap, sync::Arc};

use axum::Router;
use services::services::samples::{SampleBook, SampleStore, Synced};
use tokio::sync::{Mutex, MutexGuard};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod error;
pub mod routes;

/// Per-brand sample books as last returned to the client
pub type Sessions = HashMap<String, Synced<SampleBook>>;

#[derive(Clone)]
pub struct DeploymentImpl {
    store: Arc<SampleStore>,
    sessions: Arc<Mutex<Sessions>>,
}

impl DeploymentImpl {
    pub fn new(store: SampleStore) -> Self {
        Self {
            store: Arc::new(store),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Held for the whole sample operation, so operations run one at a time.
    pub async fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().await
    }
}

pub fn app(deployment: DeploymentImpl) -> Router {
    Router::new()
        .nest("/api", routes::router(&deployment))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
