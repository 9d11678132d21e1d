use axum::Router;

use crate::DeploymentImpl;

pub mod catalog;
pub mod health;
pub mod samples;

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .merge(health::router(deployment))
        .merge(catalog::router(deployment))
        .merge(samples::router(deployment))
}
