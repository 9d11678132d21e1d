//! Sample list, creation and synchronisation for one brand.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::sample::{Sample, SampleId};
use serde::Serialize;
use services::services::{
    notification::Toast,
    samples::{Mode, NewSample, SampleBook, SampleError, Synced},
};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Clone, Serialize, TS)]
pub struct SamplesResponse {
    pub mode: Mode,
    pub brand: String,
    pub samples: Vec<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SampleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<usize>,
    pub toast: Option<Toast>,
}

impl SamplesResponse {
    fn new(book: &Synced<SampleBook>, toast: Option<Toast>) -> Self {
        let inner = book.get();
        Self {
            mode: book.mode(),
            brand: inner.brand.clone(),
            samples: inner.samples.clone(),
            id: None,
            pushed: None,
            remaining: None,
            toast,
        }
    }
}

fn brand_key(brand: &str) -> Result<String, ApiError> {
    let brand = brand.trim();
    if brand.is_empty() {
        return Err(SampleError::MissingBrand.into());
    }
    Ok(brand.to_string())
}

/// Load the samples of a brand, from the remote store or the local mirror
pub async fn get_samples(
    State(deployment): State<DeploymentImpl>,
    Path(brand): Path<String>,
) -> Result<ResponseJson<ApiResponse<SamplesResponse>>, ApiError> {
    let mut sessions = deployment.sessions().await;
    let outcome = deployment.store().load(&brand).await?;

    let response = SamplesResponse::new(&outcome.book, outcome.toast);
    sessions.insert(response.brand.clone(), outcome.book);
    Ok(ResponseJson(ApiResponse::success(response)))
}

/// Add a sample to a brand, saved locally when the remote store is unavailable
pub async fn add_sample(
    State(deployment): State<DeploymentImpl>,
    Path(brand): Path<String>,
    Json(request): Json<NewSample>,
) -> Result<ResponseJson<ApiResponse<SamplesResponse>>, ApiError> {
    let brand = brand_key(&brand)?;
    let mut sessions = deployment.sessions().await;
    let book = sessions
        .remove(&brand)
        .unwrap_or_else(|| Synced::Online(SampleBook::new(brand.clone())));

    let outcome = deployment.store().add_sample(book, request).await;

    let mut response = SamplesResponse::new(&outcome.book, Some(outcome.toast));
    response.id = outcome.id;
    sessions.insert(brand, outcome.book);
    Ok(ResponseJson(ApiResponse::success(response)))
}

/// Push the brand's locally saved samples to the remote store
pub async fn synchronize_samples(
    State(deployment): State<DeploymentImpl>,
    Path(brand): Path<String>,
) -> Result<ResponseJson<ApiResponse<SamplesResponse>>, ApiError> {
    let brand = brand_key(&brand)?;
    let mut sessions = deployment.sessions().await;
    let book = match sessions.remove(&brand) {
        Some(book) => book,
        // Pending records from an earlier run only live in the mirror.
        None => Synced::Offline(SampleBook {
            samples: deployment.store().mirror().read(&brand).await,
            brand: brand.clone(),
        }),
    };

    let outcome = deployment.store().synchronize(book).await;

    let mut response = SamplesResponse::new(&outcome.book, Some(outcome.toast));
    response.pushed = Some(outcome.pushed);
    response.remaining = Some(outcome.remaining);
    sessions.insert(brand, outcome.book);
    Ok(ResponseJson(ApiResponse::success(response)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/brands/{brand}/samples", get(get_samples).post(add_sample))
        .route("/brands/{brand}/samples/sync", post(synchronize_samples))
}
