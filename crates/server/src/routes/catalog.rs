//! Site and brand catalog, and validation of the technical-info form.

use axum::{
    Json, Router,
    extract::Path,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use services::services::catalog::{self, Brand, SampleEntryContext, Site, TechnicalInfoForm};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TechnicalInfoRequest {
    pub site: Option<String>,
    pub analysis_date: Option<NaiveDate>,
    pub brand: Option<String>,
}

/// List production sites
pub async fn list_sites() -> ResponseJson<ApiResponse<Vec<Site>>> {
    ResponseJson(ApiResponse::success(catalog::SITES.to_vec()))
}

/// List the brands produced on a site
pub async fn list_brands(
    Path(site_id): Path<String>,
) -> Result<ResponseJson<ApiResponse<Vec<Brand>>>, ApiError> {
    let site = catalog::site(&site_id).ok_or_else(|| ApiError::NotFound(format!("site {site_id}")))?;
    Ok(ResponseJson(ApiResponse::success(
        catalog::brands_for_site(site.id).to_vec(),
    )))
}

/// Validate the technical-info form and build the sample entry context
pub async fn submit_technical_info(
    Json(request): Json<TechnicalInfoRequest>,
) -> Result<ResponseJson<ApiResponse<SampleEntryContext>>, ApiError> {
    let mut form = TechnicalInfoForm::new(request.site.as_deref(), request.analysis_date);
    if let Some(brand) = request.brand.as_deref() {
        form.select_brand(brand)?;
    }
    let context = form.submit(Utc::now())?;
    tracing::info!(
        site = %context.site,
        brand = %context.brand,
        reference = %context.reference,
        "Technical info validated"
    );
    Ok(ResponseJson(ApiResponse::success(context)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/sites", get(list_sites))
        .route("/sites/{site_id}/brands", get(list_brands))
        .route("/technical-info", post(submit_technical_info))
}
