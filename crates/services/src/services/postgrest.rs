//! PostgREST client for the remote sample table (Supabase-style REST endpoint).

use std::time::Duration;

use async_trait::async_trait;
use db::models::sample::{RemoteSample, SampleId};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{
    config::RemoteConfig,
    remote_store::{Columns, RemoteError, RemoteStore, SampleQuery},
};

const REST_PATH: &str = "rest/v1/";

/// Error body returned by PostgREST
#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: Client,
    rest_base: Url,
    api_key: SecretString,
    table: String,
}

impl PostgrestClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| RemoteError::Transport(format!("invalid remote url {}: {e}", config.url)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let rest_base = base
            .join(REST_PATH)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("qc-samples/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            rest_base,
            api_key: config.api_key.clone(),
            table: config.table.clone(),
        })
    }

    /// Table endpoint with the query's filters encoded as PostgREST parameters.
    pub fn table_url(&self, query: &SampleQuery) -> Result<Url, RemoteError> {
        let mut url = self
            .rest_base
            .join(&self.table)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(
                "select",
                match query.columns {
                    Columns::All => "*",
                    Columns::IdOnly => "id",
                },
            );
            if let Some(brand) = &query.brand {
                pairs.append_pair("brand", &format!("eq.{brand}"));
            }
            if let Some(id) = &query.id {
                pairs.append_pair("id", &format!("eq.{id}"));
            }
            if query.newest_first {
                pairs.append_pair("order", "created_at.desc");
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    pub fn rpc_url(&self, function: &str) -> Result<Url, RemoteError> {
        self.rest_base
            .join(&format!("rpc/{function}"))
            .map_err(|e| RemoteError::Transport(e.to_string()))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        request
            .header("apikey", key)
            .bearer_auth(key)
            .header("content-type", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let res = self.authorized(request).send().await.map_err(map_reqwest_error)?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.unwrap_or_default();
        Err(query_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl RemoteStore for PostgrestClient {
    async fn select(&self, query: &SampleQuery) -> Result<Vec<RemoteSample>, RemoteError> {
        let url = self.table_url(query)?;
        debug!(url = %url, "Remote select");
        self.send(self.http.get(url))
            .await?
            .json::<Vec<RemoteSample>>()
            .await
            .map_err(|e| RemoteError::Serde(e.to_string()))
    }

    async fn insert(&self, sample: &RemoteSample) -> Result<RemoteSample, RemoteError> {
        let url = self
            .rest_base
            .join(&self.table)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let rows = self
            .send(
                self.http
                    .post(url)
                    .header("Prefer", "return=representation")
                    .json(&[sample]),
            )
            .await?
            .json::<Vec<RemoteSample>>()
            .await
            .map_err(|e| RemoteError::Serde(e.to_string()))?;

        rows.into_iter().next().ok_or(RemoteError::Empty)
    }

    async fn delete(&self, id: &SampleId) -> Result<(), RemoteError> {
        let mut url = self
            .rest_base
            .join(&self.table)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, RemoteError> {
        let url = self.rpc_url(function)?;
        let res = self.send(self.http.post(url).json(&args)).await?;
        let body = res
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::Serde(e.to_string()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(e.to_string())
    }
}

fn query_error(status: u16, body: &str) -> RemoteError {
    match serde_json::from_str::<PostgrestErrorBody>(body) {
        Ok(parsed) => {
            let mut message = parsed.message.unwrap_or_else(|| body.to_string());
            if let Some(details) = parsed.details.filter(|d| !d.is_empty()) {
                message = format!("{message} ({details})");
            }
            RemoteError::Query {
                status,
                code: parsed.code,
                message,
            }
        }
        Err(_) => RemoteError::Query {
            status,
            code: None,
            message: body.to_string(),
        },
    }
}
