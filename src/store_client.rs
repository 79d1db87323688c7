// src/store_client.rs

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

pub const REST_PATH: &str = "/rest/v1";

const REQUEST_TIMEOUT_SECS: u64 = 30;

// --- Store Error Type ---

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("Store API error: Status={status}, Message='{message}'")]
    Api { status: StatusCode, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// The message to surface to API callers: the store's own message for
    /// query errors, the display form otherwise.
    pub fn public_message(&self) -> String {
        match self {
            StoreError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

// PostgREST error bodies carry the useful text in `message`.
#[derive(Debug, Deserialize)]
struct StoreErrorPayload {
    message: Option<String>,
}

// --- Configuration ---

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub base_url: String,
    pub service_key: String,
}

impl StoreConfig {
    /// Reads SUPABASE_URL plus the service-role key (falling back to the anon
    /// key). Returns None when either is absent or blank, so the caller can
    /// start in unconfigured mode and report it per request.
    pub fn from_env() -> Option<Self> {
        let non_blank = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        let base_url = non_blank("SUPABASE_URL")?;
        let service_key =
            non_blank("SUPABASE_SERVICE_ROLE_KEY").or_else(|| non_blank("SUPABASE_ANON_KEY"))?;

        Some(Self {
            base_url,
            service_key,
        })
    }
}

// --- Client ---

/// Thin client for the managed store's PostgREST surface. Filters are passed
/// as query pairs in the `column=op.value` dialect, e.g.
/// `("work_date", "gte.2024-02-01")`.
#[derive(Clone)]
pub struct StoreClient {
    config: Arc<StoreConfig>,
    http_client: Client,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(&config.service_key)
            .map_err(|_| StoreError::Config("service key is not a valid header value".into()))?;
        headers.insert(HeaderName::from_static("apikey"), key_value);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| StoreError::Config("service key is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        // Validate the base URL once so later request building cannot fail on it.
        Url::parse(&config.base_url)?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        let base = self.config.base_url.trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}/{}", base, REST_PATH, table))?)
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, StoreError> {
        let url = self.table_url(table)?;
        Ok(self.http_client.request(method, url))
    }

    /// Runs a filtered select against `table` and deserializes the row set.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let request = self.request(Method::GET, table)?.query(query);
        self.send_and_deserialize(request, table).await
    }

    /// Like `select`, but asks for at most one row and returns it if present.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, StoreError> {
        let mut limited: Vec<(&str, String)> = query.to_vec();
        limited.push(("limit", "1".to_string()));
        let rows: Vec<T> = self.select(table, &limited).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert-or-update on the given conflict target, returning the stored
    /// representation.
    pub async fn upsert<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        on_conflict: &str,
        body: &B,
    ) -> Result<Vec<T>, StoreError> {
        let request = self
            .request(Method::POST, table)?
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(body);
        self.send_and_deserialize(request, table).await
    }

    async fn send_and_deserialize<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context_msg: &str,
    ) -> Result<T, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        debug!("Store response for '{}': Status={}", context_msg, status);

        if status.is_success() {
            let text = response.text().await?;
            match serde_json::from_str::<T>(&text) {
                Ok(data) => Ok(data),
                Err(e) => {
                    error!(
                        "JSON deserialization failed for '{}': {} (body: {})",
                        context_msg, e, text
                    );
                    Err(StoreError::Json(e))
                }
            }
        } else {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            let message = match serde_json::from_str::<StoreErrorPayload>(&error_body) {
                Ok(parsed) => parsed.message.unwrap_or(error_body),
                Err(_) => error_body,
            };
            error!(
                "Store API error for '{}': Status={}, Message='{}'",
                context_msg, status, message
            );
            Err(StoreError::Api { status, message })
        }
    }
}
