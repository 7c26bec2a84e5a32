//! Rakuten Books search provider.

use std::sync::Arc;

use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::Url;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::config::CatalogConfig;
use crate::error::LookupError;
use crate::lookup::{CatalogItem, CatalogProvider, CatalogQueryResult, CompletionGuard, CompletionHandler};
use crate::progress::{emit_progress, ProgressHandler};

/// Upper bound on the up-front buffer reservation taken from `Content-Length`.
const MAX_PREALLOC: u64 = 256 * 1024;

#[derive(Clone)]
pub struct RakutenBooksProvider {
    client: reqwest::Client,
    endpoint: Url,
    application_id: String,
    runtime: Handle,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl std::fmt::Debug for RakutenBooksProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RakutenBooksProvider")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl RakutenBooksProvider {
    /// Fails fast when the application ID is empty or the endpoint is not a URL.
    /// Completions run as tasks on `runtime`.
    pub fn new(config: &CatalogConfig, runtime: Handle) -> Result<Self, LookupError> {
        config.ensure_credential()?;
        let endpoint = Url::parse(&config.endpoint).map_err(|e| LookupError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            detail: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            application_id: config.application_id.clone(),
            runtime,
            progress: None,
        })
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(handler);
        self
    }

    /// Performs the round trip in the caller's task.
    pub async fn query(&self, isbn: &str) -> CatalogQueryResult {
        let url = build_request_url(&self.endpoint, isbn, &self.application_id);
        tracing::debug!(isbn, "requesting catalog item");
        let body = self.receive_body(isbn, url).await.map_err(|e| {
            // the request URL carries the application ID
            let e = e.without_url();
            tracing::warn!(isbn, "catalog request failed: {}", e);
            LookupError::Transport(e.to_string())
        })?;
        parse_catalog_response(&body)
    }

    async fn receive_body(&self, isbn: &str, url: Url) -> Result<Vec<u8>, reqwest::Error> {
        let mut response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::warn!(isbn, status = %response.status(), "catalog returned non-success status");
        }
        let total = response.content_length();
        // fresh per request; nothing from an earlier response can leak in
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(MAX_PREALLOC) as usize);
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            emit_progress(self.progress.as_deref(), isbn, chunk.len(), body.len() as u64, total);
        }
        tracing::debug!(isbn, bytes = body.len(), "catalog response complete");
        Ok(body)
    }
}

impl CatalogProvider for RakutenBooksProvider {
    fn name(&self) -> &str {
        "rakuten"
    }

    fn fetch(&self, isbn: &str, on_complete: CompletionHandler) {
        let this = self.clone();
        let isbn = isbn.to_string();
        let guard = CompletionGuard::new(on_complete);
        // a task that never runs (runtime gone) drops the guard, which answers
        self.runtime.spawn(async move {
            let result = this.query(&isbn).await;
            guard.complete(result);
        });
    }
}

/// `<endpoint>?format=json&isbn=<isbn>&applicationId=<id>`
pub fn build_request_url(endpoint: &Url, isbn: &str, application_id: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("format", "json")
        .append_pair("isbn", isbn)
        .append_pair("applicationId", application_id);
    url
}

/// Extracts `Items[0].Item.{title,itemUrl}`. Any structural mismatch is
/// reported as [`LookupError::MalformedResponse`].
pub fn parse_catalog_response(body: &[u8]) -> CatalogQueryResult {
    let v: Value = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("catalog body is not JSON: {}", e);
        LookupError::MalformedResponse
    })?;
    let item = v
        .as_object()
        .and_then(|o| o.get("Items"))
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|first| first.get("Item"))
        .and_then(Value::as_object)
        .ok_or_else(|| {
            tracing::warn!("catalog body has no Items[0].Item");
            LookupError::MalformedResponse
        })?;

    Ok(CatalogItem {
        title: item.get("title").and_then(Value::as_str).map(String::from),
        storefront_url: item
            .get("itemUrl")
            .and_then(Value::as_str)
            .and_then(|s| Url::parse(s).ok()),
    })
}
