//! REST client for the external vector store.
//!
//! Speaks the pinned contract over JSON: namespaced upsert/query/delete
//! with bearer auth. Transient responses (429, 5xx) and transport errors
//! retry with full-jitter backoff; 4xx payload rejections surface as
//! permanent errors immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Filter, QueryMatch, VectorRecord, VectorStore};
use crate::error::StoreError;
use crate::retry::{FailureClass, RetryPolicy, with_retry};

/// HTTP [`VectorStore`] client.
#[derive(Debug, Clone)]
pub struct RestVectorStore {
    client: reqwest::Client,
    base_url: String,
    index: String,
    api_key: String,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    upserted: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    matches: Vec<QueryMatch>,
}

impl RestVectorStore {
    /// Creates a client for one index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Permanent`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        index: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StoreError::Permanent {
                message: format!("http client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
            api_key: api_key.into(),
            policy: RetryPolicy::default(),
        })
    }

    fn namespace_url(&self, namespace: &str, suffix: &str) -> String {
        format!(
            "{}/indexes/{}/namespaces/{namespace}{suffix}",
            self.base_url, self.index
        )
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, (FailureClass, String)> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                let class = if e.is_timeout() || e.is_connect() || e.is_request() {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                };
                (class, e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let class = FailureClass::from_status(status.as_u16());
        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(200).collect();
        Err((class, format!("{status}: {preview}")))
    }

    fn exhausted(class: FailureClass, message: String, attempts: u32) -> StoreError {
        match class {
            FailureClass::Transient => StoreError::Transient { message, attempts },
            FailureClass::Permanent => StoreError::Permanent { message },
        }
    }
}

#[async_trait]
impl VectorStore for RestVectorStore {
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let url = self.namespace_url(namespace, "/upsert");
        let body = json!({ "records": records });

        // Copy the shared references so each retry's future owns its
        // captures instead of borrowing the closure environment.
        let this = self;
        let url = url.as_str();
        let body = &body;
        let response = with_retry(
            self.policy,
            move || async move {
                let request = this.client.post(url).json(body);
                let response = this.send_json(request).await?;
                response
                    .json::<UpsertResponse>()
                    .await
                    .map_err(|e| (FailureClass::Permanent, format!("decode: {e}")))
            },
            Self::exhausted,
        )
        .await?;

        Ok(response.upserted)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let url = self.namespace_url(namespace, "/query");
        let mut body = json!({
            "vector": vector,
            "top_k": top_k,
            "include_metadata": true,
        });
        if let Some(filter) = filter
            && !filter.is_empty()
            && let Some(map) = body.as_object_mut()
        {
            map.insert(
                "filter".to_string(),
                serde_json::to_value(filter).unwrap_or_default(),
            );
        }

        let this = self;
        let url = url.as_str();
        let body = &body;
        let response = with_retry(
            self.policy,
            move || async move {
                let request = this.client.post(url).json(body);
                let response = this.send_json(request).await?;
                response
                    .json::<QueryResponse>()
                    .await
                    .map_err(|e| (FailureClass::Permanent, format!("decode: {e}")))
            },
            Self::exhausted,
        )
        .await?;

        Ok(response.matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        let url = self.namespace_url(namespace, "");

        let this = self;
        let url = url.as_str();
        with_retry(
            self.policy,
            move || async move {
                let request = this.client.delete(url);
                this.send_json(request).await.map(|_| ())
            },
            Self::exhausted,
        )
        .await
    }
}
