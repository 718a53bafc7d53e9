//! OpenAI-compatible embedding provider using the `async-openai` crate.
//!
//! Works against any endpoint that follows the OpenAI embeddings spec via
//! the base URL override. Inputs are truncated to the model cap before the
//! request; transient failures retry with full-jitter backoff.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;

use super::{Embedder, normalize, truncate_input};
use crate::error::EmbedError;
use crate::retry::{FailureClass, RetryPolicy, with_retry};

/// OpenAI-compatible [`Embedder`].
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
    timeout: Duration,
    policy: RetryPolicy,
}

impl OpenAiEmbedder {
    /// Creates a provider for one embedding model.
    #[must_use]
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
            dimension,
            timeout,
            policy: RetryPolicy::default(),
        }
    }

    async fn request_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, (FailureClass, String)> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(inputs.to_vec())
            .build()
            .map_err(|e| (FailureClass::Permanent, e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| {
                (
                    FailureClass::Transient,
                    format!("embedding request timed out after {:?}", self.timeout),
                )
            })?
            .map_err(|e| {
                let message = e.to_string();
                let lowered = message.to_lowercase();
                let class = match &e {
                    async_openai::error::OpenAIError::Reqwest(_) => FailureClass::Transient,
                    _ if lowered.contains("rate limit") || lowered.contains("429") => {
                        FailureClass::Transient
                    }
                    _ => FailureClass::Permanent,
                };
                (class, message)
            })?;

        // The API may reorder entries; sort by index to restore input order.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<String> = texts.iter().map(|t| truncate_input(t).to_string()).collect();

        // Copy the shared references so each retry's future owns its
        // captures instead of borrowing the closure environment.
        let this = self;
        let inputs = inputs.as_slice();
        let mut vectors = with_retry(
            self.policy,
            move || async move { this.request_batch(inputs).await },
            |class, message, attempts| match class {
                FailureClass::Transient => EmbedError::Transient { message, attempts },
                FailureClass::Permanent => EmbedError::Permanent { message },
            },
        )
        .await?;

        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                sent: texts.len(),
                received: vectors.len(),
            });
        }
        for vector in &mut vectors {
            if vector.len() != self.dimension {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            normalize(vector);
        }
        Ok(vectors)
    }
}
