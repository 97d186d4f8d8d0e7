/// Embedding client — the single point of entry for calls to the external
/// embedding service used by the semantic resolver tier.
///
/// Batches are only ever submitted through `embed_all`, which pages the input
/// with a hard per-call cap and accumulates every page. A caller cannot build
/// an oversized or truncated page.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Hard per-request item cap of the embedding API.
pub const MAX_BATCH_ITEMS: usize = 96;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Embedding service returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("Embedding service is not configured")]
    Disabled,
}

/// A slice of at most `MAX_BATCH_ITEMS` inputs. Only `embed_all` constructs these.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingPage<'a> {
    texts: &'a [String],
}

impl<'a> EmbeddingPage<'a> {
    pub fn texts(&self) -> &'a [String] {
        self.texts
    }
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_page(&self, page: EmbeddingPage<'_>) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embeds every input, one capped page at a time, preserving order.
pub async fn embed_all(
    service: &dyn EmbeddingService,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for (page_no, chunk) in texts.chunks(MAX_BATCH_ITEMS).enumerate() {
        let page = EmbeddingPage { texts: chunk };
        let mut embedded = service.embed_page(page).await?;
        if embedded.len() != chunk.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: chunk.len(),
                got: embedded.len(),
            });
        }
        debug!("Embedded page {} ({} items)", page_no + 1, chunk.len());
        vectors.append(&mut embedded);
    }
    Ok(vectors)
}

/// Cosine similarity; 0.0 when either vector is empty, zero, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Stand-in used when no embedding endpoint is configured. Every call fails
/// with `Disabled`, which the semantic tier treats as an outage.
pub struct DisabledEmbeddings;

#[async_trait]
impl EmbeddingService for DisabledEmbeddings {
    async fn embed_page(&self, _page: EmbeddingPage<'_>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// HTTP client for an OpenAI-compatible `/embeddings` endpoint, with retry on
/// 429 and 5xx using exponential backoff.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl EmbeddingClient {
    pub fn new(url: String, api_key: Option<String>, model: String) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            url,
            api_key,
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingService for EmbeddingClient {
    async fn embed_page(&self, page: EmbeddingPage<'_>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: page.texts(),
        };

        let mut last_error: Option<EmbeddingError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 500ms, 1s, 2s
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                warn!(
                    "Embedding call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(EmbeddingError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let text = response.text().await.unwrap_or_default();
                warn!("Embedding API returned {}: {}", status, text);
                last_error = Some(EmbeddingError::Api {
                    status: status.as_u16(),
                    message: text,
                });
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiError>(&text)
                    .map(|e| e.error.message)
                    .unwrap_or(text);
                return Err(EmbeddingError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: EmbeddingResponse = response.json().await?;
            return Ok(order_by_index(parsed.data));
        }

        Err(last_error.unwrap_or(EmbeddingError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

fn order_by_index(mut data: Vec<EmbeddingDatum>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeEmbeddings;
    use super::*;

    #[tokio::test]
    async fn test_embed_all_pages_without_dropping_items() {
        let service = FakeEmbeddings::default();
        let texts: Vec<String> = (0..(MAX_BATCH_ITEMS * 2 + 5)).map(|i| format!("term {i}")).collect();

        let vectors = embed_all(&service, &texts).await.unwrap();

        assert_eq!(vectors.len(), texts.len());
        assert_eq!(
            *service.page_sizes.lock().unwrap(),
            vec![MAX_BATCH_ITEMS, MAX_BATCH_ITEMS, 5]
        );
    }

    #[tokio::test]
    async fn test_embed_all_empty_input_makes_no_calls() {
        let service = FakeEmbeddings::default();
        let vectors = embed_all(&service, &[]).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(service.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_service_errors() {
        let err = embed_all(&DisabledEmbeddings, &["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Disabled));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_response_is_reordered_by_index() {
        let data = vec![
            EmbeddingDatum {
                index: 1,
                embedding: vec![2.0],
            },
            EmbeddingDatum {
                index: 0,
                embedding: vec![1.0],
            },
        ];
        assert_eq!(order_by_index(data), vec![vec![1.0], vec![2.0]]);
    }
}
