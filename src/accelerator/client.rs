//! HTTP client for the remote accelerator service.
//!
//! Every call goes through [`AcceleratorClient::make_request`], which runs an
//! explicit retry loop: each attempt is bounded by the per-request timeout,
//! failed attempts are retried after a fixed delay until the retry budget or
//! the cumulative deadline runs out, and timed-out attempts are cancelled and
//! not retried.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::accelerator::config::AcceleratorConfig;
use crate::accelerator::error::AcceleratorError;
use crate::accelerator::health::{AcceleratorStatus, HealthState};
use crate::accelerator::types::{
    BatchSimilarityRequest, BatchSimilarityResponse, ContextualRequest, EmbeddedMemory,
    ProcessRequest, RelevantMemory, SimilarityRequest, SimilarityResponse, TaskPriority,
};
use crate::core::clock::{Clock, to_time_delta};
use crate::core::ids::UserId;

/// Client for the optional accelerator microservice.
pub struct AcceleratorClient {
    config: AcceleratorConfig,
    base_url: Url,
    http: reqwest::Client,
    health: HealthState,
    clock: Arc<dyn Clock>,
}

impl AcceleratorClient {
    /// Create a client. No request is made until the first health check.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: AcceleratorConfig, clock: Arc<dyn Clock>) -> Result<Self, AcceleratorError> {
        let mut base_url = Url::parse(&config.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| AcceleratorError::Client(e.to_string()))?;

        Ok(Self {
            config,
            base_url,
            http,
            health: HealthState::default(),
            clock,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &AcceleratorConfig {
        &self.config
    }

    /// Current state, taking staleness into account.
    #[must_use]
    pub fn status(&self) -> AcceleratorStatus {
        self.health.status(
            self.config.enabled,
            self.clock.now(),
            to_time_delta(self.config.health_stale_after),
        )
    }

    /// Whether the accelerator is enabled and recently healthy.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status() == AcceleratorStatus::Healthy
    }

    /// Probe `GET /health` once and record the result.
    pub async fn check_health(&self) -> bool {
        if !self.config.enabled {
            return false;
        }

        let result = self.probe_health().await;
        let healthy = result.is_ok();
        let was_healthy = self.health.record(healthy, self.clock.now());

        match result {
            Ok(()) if !was_healthy => info!("Accelerator is healthy"),
            Err(err) if was_healthy => warn!(error = %err, "Accelerator became unhealthy"),
            Err(err) => debug!(error = %err, "Accelerator health check failed"),
            Ok(()) => {}
        }
        healthy
    }

    /// Cosine similarity of two vectors.
    ///
    /// # Errors
    /// Returns an error if the accelerator is unavailable or the request fails.
    pub async fn similarity(&self, vector_a: &[f32], vector_b: &[f32]) -> Result<f64, AcceleratorError> {
        self.ensure_available()?;
        let response: SimilarityResponse = self
            .make_request(
                Method::POST,
                "api/memory/similarity",
                Some(&SimilarityRequest { vector_a, vector_b }),
            )
            .await?;
        Ok(response.similarity)
    }

    /// Similarity of `base_vector` to each of `vectors`, in order.
    ///
    /// # Errors
    /// Returns an error if the accelerator is unavailable or the request fails.
    pub async fn batch_similarity(
        &self,
        base_vector: &[f32],
        vectors: &[Vec<f32>],
    ) -> Result<Vec<f64>, AcceleratorError> {
        self.ensure_available()?;
        let response: BatchSimilarityResponse = self
            .make_request(
                Method::POST,
                "api/memory/batch-similarity",
                Some(&BatchSimilarityRequest {
                    base_vector,
                    vectors,
                }),
            )
            .await?;
        Ok(response.results)
    }

    /// Memories relevant to a context embedding.
    ///
    /// # Errors
    /// Returns an error if the accelerator is unavailable or the request fails.
    pub async fn contextual_memories(
        &self,
        user_id: UserId,
        context_embedding: &[f32],
        user_memories: &[EmbeddedMemory],
        similarity_threshold: f64,
        max_results: usize,
    ) -> Result<Vec<RelevantMemory>, AcceleratorError> {
        self.ensure_available()?;
        self.make_request(
            Method::POST,
            "api/memory/contextual",
            Some(&ContextualRequest {
                user_id: user_id.to_string(),
                context_embedding,
                user_memories,
                similarity_threshold,
                max_results,
            }),
        )
        .await
    }

    /// Submit a background processing task.
    ///
    /// # Errors
    /// Returns an error if the accelerator is unavailable or the request fails.
    pub async fn submit_task(
        &self,
        task_type: impl Into<String>,
        priority: TaskPriority,
        payload: Value,
    ) -> Result<Value, AcceleratorError> {
        self.ensure_available()?;
        let request = ProcessRequest {
            task_type: task_type.into(),
            priority,
            payload,
        };
        self.make_request(Method::POST, "api/memory/process", Some(&request))
            .await
    }

    /// Service statistics as reported by the accelerator.
    ///
    /// # Errors
    /// Returns an error if the accelerator is unavailable or the request fails.
    pub async fn stats(&self) -> Result<Value, AcceleratorError> {
        self.ensure_available()?;
        self.make_request::<(), Value>(Method::GET, "api/memory/stats", None)
            .await
    }

    /// Send a JSON request with bounded retries.
    ///
    /// # Errors
    /// Returns the last attempt's error once retries or the deadline are exhausted,
    /// or immediately for timeouts and non-retryable failures.
    pub async fn make_request<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, AcceleratorError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        if !self.config.enabled {
            return Err(AcceleratorError::Disabled);
        }

        let url = self.base_url.join(path)?;
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self.attempt(&method, &url, body, attempt).await {
                Ok(value) => {
                    debug!(%url, attempt, "Accelerator request succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() || attempt > self.config.max_retries {
                warn!(%url, attempt, error = %err, "Accelerator request failed");
                return Err(err);
            }

            if started.elapsed() + self.config.retry_delay >= self.config.request_deadline {
                warn!(%url, attempt, error = %err, "Accelerator deadline exhausted");
                return Err(AcceleratorError::DeadlineExceeded {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            warn!(%url, attempt, error = %err, "Retrying accelerator request");
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    fn ensure_available(&self) -> Result<(), AcceleratorError> {
        match self.status() {
            AcceleratorStatus::Disabled => Err(AcceleratorError::Disabled),
            AcceleratorStatus::Healthy => Ok(()),
            _ => Err(AcceleratorError::Unavailable),
        }
    }

    async fn attempt<B, R>(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&B>,
        attempt: u32,
    ) -> Result<R, AcceleratorError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let call = async {
            let mut request = self.http.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AcceleratorError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(response.json::<R>().await?)
        };

        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| AcceleratorError::Timeout { attempt })?
    }

    async fn probe_health(&self) -> Result<(), AcceleratorError> {
        let url = self.base_url.join("health")?;
        let call = async {
            let response = self.http.get(url).send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(AcceleratorError::Status {
                    status: status.as_u16(),
                    body: String::new(),
                })
            }
        };

        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| AcceleratorError::Timeout { attempt: 1 })?
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::core::clock::ManualClock;

    fn test_config(uri: &str) -> AcceleratorConfig {
        AcceleratorConfig::enabled_at(uri)
            .with_timeout(Duration::from_millis(200))
            .with_retries(2, Duration::from_millis(10))
    }

    fn test_client(config: AcceleratorConfig) -> (AcceleratorClient, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let client = AcceleratorClient::new(config, clock.clone()).unwrap();
        (client, clock)
    }

    async fn mount_health(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"status": "ok"})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_disabled_client_never_calls_out() {
        let (client, _clock) = test_client(AcceleratorConfig::default());
        assert_eq!(client.status(), AcceleratorStatus::Disabled);
        assert!(!client.check_health().await);
        assert!(matches!(
            client.similarity(&[1.0], &[1.0]).await,
            Err(AcceleratorError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_unchecked_client_is_unavailable() {
        let server = MockServer::start().await;
        let (client, _clock) = test_client(test_config(&server.uri()));
        assert_eq!(client.status(), AcceleratorStatus::Unchecked);
        assert!(matches!(
            client.stats().await,
            Err(AcceleratorError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_health_check_and_similarity() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/api/memory/similarity"))
            .and(body_partial_json(json!({"vectorA": [1.0, 0.0], "vectorB": [0.0, 1.0]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"similarity": 0.25})))
            .mount(&server)
            .await;

        let (client, _clock) = test_client(test_config(&server.uri()));
        assert!(client.check_health().await);
        assert!(client.is_available());

        let similarity = client.similarity(&[1.0, 0.0], &[0.0, 1.0]).await.unwrap();
        assert!((similarity - 0.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failed_health_check_marks_unhealthy() {
        let server = MockServer::start().await;
        mount_health(&server, 500).await;

        let (client, _clock) = test_client(test_config(&server.uri()));
        assert!(!client.check_health().await);
        assert_eq!(client.status(), AcceleratorStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_health_goes_stale() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;

        let (client, clock) = test_client(test_config(&server.uri()));
        assert!(client.check_health().await);

        clock.advance(Duration::from_secs(61));
        assert_eq!(client.status(), AcceleratorStatus::Stale);
        assert!(matches!(
            client.batch_similarity(&[1.0], &[vec![1.0]]).await,
            Err(AcceleratorError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_retries_transient_failure() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/api/memory/batch-similarity"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/memory/batch-similarity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [0.9, 0.1]})))
            .mount(&server)
            .await;

        let (client, _clock) = test_client(test_config(&server.uri()));
        assert!(client.check_health().await);

        let results = client
            .batch_similarity(&[1.0, 0.0], &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(results, vec![0.9, 0.1]);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/memory/stats"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let (client, _clock) = test_client(test_config(&server.uri()));
        let result = client
            .make_request::<(), Value>(Method::GET, "api/memory/stats", None)
            .await;
        assert!(matches!(result, Err(AcceleratorError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/memory/stats"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (client, _clock) = test_client(test_config(&server.uri()));
        let result = client
            .make_request::<(), Value>(Method::GET, "api/memory/stats", None)
            .await;
        assert!(matches!(result, Err(AcceleratorError::Timeout { attempt: 1 })));
    }

    #[tokio::test]
    async fn test_deadline_stops_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/memory/stats"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.request_deadline = Duration::from_millis(5);
        let (client, _clock) = test_client(config);

        let result = client
            .make_request::<(), Value>(Method::GET, "api/memory/stats", None)
            .await;
        assert!(matches!(
            result,
            Err(AcceleratorError::DeadlineExceeded { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_contextual_memories_and_submit_task() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/api/memory/contextual"))
            .and(body_partial_json(json!({"maxResults": 2, "similarityThreshold": 0.5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m2", "content": "asthma", "similarity": 0.93},
                {"id": "m1", "content": "likes tea", "similarity": 0.71, "relevanceScore": 0.8}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/memory/process"))
            .and(body_partial_json(json!({"type": "reindex", "priority": "low"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"queued": true})))
            .mount(&server)
            .await;

        let (client, _clock) = test_client(test_config(&server.uri()));
        assert!(client.check_health().await);

        let memories = client
            .contextual_memories(UserId::new(), &[0.1, 0.2], &[], 0.5, 2)
            .await
            .unwrap();
        assert_eq!(memories.len(), 2);
        assert_eq!(memories[0].id, "m2");
        assert_eq!(memories[1].relevance_score, Some(0.8));

        let queued = client
            .submit_task("reindex", TaskPriority::Low, json!({}))
            .await
            .unwrap();
        assert_eq!(queued["queued"], true);
    }
}
