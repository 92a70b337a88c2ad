//! Outbound webhook delivery
//!
//! Sends every accepted event to each matching webhook, concurrently and
//! exactly once. There are no retries; failures only feed the health
//! statistics.

use crate::matcher::is_relevant;
use crate::registry::{RegistryEntry, WebhookRegistry};
use crate::{Result, WebhookError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use relay_core::{HttpConfig, TxServiceEvent, WebhookId};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{redirect, Client};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Longest response body kept in outcomes and logs, in characters
pub const MAX_LOGGED_BODY: usize = 1024;

/// A 2xx answer from a webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub status_code: u16,
    pub elapsed_ms: u64,
    pub body: String,
}

/// Why a delivery did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The webhook answered with a non-2xx status
    #[error("Webhook responded with status {status_code}")]
    ErrorResponse { status_code: u16, body: String },

    /// The request was sent but no response arrived
    #[error("Response not received. Error: {message}")]
    NoResponse { message: String },

    /// The request could not be built
    #[error("Cannot make request. Error: {message}")]
    RequestNotSent { message: String },
}

/// Result of delivering one event to one webhook
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub webhook_id: WebhookId,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub result: std::result::Result<DeliveryResponse, DeliveryFailure>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Status code, when any response was received
    pub fn status_code(&self) -> Option<u16> {
        match &self.result {
            Ok(response) => Some(response.status_code),
            Err(DeliveryFailure::ErrorResponse { status_code, .. }) => Some(*status_code),
            Err(_) => None,
        }
    }
}

/// Fans events out to the webhooks in a [`WebhookRegistry`]
pub struct WebhookDispatcher {
    client: Client,
    registry: Arc<WebhookRegistry>,
}

impl WebhookDispatcher {
    /// Create a dispatcher with a client built from `config`
    pub fn new(registry: Arc<WebhookRegistry>, config: &HttpConfig) -> Result<Self> {
        let client = build_client(config)?;
        Ok(Self::with_client(registry, client))
    }

    pub fn with_client(registry: Arc<WebhookRegistry>, client: Client) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &Arc<WebhookRegistry> {
        &self.registry
    }

    /// Deliver `event` to every relevant active webhook.
    ///
    /// Returns once all deliveries have settled, one outcome per call made.
    pub async fn post_every_webhook(&self, event: &TxServiceEvent) -> Vec<DeliveryOutcome> {
        let body = event.body();
        let targets: Vec<RegistryEntry> = self
            .registry
            .get_active()
            .into_iter()
            .filter(|entry| is_relevant(&entry.subscription, event))
            .collect();

        join_all(
            targets
                .iter()
                .map(|entry| self.post_webhook(entry, body.as_ref())),
        )
        .await
    }

    async fn post_webhook(&self, entry: &RegistryEntry, body: &str) -> DeliveryOutcome {
        let subscription = &entry.subscription;
        let started_at = Utc::now();
        let result = self.send(&subscription.url, &subscription.authorization, body).await;

        match &result {
            Ok(response) => {
                entry.stats.record_success();
                info!(
                    webhook_id = %subscription.id,
                    url = %subscription.url,
                    start_time = %started_at,
                    status = response.status_code,
                    elapsed_ms = response.elapsed_ms,
                    data = %response.body,
                    "Success sending event"
                );
            }
            Err(failure) => {
                entry.stats.record_failure();
                let (status, data) = match failure {
                    DeliveryFailure::ErrorResponse { status_code, body } => {
                        (Some(*status_code), Some(body.as_str()))
                    }
                    _ => (None, None),
                };
                warn!(
                    webhook_id = %subscription.id,
                    url = %subscription.url,
                    start_time = %started_at,
                    event = %body,
                    status = ?status,
                    data = ?data,
                    error = %failure,
                    "Error sending event"
                );
            }
        }

        DeliveryOutcome {
            webhook_id: subscription.id,
            url: subscription.url.clone(),
            started_at,
            result,
        }
    }

    async fn send(
        &self,
        url: &str,
        authorization: &str,
        body: &str,
    ) -> std::result::Result<DeliveryResponse, DeliveryFailure> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_owned());

        if !authorization.is_empty() {
            request = request.header(AUTHORIZATION, authorization);
        }

        let request = request.build().map_err(|e| DeliveryFailure::RequestNotSent {
            message: e.to_string(),
        })?;

        let started = Instant::now();
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| DeliveryFailure::NoResponse {
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let body = truncate_body(&text);

        if status.is_success() {
            Ok(DeliveryResponse {
                status_code: status.as_u16(),
                elapsed_ms,
                body,
            })
        } else {
            Err(DeliveryFailure::ErrorResponse {
                status_code: status.as_u16(),
                body,
            })
        }
    }
}

/// Build the shared HTTP client.
///
/// With `max_redirects == 0` redirects are returned as-is, so a 3xx counts
/// as an error response.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    let policy = if config.max_redirects == 0 {
        redirect::Policy::none()
    } else {
        redirect::Policy::limited(config.max_redirects)
    };

    Client::builder()
        .timeout(config.timeout())
        .redirect(policy)
        .build()
        .map_err(|e| WebhookError::Http(e.to_string()))
}

fn truncate_body(text: &str) -> String {
    match text.char_indices().nth(MAX_LOGGED_BODY) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthConfig, HealthMonitor};
    use relay_core::{
        CategoryGroup, InMemoryWebhookRepository, WebhookRepository, WebhookSubscription,
    };
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn dispatcher_for(
        subscriptions: Vec<WebhookSubscription>,
        http: HttpConfig,
    ) -> WebhookDispatcher {
        let repository = Arc::new(InMemoryWebhookRepository::with_subscriptions(subscriptions));
        let health = HealthMonitor::new(repository.clone(), HealthConfig::default());
        let registry = Arc::new(WebhookRegistry::new(repository, health));
        registry.refresh().await.unwrap();
        WebhookDispatcher::new(registry, &http).unwrap()
    }

    fn safe_created() -> TxServiceEvent {
        TxServiceEvent::from_json(r#"{"chainId":"1","type":"SAFE_CREATED","address":"0xabc"}"#)
            .unwrap()
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");

        let long = "é".repeat(MAX_LOGGED_BODY + 10);
        assert_eq!(truncate_body(&long).chars().count(), MAX_LOGGED_BODY);
    }

    #[tokio::test]
    async fn test_no_match_makes_no_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let subscription = WebhookSubscription::new(server.uri())
            .with_groups(&[CategoryGroup::Reorgs]);
        let dispatcher = dispatcher_for(vec![subscription], HttpConfig::default()).await;

        let outcomes = dispatcher.post_every_webhook(&safe_created()).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_success_counts_and_sends_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("authorization", "Bearer secret"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(202).set_body_string("accepted"))
            .expect(1)
            .mount(&server)
            .await;

        let subscription = WebhookSubscription::new(format!("{}/hook", server.uri()))
            .with_authorization("Bearer secret");
        let id = subscription.id;
        let dispatcher = dispatcher_for(vec![subscription], HttpConfig::default()).await;

        let outcomes = dispatcher.post_every_webhook(&safe_created()).await;

        assert_eq!(outcomes.len(), 1);
        let response = outcomes[0].result.as_ref().unwrap();
        assert_eq!(response.status_code, 202);
        assert_eq!(response.body, "accepted");

        let stats = dispatcher.registry().get(&id).unwrap().stats;
        assert_eq!(stats.success_count(), 1);
        assert_eq!(stats.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_error_response_counts_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let subscription = WebhookSubscription::new(server.uri());
        let id = subscription.id;
        let dispatcher = dispatcher_for(vec![subscription], HttpConfig::default()).await;

        let outcomes = dispatcher.post_every_webhook(&safe_created()).await;

        assert_eq!(
            outcomes[0].result,
            Err(DeliveryFailure::ErrorResponse {
                status_code: 500,
                body: "boom".to_string()
            })
        );
        assert_eq!(outcomes[0].status_code(), Some(500));
        let stats = dispatcher.registry().get(&id).unwrap().stats;
        assert_eq!(stats.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_redirect_not_followed_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", format!("{}/new", server.uri())),
            )
            .mount(&server)
            .await;

        let subscription = WebhookSubscription::new(format!("{}/old", server.uri()));
        let dispatcher = dispatcher_for(vec![subscription], HttpConfig::default()).await;

        let outcomes = dispatcher.post_every_webhook(&safe_created()).await;

        assert_eq!(outcomes[0].status_code(), Some(301));
        assert!(!outcomes[0].is_success());
    }

    #[tokio::test]
    async fn test_timeout_is_no_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let subscription = WebhookSubscription::new(server.uri());
        let dispatcher = dispatcher_for(
            vec![subscription],
            HttpConfig::default().with_timeout_ms(50),
        )
        .await;

        let outcomes = dispatcher.post_every_webhook(&safe_created()).await;

        assert!(matches!(
            outcomes[0].result,
            Err(DeliveryFailure::NoResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_url_is_request_not_sent() {
        let subscription = WebhookSubscription::new("not a url");
        let dispatcher = dispatcher_for(vec![subscription], HttpConfig::default()).await;

        let outcomes = dispatcher.post_every_webhook(&safe_created()).await;

        assert!(matches!(
            outcomes[0].result,
            Err(DeliveryFailure::RequestNotSent { .. })
        ));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let good = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&good)
            .await;

        let dispatcher = dispatcher_for(
            vec![
                WebhookSubscription::new(good.uri()),
                WebhookSubscription::new("http://127.0.0.1:1/unreachable"),
            ],
            HttpConfig::default(),
        )
        .await;

        let outcomes = dispatcher.post_every_webhook(&safe_created()).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 1);
    }

    #[tokio::test]
    async fn test_deliveries_run_concurrently() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .expect(2)
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(
            vec![
                WebhookSubscription::new(format!("{}/a", server.uri())),
                WebhookSubscription::new(format!("{}/b", server.uri())),
            ],
            HttpConfig::default(),
        )
        .await;

        let started = Instant::now();
        let outcomes = dispatcher.post_every_webhook(&safe_created()).await;
        let elapsed = started.elapsed();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(DeliveryOutcome::is_success));
        assert!(elapsed < Duration::from_millis(550), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_in_flight_delivery_survives_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .expect(1)
            .mount(&server)
            .await;

        let subscription = WebhookSubscription::new(server.uri());
        let id = subscription.id;
        let repository = Arc::new(InMemoryWebhookRepository::with_subscriptions([subscription]));
        let health = HealthMonitor::new(repository.clone(), HealthConfig::default());
        let registry = Arc::new(WebhookRegistry::new(repository.clone(), health));
        registry.refresh().await.unwrap();
        let entry = registry.get(&id).unwrap();

        let dispatcher = Arc::new(WebhookDispatcher::new(registry.clone(), &HttpConfig::default()).unwrap());
        let in_flight = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.post_every_webhook(&safe_created()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        repository.deactivate(&id).await.unwrap();
        let report = registry.refresh().await.unwrap();
        assert_eq!(report.dropped, 1);
        assert!(registry.get(&id).is_none());

        let outcomes = in_flight.await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
        assert_eq!(entry.stats.success_count(), 1);
    }
}
