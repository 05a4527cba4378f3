use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

/// Shared client for idempotent lookups (secrets, metadata, prompts).
///
/// Transient failures are retried with exponential backoff. Generation
/// calls never go through this client.
pub type RetryClient = Arc<ClientWithMiddleware>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_retry_client() -> RetryClient {
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|err| {
            log::warn!("Falling back to default HTTP client: {}", err);
            Client::new()
        });
    wrap_with_retry(client, 3)
}

pub fn wrap_with_retry(client: Client, max_retries: u32) -> RetryClient {
    // 100ms, 200ms, 400ms... capped at 5s
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(5))
        .build_with_max_retries(max_retries);

    Arc::new(
        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build(),
    )
}

/// A client that never retries, for tests against mock servers.
pub fn plain_client() -> RetryClient {
    Arc::new(ClientBuilder::new(Client::new()).build())
}
