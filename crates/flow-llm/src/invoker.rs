use std::time::{Duration, Instant};

use flow_core::{FlowError, GenerationError, GenerationErrorKind, GenerationRequest, GenerationResult};

use crate::router::ProviderRouter;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends one generation request to the routed provider, bounded by a timeout.
///
/// There is no retry here: a failed or timed-out generation is reported to
/// the caller as is.
#[derive(Clone)]
pub struct GenerationInvoker {
    router: ProviderRouter,
    timeout: Duration,
}

impl GenerationInvoker {
    pub fn new(router: ProviderRouter) -> Self {
        Self {
            router,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub async fn invoke(&self, request: GenerationRequest) -> Result<GenerationResult, FlowError> {
        let (provider, bare_model) = self.router.route(&request.model)?;
        let provider_name = provider.name().to_string();

        if request.options.search_enabled && !provider.supports_search() {
            return Err(GenerationError::new(
                provider_name,
                GenerationErrorKind::InvalidRequest,
                format!("model '{}' does not support web search", request.model),
            )
            .into());
        }

        let request = request.with_model(bare_model);
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, provider.generate(&request)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(result)) => {
                log::debug!(
                    "Generation via '{}' ({}) finished in {:.2?}, {} chars",
                    provider_name,
                    request.model,
                    elapsed,
                    result.text.len()
                );
                Ok(result)
            }
            Ok(Err(err)) => {
                log::warn!("Generation via '{}' failed after {:.2?}: {}", provider_name, elapsed, err);
                Err(err.into())
            }
            Err(_) => {
                log::warn!("Generation via '{}' timed out after {:?}", provider_name, self.timeout);
                Err(GenerationError::timeout(provider_name, self.timeout).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use flow_core::GenerationOptions;
    use std::sync::Arc;

    fn invoker_with(provider: Arc<MockProvider>) -> GenerationInvoker {
        GenerationInvoker::new(ProviderRouter::new().with_provider(provider))
    }

    #[tokio::test]
    async fn strips_namespace_before_calling_provider() {
        let provider = Arc::new(MockProvider::replying("gemini", "hello"));
        let invoker = invoker_with(provider.clone());

        let result = invoker
            .invoke(GenerationRequest::from_prompt("googleai/gemini-2.5-flash", "hi"))
            .await
            .unwrap();

        assert_eq!(result.text, "hello");
        assert_eq!(provider.requests()[0].model, "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = Arc::new(
            MockProvider::replying("gemini", "late").with_delay(Duration::from_millis(200)),
        );
        let invoker = invoker_with(provider).with_timeout(Duration::from_millis(20));

        let err = invoker
            .invoke(GenerationRequest::from_prompt("gemini-2.5-flash", "hi"))
            .await
            .unwrap_err();

        match err {
            FlowError::Generation(GenerationError {
                kind: GenerationErrorKind::Timeout,
                message,
                ..
            }) => assert_eq!(message, "no response within 20ms"),
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_errors_are_not_retried() {
        let provider = Arc::new(
            MockProvider::named("gemini")
                .then_fail(GenerationErrorKind::RateLimited, "quota")
                .then_reply("never seen"),
        );
        let invoker = invoker_with(provider.clone());

        let err = invoker
            .invoke(GenerationRequest::from_prompt("gemini-2.5-flash", "hi"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FlowError::Generation(GenerationError { kind: GenerationErrorKind::RateLimited, .. })
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn search_requires_capable_provider() {
        let provider = Arc::new(MockProvider::replying("gemini", "x"));
        let invoker = invoker_with(provider.clone());

        let request = GenerationRequest::from_prompt("gemini-2.5-flash", "hi")
            .with_options(GenerationOptions::default().with_search(true));
        let err = invoker.invoke(request).await.unwrap_err();

        assert!(matches!(
            err,
            FlowError::Generation(GenerationError { kind: GenerationErrorKind::InvalidRequest, .. })
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn unconfigured_provider_is_not_found_class() {
        let invoker = invoker_with(Arc::new(MockProvider::replying("gemini", "x")));
        let err = invoker
            .invoke(GenerationRequest::from_prompt("openai/gpt-4o-mini", "hi"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
