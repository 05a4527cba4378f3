//! Scriptable in-process provider for tests of flows and the HTTP surface.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flow_core::{GenerationError, GenerationErrorKind, GenerationRequest, GenerationResult};

use crate::provider::{GenerationProvider, Result};

enum Scripted {
    Text(String),
    Error(GenerationError),
}

/// Replies with queued responses in order; once the queue is drained the
/// last text reply is repeated (or an empty string if there was none).
pub struct MockProvider {
    name: String,
    search: bool,
    delay: Option<Duration>,
    script: Mutex<VecDeque<Scripted>>,
    last_text: Mutex<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockProvider {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            search: false,
            delay: None,
            script: Mutex::new(VecDeque::new()),
            last_text: Mutex::new(String::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::named(name).then_reply(text)
    }

    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Text(text.into()));
        self
    }

    pub fn then_fail(self, kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        let error = GenerationError::new(self.name.clone(), kind, message);
        self.push(Scripted::Error(error));
        self
    }

    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search = enabled;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far, with the bare model id.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }

    fn push(&self, item: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_search(&self) -> bool {
        self.search
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        match next {
            Some(Scripted::Error(error)) => Err(error),
            Some(Scripted::Text(text)) => {
                if let Ok(mut last) = self.last_text.lock() {
                    *last = text.clone();
                }
                Ok(GenerationResult::text(request.model.clone(), text))
            }
            None => {
                let text = self
                    .last_text
                    .lock()
                    .map(|last| last.clone())
                    .unwrap_or_default();
                Ok(GenerationResult::text(request.model.clone(), text))
            }
        }
    }
}
