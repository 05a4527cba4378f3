//! flow-llm - text generation for flows
//!
//! Providers speak the wire protocol of one external service, the router
//! picks a provider from a model id, and the invoker bounds each call with
//! a timeout.

pub mod invoker;
pub mod provider;
pub mod providers;
pub mod router;
pub mod testing;

pub use invoker::{GenerationInvoker, DEFAULT_GENERATION_TIMEOUT};
pub use provider::GenerationProvider;
pub use providers::{GeminiAuth, GeminiProvider, OpenAIProvider};
pub use router::{parse_model, ProviderRouter};
