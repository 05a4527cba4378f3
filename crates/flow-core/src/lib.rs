//! flow-core - Core types for named LLM flows
//!
//! - `message` - role-tagged chat messages
//! - `generation` - provider-agnostic request/result/error types
//! - `shape` - declared flow input/output shapes and validation
//! - `template` - `{key}` prompt templates
//! - `postprocess` - fence stripping and JSON parsing with strict/lenient policies
//! - `registry` - the `Flow` trait and the name-based dispatcher

pub mod error;
pub mod generation;
pub mod message;
pub mod postprocess;
pub mod registry;
pub mod shape;
pub mod template;

pub use error::{FlowError, Result};
pub use generation::{
    GenerationError, GenerationErrorKind, GenerationOptions, GenerationRequest, GenerationResult,
    ResponseFormat,
};
pub use message::{Message, Role};
pub use postprocess::{post_process, strip_fence, wrap_in_fence, FallbackRecord, JsonPolicy, OutputPolicy};
pub use registry::{Flow, FlowDescriptor, FlowRegistry, FlowRegistryBuilder, RegistryError, SharedFlow};
pub use shape::{Field, Shape};
pub use template::PromptTemplate;
