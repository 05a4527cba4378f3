mod common;
pub mod gemini;
pub mod openai;

pub use gemini::{GeminiAuth, GeminiProvider};
pub use openai::OpenAIProvider;
