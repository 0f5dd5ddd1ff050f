pub mod llm;
pub mod openai;
pub mod gemini;
pub mod anthropic;

pub use openai::OpenAIAdapter;
pub use gemini::GeminiAdapter;
pub use anthropic::AnthropicAdapter;
