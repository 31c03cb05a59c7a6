pub mod chat_llm;
pub mod credentials;
pub mod gemini;
pub mod image_llm;
pub mod script_llm;

pub use chat_llm::OpenAiChatAdapter;
pub use credentials::{ApiKeySlot, SelectedKeyHost};
pub use gemini::GeminiClient;
pub use image_llm::GeminiImageAdapter;
pub use script_llm::GeminiScriptAdapter;
