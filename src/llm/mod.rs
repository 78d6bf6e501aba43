//! 聊天层：服务抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockChat, RecordedCall};
pub use openai::OpenAiChat;
pub use traits::{ChatChoice, ChatChunk, ChatService, ChunkStream, LlmError, StreamOptions};
