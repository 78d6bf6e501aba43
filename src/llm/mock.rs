//! 脚本化聊天服务（用于测试，无需 API）
//!
//! 按预设脚本依次回放回复：每条回复拆成小块模拟流式输出，并记录每次
//! 调用的模型、消息历史与工具声明，供断言使用。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::agent::ApiKey;
use crate::conversation::Message;
use crate::llm::{ChatChoice, ChatChunk, ChatService, ChunkStream, LlmError, StreamOptions};

/// 一次调用的记录
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub model: String,
    /// 调用时的完整消息历史
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

enum Scripted {
    /// 正常回复，按 chunk_chars 拆块回放
    Reply(String),
    /// 流在开头即失败
    Fail(String),
}

/// 脚本化聊天服务
pub struct MockChat {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RecordedCall>>,
    /// 每块最多字符数；按字符拆分，避免拆断多字节文本
    chunk_chars: usize,
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            chunk_chars: 7,
        }
    }

    /// 追加一条脚本回复
    pub fn push_reply(&self, text: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(text.into()));
    }

    /// 追加一次流式失败
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.into()));
    }

    /// 已发生的调用记录
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// 尚未消费的脚本条数
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatService for MockChat {
    async fn stream_chat(
        &self,
        _api_key: &ApiKey,
        messages: &[Message],
        options: &StreamOptions,
    ) -> Result<ChunkStream, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: options.model.clone(),
            messages: messages.to_vec(),
            tool_names: options.tools.iter().map(|t| t.name.clone()).collect(),
        });

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Scripted::Reply(text)) => {
                let mut items: Vec<Result<ChatChunk, LlmError>> = Vec::new();
                // 开头放一个不带文本的块，覆盖“候选无文本增量”的路径
                items.push(Ok(ChatChunk {
                    choices: vec![ChatChoice { content: None }],
                }));
                let chars: Vec<char> = text.chars().collect();
                for piece in chars.chunks(self.chunk_chars) {
                    items.push(Ok(ChatChunk::text(piece.iter().collect::<String>())));
                }
                Ok(Box::pin(stream::iter(items)))
            }
            Some(Scripted::Fail(message)) => {
                let items = vec![Err(LlmError::Upstream(message))];
                Ok(Box::pin(stream::iter(items)))
            }
            None => Err(LlmError::Upstream("脚本已耗尽".to_string())),
        }
    }
}
