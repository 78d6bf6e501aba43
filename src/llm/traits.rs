//! 聊天服务抽象
//!
//! 以流式方式调用 OpenAI 兼容接口：一次调用返回块序列，每块零或多个
//! 候选，候选可能不带文本（如纯工具调用增量）。块流惰性、有限、不可
//! 重放，消费一次即止。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::agent::{Agent, ApiKey};
use crate::conversation::Message;
use crate::tools::ToolSpec;

/// 聊天服务错误
#[derive(Error, Debug)]
pub enum LlmError {
    /// 请求构造失败（参数不合法）
    #[error("请求构造失败: {0}")]
    InvalidRequest(String),

    /// 上游接口失败，包括流中途断开
    #[error("上游接口错误: {0}")]
    Upstream(String),
}

/// 流式块中的单个候选；content 为 None 表示本块没有文本增量
#[derive(Clone, Debug, Default)]
pub struct ChatChoice {
    pub content: Option<String>,
}

/// 一个流式块：零或多个候选
#[derive(Clone, Debug, Default)]
pub struct ChatChunk {
    pub choices: Vec<ChatChoice>,
}

impl ChatChunk {
    /// 构造单候选文本块
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![ChatChoice {
                content: Some(content.into()),
            }],
        }
    }
}

/// 块流
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>>;

/// 一次流式调用的请求参数
#[derive(Clone, Debug, Default)]
pub struct StreamOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    /// 随请求下发的工具声明；为空时请求不带 tools 字段
    pub tools: Vec<ToolSpec>,
}

impl StreamOptions {
    /// 由角色采样参数与密钥模型组装请求参数
    pub fn for_agent(agent: &Agent, api_key: &ApiKey, tools: Vec<ToolSpec>) -> Self {
        Self {
            model: api_key.model.clone(),
            temperature: agent.temperature,
            top_p: agent.top_p,
            max_tokens: agent.max_tokens,
            presence_penalty: agent.presence_penalty,
            frequency_penalty: agent.frequency_penalty,
            tools,
        }
    }
}

/// 聊天服务：对完整消息历史发起一次流式补全
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn stream_chat(
        &self,
        api_key: &ApiKey,
        messages: &[Message],
        options: &StreamOptions,
    ) -> Result<ChunkStream, LlmError>;
}
