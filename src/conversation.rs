//! 对话与消息
//!
//! 一段对话归属一个角色，与一次任务运行绑定；按时间顺序保存
//! system / user / assistant 消息。核心只向对话追加消息，不删除。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// 存储层使用的角色名
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// 从存储层角色名还原；未知值按 system 处理
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::System,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 一段对话：消息列表只增不减，追加入口是 crate 内部的 push，外部只能读取
#[derive(Clone, Debug)]
pub struct Conversation {
    pub id: String,
    /// 归属角色 ID
    pub agent_id: String,
    pub title: String,
    /// 创建对话时所用密钥的模型名
    pub model: String,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(
        agent_id: impl Into<String>,
        title: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("conv_{}", uuid::Uuid::new_v4()),
            agent_id: agent_id.into(),
            title: title.into(),
            model: model.into(),
            messages: Vec::new(),
        }
    }

    /// 按时间顺序返回全部消息（最旧在前）
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
