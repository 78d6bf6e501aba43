//! 存储层：任务与对话的持久化契约及实现
//!
//! 核心通过两个窄契约访问存储：TaskStore 负责任务行的检查点写入，
//! ConversationService 负责对话创建与消息追加（追加即落库）。崩溃时
//! 消息至少一次、任务状态检查点至多一次，重放一次运行即可恢复。

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::agent::{Agent, ApiKey};
use crate::conversation::{Conversation, Role};
use crate::task::Task;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 记录不存在
    #[error("记录不存在: {0}")]
    NotFound(String),

    /// 底层数据库错误
    #[error("数据库错误: {0}")]
    Database(String),
}

/// 任务存储：查找与检查点写入
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 按 ID 查找任务
    async fn find(&self, id: &str) -> Result<Option<Task>, StoreError>;

    /// 把任务当前字段整体写入存储（幂等检查点）
    async fn flush(&self, task: &Task) -> Result<(), StoreError>;
}

/// 对话存储：创建对话与追加消息
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// 为角色创建一段空对话
    async fn init_conversation(
        &self,
        agent: &Agent,
        api_key: &ApiKey,
        title: &str,
    ) -> Result<Conversation, StoreError>;

    /// 追加一条消息，写入即生效
    async fn append_message(
        &self,
        conversation: &mut Conversation,
        api_key: &ApiKey,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    /// 追加系统消息（对话的第一条消息，非模型生成）
    async fn append_system_message(
        &self,
        conversation: &mut Conversation,
        api_key: &ApiKey,
        content: &str,
    ) -> Result<(), StoreError>;
}
