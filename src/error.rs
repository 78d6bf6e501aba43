//! 任务执行错误
//!
//! 所有错误都会终止当前运行；运行器在向上返回前会把任务置为失败
//! 并尽力写入存储。

use thiserror::Error;

use crate::llm::LlmError;
use crate::store::StoreError;

/// 任务运行过程中的错误
#[derive(Error, Debug)]
pub enum TaskError {
    /// 角色没有可用的模型凭证，{0} 是角色定位（执行者 / 负责人）
    #[error("{0}未配置 API 密钥")]
    ApiKeyNotConfigured(String),

    /// 进入回合循环时对话尚未建立，属于内部状态错误
    #[error("{0}对话未初始化")]
    ConversationNotInitialized(String),

    /// 轮次耗尽仍未得到终止指令
    #[error("任务超过最大轮次限制仍未完成")]
    RoundLimitExceeded,

    /// 模型调用失败（连接、鉴权或流中途断开）
    #[error("模型调用失败: {0}")]
    Llm(#[from] LlmError),

    /// 存储读写失败
    #[error("存储操作失败: {0}")]
    Store(#[from] StoreError),
}
