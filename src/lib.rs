//! Duet - 双智能体任务编排
//!
//! 一名执行者与一名负责人围绕任务要求回合制协作：执行者按指令产出，
//! 负责人评审并给出 continue / task_done / task_failed 指令，循环受
//! 轮次上限约束，任务状态与两侧对话全程落库。
//!
//! 模块划分：
//! - **agent**: 角色与模型凭证
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **conversation**: 对话与消息
//! - **directive**: 负责人指令解析
//! - **error**: 任务执行错误
//! - **llm**: 聊天服务抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化
//! - **prompt**: 固定提示词模板
//! - **runner**: 单轮执行、回合循环与任务生命周期
//! - **store**: 任务与对话持久化（SQLite / 内存）
//! - **task**: 任务实体与状态
//! - **tools**: 工具声明透传

pub mod agent;
pub mod config;
pub mod conversation;
pub mod directive;
pub mod error;
pub mod llm;
pub mod observability;
pub mod prompt;
pub mod runner;
pub mod store;
pub mod task;
pub mod tools;

pub use agent::{Agent, ApiKey};
pub use conversation::{Conversation, Message, Role};
pub use directive::{Directive, DirectiveKind};
pub use error::TaskError;
pub use runner::{RunObserver, RunOutcome, TaskRun, TaskRunner};
pub use task::{Task, TaskStatus};
