//! 任务实体
//!
//! 任务由外部创建并持久化；运行期间只有任务运行器会修改状态、成果
//! 与两侧对话引用，其余字段保持只读。

use serde::{Deserialize, Serialize};

use crate::agent::Agent;

/// 任务状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待执行
    Pending,
    /// 正在执行
    Running,
    /// 已完成
    Completed,
    /// 执行失败
    Failed,
}

impl TaskStatus {
    /// 存储层使用的状态名
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// 从存储层状态名还原；未知值按 pending 处理
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        }
    }
}

/// AI 任务：一名执行者与一名负责人围绕任务要求协作
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// 任务名称
    pub name: String,
    /// 任务要求，会嵌入两侧的系统提示词
    pub requirements: String,
    /// 执行者
    pub executor: Agent,
    /// 负责人
    pub manager: Agent,
    pub status: TaskStatus,
    /// 任务成果；仅在任务完成时由总结回复写入
    pub result: Option<String>,
    /// 执行者侧对话 ID，运行开始时创建
    pub executor_conversation_id: Option<String>,
    /// 负责人侧对话 ID，运行开始时创建
    pub manager_conversation_id: Option<String>,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        requirements: impl Into<String>,
        executor: Agent,
        manager: Agent,
    ) -> Self {
        Self {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            requirements: requirements.into(),
            executor,
            manager,
            status: TaskStatus::Pending,
            result: None,
            executor_conversation_id: None,
            manager_conversation_id: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 是否已进入终止状态
    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}
