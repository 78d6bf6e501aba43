//! 任务运行上下文

use crate::conversation::Conversation;
use crate::task::Task;

/// 一次任务运行：独占持有任务与两侧对话
#[derive(Debug)]
pub struct TaskRun {
    pub task: Task,
    /// 执行者侧对话，运行开始时创建
    pub executor_conversation: Option<Conversation>,
    /// 负责人侧对话，运行开始时创建
    pub manager_conversation: Option<Conversation>,
}

impl TaskRun {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            executor_conversation: None,
            manager_conversation: None,
        }
    }
}

/// 一次运行的正常结局；超轮次与运行错误走错误通道
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// 负责人给出 task_done，任务完成并产出总结
    Completed,
    /// 负责人给出 task_failed
    Failed,
}
