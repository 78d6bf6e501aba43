//! 固定提示词模板
//!
//! 两侧系统提示词、评审提示词与总结提示词集中在这里，运行器只做填充。

/// 回合循环的初始指令
pub const INITIAL_COMMAND: &str = "开始执行任务";

/// 负责人指令后没有补充说明时退回的固定指令
pub const FALLBACK_INSTRUCTION: &str = "继续执行任务";

/// 任务完成后请负责人输出最终成果的提示词
pub const SUMMARY_PROMPT: &str = "请根据对话内容，输出最终任务成果，不丢失细节，\
不需要任何解释。这个阶段不要出现任何task_done/task_failed/continue相关指令。";

/// 执行者侧系统提示词
pub fn executor_system_prompt(requirements: &str) -> String {
    format!(
        "这是一个任务执行过程。任务要求：{requirements}\n\n\
         你是执行者，需要按照要求完成任务。\n\
         每次我给你一个指令，你需要按照指令执行并输出结果。\n\
         初始指令是：{initial}",
        initial = INITIAL_COMMAND,
    )
}

/// 负责人侧系统提示词，声明指令语法
pub fn manager_system_prompt(requirements: &str) -> String {
    format!(
        "这是一个任务管理过程。任务要求：{requirements}\n\n\
         你是负责人，需要管理和评估执行者的工作。\n\
         每次我会把执行者的输出发给你，你需要评估并给出下一步指令。\n\
         你的输出必须以以下指令之一开头：\n\
         - continue: 继续执行任务\n\
         - task_done: 任务已完成\n\
         - task_failed: 任务失败\n\n\
         在指令后面，你可以补充具体的要求或建议。"
    )
}

/// 把执行者的输出转成发给负责人的评审请求
pub fn review_prompt(executor_reply: &str) -> String {
    format!("执行者的输出：\n{executor_reply}\n\n请评估并给出指令。")
}

/// 执行者侧对话标题
pub fn executor_conversation_title(task_name: &str) -> String {
    format!("任务执行：{task_name}")
}

/// 负责人侧对话标题
pub fn manager_conversation_title(task_name: &str) -> String {
    format!("任务管理：{task_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompts_embed_requirements() {
        let executor = executor_system_prompt("审查提交的代码");
        assert!(executor.contains("任务要求：审查提交的代码"));
        assert!(executor.contains(INITIAL_COMMAND));

        let manager = manager_system_prompt("审查提交的代码");
        assert!(manager.contains("任务要求：审查提交的代码"));
        assert!(manager.contains("task_done"));
        assert!(manager.contains("task_failed"));
    }

    #[test]
    fn test_review_prompt_quotes_reply() {
        let prompt = review_prompt("第一步已完成");
        assert!(prompt.starts_with("执行者的输出：\n第一步已完成"));
        assert!(prompt.ends_with("请评估并给出指令。"));
    }
}
