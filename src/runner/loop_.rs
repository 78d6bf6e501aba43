//! 任务主循环
//!
//! 交替执行者 / 负责人回合，解析负责人指令决定继续或终止，并强制
//! 轮次上限。生命周期：开始时置 Running 并建立两侧对话；task_done
//! 走总结回合后置 Completed；task_failed 置 Failed；轮次耗尽置
//! Failed 并报系统错误。任何错误向上返回前都会把任务置为 Failed
//! 并尽力写入存储，中断的运行不会把 Running 状态留在存储里。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::conversation::Role;
use crate::directive::{Directive, DirectiveKind};
use crate::error::TaskError;
use crate::llm::ChatService;
use crate::prompt;
use crate::runner::{RunObserver, RunOutcome, TaskRun, TurnExecutor};
use crate::store::{ConversationService, TaskStore};
use crate::task::TaskStatus;
use crate::tools::FunctionService;

/// 默认轮次上限
pub const DEFAULT_MAX_ROUNDS: usize = 50;

/// 任务运行器
pub struct TaskRunner {
    turns: TurnExecutor,
    conversations: Arc<dyn ConversationService>,
    store: Arc<dyn TaskStore>,
    max_rounds: usize,
}

impl TaskRunner {
    pub fn new(
        chat: Arc<dyn ChatService>,
        conversations: Arc<dyn ConversationService>,
        functions: Arc<dyn FunctionService>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            turns: TurnExecutor::new(chat, conversations.clone(), functions),
            conversations,
            store,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// 覆盖轮次上限
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// 运行任务直至完成、失败或超限
    pub async fn run(
        &self,
        run: &mut TaskRun,
        observer: &mut dyn RunObserver,
    ) -> Result<RunOutcome, TaskError> {
        match self.run_inner(run, observer).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                run.task.status = TaskStatus::Failed;
                if let Err(flush_err) = self.store.flush(&run.task).await {
                    warn!("失败状态写入存储未成功: {flush_err}");
                }
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        run: &mut TaskRun,
        observer: &mut dyn RunObserver,
    ) -> Result<RunOutcome, TaskError> {
        self.start_run(run, observer).await?;
        self.run_rounds(run, observer).await
    }

    /// 进入 Running 状态、打印参与方信息并建立两侧对话
    async fn start_run(
        &self,
        run: &mut TaskRun,
        observer: &mut dyn RunObserver,
    ) -> Result<(), TaskError> {
        run.task.status = TaskStatus::Running;
        run.task.result = None;
        self.store.flush(&run.task).await?;

        observer.info(&format!("任务名称：{}", run.task.name));
        observer.info(&format!("任务要求：{}", run.task.requirements));

        let executor_key = run
            .task
            .executor
            .preferred_api_key()
            .cloned()
            .ok_or_else(|| TaskError::ApiKeyNotConfigured("执行者".to_string()))?;
        observer.info(&format!("执行者：{}", run.task.executor.name));
        observer.info(&format!("使用密钥：{}", executor_key.title));
        observer.info(&format!("使用模型：{}", executor_key.model));

        let manager_key = run
            .task
            .manager
            .preferred_api_key()
            .cloned()
            .ok_or_else(|| TaskError::ApiKeyNotConfigured("负责人".to_string()))?;
        observer.info(&format!("负责人：{}", run.task.manager.name));
        observer.info(&format!("使用密钥：{}", manager_key.title));
        observer.info(&format!("使用模型：{}", manager_key.model));

        let mut executor_conversation = self
            .conversations
            .init_conversation(
                &run.task.executor,
                &executor_key,
                &prompt::executor_conversation_title(&run.task.name),
            )
            .await?;
        self.conversations
            .append_system_message(
                &mut executor_conversation,
                &executor_key,
                &prompt::executor_system_prompt(&run.task.requirements),
            )
            .await?;
        run.task.executor_conversation_id = Some(executor_conversation.id.clone());
        run.executor_conversation = Some(executor_conversation);

        let mut manager_conversation = self
            .conversations
            .init_conversation(
                &run.task.manager,
                &manager_key,
                &prompt::manager_conversation_title(&run.task.name),
            )
            .await?;
        self.conversations
            .append_system_message(
                &mut manager_conversation,
                &manager_key,
                &prompt::manager_system_prompt(&run.task.requirements),
            )
            .await?;
        run.task.manager_conversation_id = Some(manager_conversation.id.clone());
        run.manager_conversation = Some(manager_conversation);

        Ok(())
    }

    /// 回合循环：执行者发言、负责人评审、按指令分支
    async fn run_rounds(
        &self,
        run: &mut TaskRun,
        observer: &mut dyn RunObserver,
    ) -> Result<RunOutcome, TaskError> {
        if run.executor_conversation.is_none() {
            return Err(TaskError::ConversationNotInitialized("执行者".to_string()));
        }
        if run.manager_conversation.is_none() {
            return Err(TaskError::ConversationNotInitialized("负责人".to_string()));
        }

        let mut command = prompt::INITIAL_COMMAND.to_string();

        for round in 1..=self.max_rounds {
            observer.info(&format!("第 {round} 轮"));

            let executor_reply = self.executor_turn(run, &command, observer).await?;
            let manager_reply = self.manager_turn(run, &executor_reply, observer).await?;

            let directive = Directive::parse(&manager_reply);
            debug!("第 {round} 轮指令: {:?}", directive.kind);

            match directive.kind {
                DirectiveKind::Done => {
                    self.complete(run, observer).await?;
                    return Ok(RunOutcome::Completed);
                }
                DirectiveKind::Failed => {
                    self.fail(run, observer).await?;
                    return Ok(RunOutcome::Failed);
                }
                DirectiveKind::Continue | DirectiveKind::Unrecognized => {
                    command = directive.instruction;
                    self.store.flush(&run.task).await?;
                }
            }
        }

        self.exceed_limit(run).await
    }

    async fn executor_turn(
        &self,
        run: &mut TaskRun,
        command: &str,
        observer: &mut dyn RunObserver,
    ) -> Result<String, TaskError> {
        observer.info("执行者发言");

        let conversation = run
            .executor_conversation
            .as_mut()
            .ok_or_else(|| TaskError::ConversationNotInitialized("执行者".to_string()))?;
        let reply = self
            .turns
            .run_turn(conversation, &run.task.executor, "执行者", command, observer)
            .await?;

        let api_key = run
            .task
            .executor
            .preferred_api_key()
            .cloned()
            .ok_or_else(|| TaskError::ApiKeyNotConfigured("执行者".to_string()))?;
        self.conversations
            .append_message(conversation, &api_key, Role::Assistant, &reply)
            .await?;

        Ok(reply)
    }

    async fn manager_turn(
        &self,
        run: &mut TaskRun,
        executor_reply: &str,
        observer: &mut dyn RunObserver,
    ) -> Result<String, TaskError> {
        observer.info("负责人发言");

        let conversation = run
            .manager_conversation
            .as_mut()
            .ok_or_else(|| TaskError::ConversationNotInitialized("负责人".to_string()))?;
        let reply = self
            .turns
            .run_turn(
                conversation,
                &run.task.manager,
                "负责人",
                &prompt::review_prompt(executor_reply),
                observer,
            )
            .await?;

        let api_key = run
            .task
            .manager
            .preferred_api_key()
            .cloned()
            .ok_or_else(|| TaskError::ApiKeyNotConfigured("负责人".to_string()))?;
        self.conversations
            .append_message(conversation, &api_key, Role::Assistant, &reply)
            .await?;

        Ok(reply)
    }

    /// 完成流程：请负责人额外输出一轮总结，作为任务成果
    async fn complete(
        &self,
        run: &mut TaskRun,
        observer: &mut dyn RunObserver,
    ) -> Result<(), TaskError> {
        observer.info("请负责人总结任务结果");

        let conversation = run
            .manager_conversation
            .as_mut()
            .ok_or_else(|| TaskError::ConversationNotInitialized("负责人".to_string()))?;
        let summary = self
            .turns
            .run_turn(
                conversation,
                &run.task.manager,
                "负责人",
                prompt::SUMMARY_PROMPT,
                observer,
            )
            .await?;

        let api_key = run
            .task
            .manager
            .preferred_api_key()
            .cloned()
            .ok_or_else(|| TaskError::ApiKeyNotConfigured("负责人".to_string()))?;
        self.conversations
            .append_message(conversation, &api_key, Role::Assistant, &summary)
            .await?;

        run.task.status = TaskStatus::Completed;
        run.task.result = Some(summary);
        self.store.flush(&run.task).await?;
        observer.info("任务完成！");
        Ok(())
    }

    async fn fail(
        &self,
        run: &mut TaskRun,
        observer: &mut dyn RunObserver,
    ) -> Result<(), TaskError> {
        run.task.status = TaskStatus::Failed;
        self.store.flush(&run.task).await?;
        observer.info("任务失败！");
        Ok(())
    }

    /// 轮次耗尽：置失败并报系统错误，区别于负责人主动判失败
    async fn exceed_limit(&self, run: &mut TaskRun) -> Result<RunOutcome, TaskError> {
        run.task.status = TaskStatus::Failed;
        self.store.flush(&run.task).await?;
        Err(TaskError::RoundLimitExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, ApiKey};
    use crate::llm::MockChat;
    use crate::runner::RecordingObserver;
    use crate::store::MemoryStore;
    use crate::task::Task;
    use crate::tools::FunctionRegistry;

    fn test_runner(chat: Arc<MockChat>, store: Arc<MemoryStore>) -> TaskRunner {
        TaskRunner::new(
            chat,
            store.clone(),
            Arc::new(FunctionRegistry::new()),
            store,
        )
    }

    fn test_task() -> Task {
        let executor =
            Agent::new("AI助手").with_api_key(ApiKey::new("执行密钥", "mock-chat", "sk-a"));
        let manager =
            Agent::new("项目经理").with_api_key(ApiKey::new("管理密钥", "mock-chat", "sk-b"));
        Task::new("代码审查任务", "审查提交的代码", executor, manager)
    }

    #[tokio::test]
    async fn test_rounds_require_initialized_conversations() {
        let chat = Arc::new(MockChat::new());
        let store = Arc::new(MemoryStore::new());
        let runner = test_runner(chat, store);

        let mut run = TaskRun::new(test_task());
        let mut observer = RecordingObserver::new();

        let err = runner
            .run_rounds(&mut run, &mut observer)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::ConversationNotInitialized(_)));
    }

    #[tokio::test]
    async fn test_default_round_limit() {
        let chat = Arc::new(MockChat::new());
        let store = Arc::new(MemoryStore::new());
        let runner = test_runner(chat, store);
        assert_eq!(runner.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(DEFAULT_MAX_ROUNDS, 50);

        let runner = runner.with_max_rounds(3);
        assert_eq!(runner.max_rounds, 3);
    }
}
