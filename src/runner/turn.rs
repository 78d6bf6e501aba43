//! 单轮执行
//!
//! 一轮发言 = 追加用户消息、流式调用模型、聚合全部文本增量并实时转发
//! 观察者。助手回复不在这里落库，由调用方决定何时写回对话。

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::debug;

use crate::agent::Agent;
use crate::conversation::{Conversation, Role};
use crate::error::TaskError;
use crate::llm::{ChatService, StreamOptions};
use crate::runner::RunObserver;
use crate::store::ConversationService;
use crate::tools::FunctionService;

/// 单轮执行器
pub struct TurnExecutor {
    chat: Arc<dyn ChatService>,
    conversations: Arc<dyn ConversationService>,
    functions: Arc<dyn FunctionService>,
}

impl TurnExecutor {
    pub fn new(
        chat: Arc<dyn ChatService>,
        conversations: Arc<dyn ConversationService>,
        functions: Arc<dyn FunctionService>,
    ) -> Self {
        Self {
            chat,
            conversations,
            functions,
        }
    }

    /// 执行一轮发言并返回完整回复文本
    ///
    /// role_label 用于错误定位（执行者 / 负责人）。没有文本增量的块
    /// 被跳过，回复可以为空字符串。
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        agent: &Agent,
        role_label: &str,
        prompt: &str,
        observer: &mut dyn RunObserver,
    ) -> Result<String, TaskError> {
        let api_key = agent
            .preferred_api_key()
            .ok_or_else(|| TaskError::ApiKeyNotConfigured(role_label.to_string()))?;

        self.conversations
            .append_message(conversation, api_key, Role::User, prompt)
            .await?;

        let tools = if api_key.function_calling {
            self.functions.tools_for(agent)
        } else {
            Vec::new()
        };
        let options = StreamOptions::for_agent(agent, api_key, tools);
        debug!("{} 发言，模型 {}", agent.name, options.model);

        let mut stream = self
            .chat
            .stream_chat(api_key, conversation.messages(), &options)
            .await?;

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for choice in chunk.choices {
                if let Some(content) = choice.content {
                    reply.push_str(&content);
                    observer.fragment(&content);
                }
            }
        }
        observer.stream_end();

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ApiKey;
    use crate::llm::MockChat;
    use crate::runner::{ObserverEvent, RecordingObserver};
    use crate::store::MemoryStore;
    use crate::tools::{FunctionRegistry, ToolSpec};
    use serde_json::json;

    fn executor_with(chat: Arc<MockChat>, registry: FunctionRegistry) -> (TurnExecutor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            TurnExecutor::new(chat, store.clone(), Arc::new(registry)),
            store,
        )
    }

    fn agent_with_key() -> Agent {
        Agent::new("AI助手").with_api_key(ApiKey::new("测试密钥", "mock-chat", "sk-test"))
    }

    #[tokio::test]
    async fn test_turn_appends_prompt_then_calls_model() {
        let chat = Arc::new(MockChat::new());
        chat.push_reply("第一步已完成");
        let (turns, _store) = executor_with(chat.clone(), FunctionRegistry::new());

        let agent = agent_with_key();
        let mut conversation = Conversation::new(&agent.id, "任务执行：测试", "mock-chat");
        let mut observer = RecordingObserver::new();

        let reply = turns
            .run_turn(&mut conversation, &agent, "执行者", "开始执行任务", &mut observer)
            .await
            .unwrap();

        assert_eq!(reply, "第一步已完成");
        // 调用时消息历史已包含本轮指令
        let calls = chat.calls();
        assert_eq!(calls.len(), 1);
        let last = calls[0].messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "开始执行任务");
        // 回复尚未写回对话
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_fragments_forwarded_in_order() {
        let chat = Arc::new(MockChat::new());
        chat.push_reply("一二三四五六七八九十");
        let (turns, _store) = executor_with(chat.clone(), FunctionRegistry::new());

        let agent = agent_with_key();
        let mut conversation = Conversation::new(&agent.id, "任务执行：测试", "mock-chat");
        let mut observer = RecordingObserver::new();

        turns
            .run_turn(&mut conversation, &agent, "执行者", "开始", &mut observer)
            .await
            .unwrap();

        let coalesced = observer.coalesced();
        assert_eq!(
            coalesced,
            vec![
                ObserverEvent::Fragment("一二三四五六七八九十".to_string()),
                ObserverEvent::StreamEnd,
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_key_aborts_before_any_write() {
        let chat = Arc::new(MockChat::new());
        let (turns, store) = executor_with(chat.clone(), FunctionRegistry::new());

        let agent = Agent::new("AI助手");
        let mut conversation = Conversation::new(&agent.id, "任务执行：测试", "mock-chat");
        let mut observer = RecordingObserver::new();

        let err = turns
            .run_turn(&mut conversation, &agent, "执行者", "开始", &mut observer)
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::ApiKeyNotConfigured(ref who) if who == "执行者"));
        assert!(chat.calls().is_empty());
        assert!(conversation.is_empty());
        assert_eq!(store.conversation_count(), 0);
    }

    #[tokio::test]
    async fn test_tools_sent_only_when_key_supports_function_calling() {
        let mut registry = FunctionRegistry::new();
        registry.register(ToolSpec::new("web_search", "搜索", json!({"type": "object"})));

        let chat = Arc::new(MockChat::new());
        chat.push_reply("好的");
        chat.push_reply("好的");
        let (turns, _store) = executor_with(chat.clone(), registry);

        // 密钥不支持函数调用：不带工具
        let plain = agent_with_key().with_functions(vec!["web_search".to_string()]);
        let mut conversation = Conversation::new(&plain.id, "任务执行：测试", "mock-chat");
        let mut observer = RecordingObserver::new();
        turns
            .run_turn(&mut conversation, &plain, "执行者", "开始", &mut observer)
            .await
            .unwrap();
        assert!(chat.calls()[0].tool_names.is_empty());

        // 密钥支持函数调用：带上角色允许的工具
        let enabled = Agent::new("AI助手")
            .with_api_key(
                ApiKey::new("测试密钥", "mock-chat", "sk-test").with_function_calling(true),
            )
            .with_functions(vec!["web_search".to_string()]);
        let mut conversation = Conversation::new(&enabled.id, "任务执行：测试", "mock-chat");
        turns
            .run_turn(&mut conversation, &enabled, "执行者", "开始", &mut observer)
            .await
            .unwrap();
        assert_eq!(chat.calls()[1].tool_names, vec!["web_search".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let chat = Arc::new(MockChat::new());
        chat.push_failure("连接中断");
        let (turns, _store) = executor_with(chat.clone(), FunctionRegistry::new());

        let agent = agent_with_key();
        let mut conversation = Conversation::new(&agent.id, "任务执行：测试", "mock-chat");
        let mut observer = RecordingObserver::new();

        let err = turns
            .run_turn(&mut conversation, &agent, "执行者", "开始", &mut observer)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Llm(_)));
    }
}
