//! 内存存储（测试与嵌入场景）
//!
//! 行为与 SQLite 实现一致：消息追加即记录，flush 写任务快照。额外
//! 记录 flush 时的状态序列，并支持注入持久化故障，便于测试检查点
//! 时机与失败路径。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::{Agent, ApiKey};
use crate::conversation::{Conversation, Message, Role};
use crate::store::{ConversationService, StoreError, TaskStore};
use crate::task::{Task, TaskStatus};

#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<HashMap<String, Task>>,
    /// 对话 ID -> 已落库消息
    messages: Mutex<HashMap<String, Vec<Message>>>,
    /// flush 时的 (任务 ID, 状态) 序列
    flushes: Mutex<Vec<(String, TaskStatus)>>,
    /// Some(n) 表示第 n 次之后的 flush 全部失败
    flush_failures_after: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个任务，模拟外部创建
    pub fn insert_task(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id.clone(), task);
    }

    /// 最近一次 flush 后的任务快照
    pub fn flushed_task(&self, id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    /// flush 时的状态序列
    pub fn flush_statuses(&self) -> Vec<TaskStatus> {
        self.flushes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, status)| *status)
            .collect()
    }

    /// 某对话已落库的消息
    pub fn recorded_messages(&self, conversation_id: &str) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 已创建的对话数
    pub fn conversation_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// n 次成功 flush 之后开始注入持久化故障
    pub fn fail_flush_after(&self, n: usize) {
        *self.flush_failures_after.lock().unwrap() = Some(n);
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn flush(&self, task: &Task) -> Result<(), StoreError> {
        if let Some(limit) = *self.flush_failures_after.lock().unwrap() {
            if self.flushes.lock().unwrap().len() >= limit {
                return Err(StoreError::Database("注入的写入故障".to_string()));
            }
        }
        self.tasks
            .lock()
            .unwrap()
            .insert(task.id.clone(), task.clone());
        self.flushes
            .lock()
            .unwrap()
            .push((task.id.clone(), task.status));
        Ok(())
    }
}

#[async_trait]
impl ConversationService for MemoryStore {
    async fn init_conversation(
        &self,
        agent: &Agent,
        api_key: &ApiKey,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(&agent.id, title, &api_key.model);
        self.messages
            .lock()
            .unwrap()
            .insert(conversation.id.clone(), Vec::new());
        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation: &mut Conversation,
        _api_key: &ApiKey,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let message = Message {
            role,
            content: content.to_string(),
        };
        conversation.push(message.clone());
        self.messages
            .lock()
            .unwrap()
            .entry(conversation.id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn append_system_message(
        &self,
        conversation: &mut Conversation,
        api_key: &ApiKey,
        content: &str,
    ) -> Result<(), StoreError> {
        self.append_message(conversation, api_key, Role::System, content)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_agent() -> Agent {
        Agent::new("AI助手").with_api_key(ApiKey::new("测试密钥", "mock-chat", "sk-test"))
    }

    #[tokio::test]
    async fn test_flush_records_status_sequence() {
        let store = MemoryStore::new();
        let mut task = Task::new("测试任务", "要求", sample_agent(), sample_agent());
        store.insert_task(task.clone());

        task.status = TaskStatus::Running;
        store.flush(&task).await.unwrap();
        task.status = TaskStatus::Completed;
        task.result = Some("成果".to_string());
        store.flush(&task).await.unwrap();

        assert_eq!(
            store.flush_statuses(),
            vec![TaskStatus::Running, TaskStatus::Completed]
        );
        let snapshot = store.flushed_task(&task.id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.result.as_deref(), Some("成果"));
    }

    #[tokio::test]
    async fn test_messages_persist_on_append() {
        let store = MemoryStore::new();
        let agent = sample_agent();
        let key = agent.preferred_api_key().unwrap().clone();

        let mut conversation = store
            .init_conversation(&agent, &key, "任务执行：测试")
            .await
            .unwrap();
        store
            .append_system_message(&mut conversation, &key, "系统提示")
            .await
            .unwrap();
        store
            .append_message(&mut conversation, &key, Role::User, "开始")
            .await
            .unwrap();

        let recorded = store.recorded_messages(&conversation.id);
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].role, Role::System);
        assert_eq!(recorded[1].content, "开始");
        assert_eq!(conversation.len(), 2);
        assert_eq!(store.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_flush_failure() {
        let store = MemoryStore::new();
        let task = Task::new("测试任务", "要求", sample_agent(), sample_agent());
        store.fail_flush_after(1);

        store.flush(&task).await.unwrap();
        assert!(store.flush(&task).await.is_err());
    }
}
