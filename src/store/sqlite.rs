//! SQLite 存储
//!
//! 单文件数据库保存密钥、角色、任务、对话与消息。消息随追加立即写入，
//! 任务行在检查点整体更新；同一任务重复 flush 是幂等的。

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::agent::{Agent, ApiKey};
use crate::conversation::{Conversation, Message, Role};
use crate::store::{ConversationService, StoreError, TaskStore};
use crate::task::{Task, TaskStatus};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl SqliteStore {
    /// 打开（或创建）数据库并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    /// 内存数据库
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                model TEXT NOT NULL,
                base_url TEXT,
                secret TEXT NOT NULL,
                function_calling INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                api_key_id TEXT REFERENCES api_keys(id),
                temperature REAL,
                top_p REAL,
                max_tokens INTEGER,
                presence_penalty REAL,
                frequency_penalty REAL,
                functions TEXT NOT NULL DEFAULT '[]'
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                requirements TEXT NOT NULL,
                executor_id TEXT NOT NULL REFERENCES agents(id),
                manager_id TEXT NOT NULL REFERENCES agents(id),
                status TEXT NOT NULL,
                result TEXT,
                executor_conversation_id TEXT,
                manager_conversation_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                title TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                api_key_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id);",
        )
        .map_err(db_err)
    }

    /// 写入一把密钥（存在则覆盖）
    pub fn insert_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO api_keys
                (id, title, model, base_url, secret, function_calling)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key.id,
                key.title,
                key.model,
                key.base_url,
                key.secret,
                key.function_calling as i64,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// 写入一个角色及其首选密钥（存在则覆盖）
    pub fn insert_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        if let Some(key) = agent.preferred_api_key() {
            self.insert_api_key(key)?;
        }
        let functions = serde_json::to_string(&agent.functions)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO agents
                (id, name, api_key_id, temperature, top_p, max_tokens,
                 presence_penalty, frequency_penalty, functions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                agent.id,
                agent.name,
                agent.preferred_api_key().map(|k| k.id.clone()),
                agent.temperature,
                agent.top_p,
                agent.max_tokens,
                agent.presence_penalty,
                agent.frequency_penalty,
                functions,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// 写入一个任务，连同两个角色
    pub fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.insert_agent(&task.executor)?;
        self.insert_agent(&task.manager)?;
        self.write_task_row(task)
    }

    fn write_task_row(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO tasks
                (id, name, requirements, executor_id, manager_id, status, result,
                 executor_conversation_id, manager_conversation_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.id,
                task.name,
                task.requirements,
                task.executor.id,
                task.manager.id,
                task.status.as_str(),
                task.result,
                task.executor_conversation_id,
                task.manager_conversation_id,
                task.created_at,
                now_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn load_agent(conn: &Connection, id: &str) -> Result<Agent, StoreError> {
        let row = conn
            .query_row(
                "SELECT a.id, a.name, a.temperature, a.top_p, a.max_tokens,
                        a.presence_penalty, a.frequency_penalty, a.functions,
                        k.id, k.title, k.model, k.base_url, k.secret, k.function_calling
                 FROM agents a
                 LEFT JOIN api_keys k ON k.id = a.api_key_id
                 WHERE a.id = ?1",
                params![id],
                |row| {
                    let functions_json: String = row.get(7)?;
                    let key_id: Option<String> = row.get(8)?;
                    let api_key = key_id.map(|key_id| {
                        Ok::<ApiKey, rusqlite::Error>(ApiKey {
                            id: key_id,
                            title: row.get(9)?,
                            model: row.get(10)?,
                            base_url: row.get(11)?,
                            secret: row.get(12)?,
                            function_calling: row.get::<_, i64>(13)? != 0,
                        })
                    });
                    let api_key = match api_key {
                        Some(result) => Some(result?),
                        None => None,
                    };
                    Ok((
                        Agent {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            preferred_api_key: api_key,
                            temperature: row.get(2)?,
                            top_p: row.get(3)?,
                            max_tokens: row.get(4)?,
                            presence_penalty: row.get(5)?,
                            frequency_penalty: row.get(6)?,
                            functions: Vec::new(),
                        },
                        functions_json,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        let (mut agent, functions_json) =
            row.ok_or_else(|| StoreError::NotFound(format!("角色 {id}")))?;
        agent.functions = serde_json::from_str(&functions_json)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(agent)
    }

    /// 按追加顺序读出某段对话的消息
    pub fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT role, content FROM messages
                 WHERE conversation_id = ?1 ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![conversation_id], |row| {
                let role: String = row.get(0)?;
                Ok(Message {
                    role: Role::from_str_lossy(&role),
                    content: row.get(1)?,
                })
            })
            .map_err(db_err)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(db_err)?);
        }
        Ok(messages)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn find(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let row = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT id, name, requirements, executor_id, manager_id, status, result,
                        executor_conversation_id, manager_conversation_id, created_at
                 FROM tasks WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, i64>(9)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?
        };

        let Some((
            id,
            name,
            requirements,
            executor_id,
            manager_id,
            status,
            result,
            executor_conversation_id,
            manager_conversation_id,
            created_at,
        )) = row
        else {
            return Ok(None);
        };

        let (executor, manager) = {
            let conn = self.conn.lock().unwrap();
            (
                Self::load_agent(&conn, &executor_id)?,
                Self::load_agent(&conn, &manager_id)?,
            )
        };

        Ok(Some(Task {
            id,
            name,
            requirements,
            executor,
            manager,
            status: TaskStatus::from_str_lossy(&status),
            result,
            executor_conversation_id,
            manager_conversation_id,
            created_at,
        }))
    }

    async fn flush(&self, task: &Task) -> Result<(), StoreError> {
        self.write_task_row(task)
    }
}

#[async_trait]
impl ConversationService for SqliteStore {
    async fn init_conversation(
        &self,
        agent: &Agent,
        api_key: &ApiKey,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(&agent.id, title, &api_key.model);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO conversations (id, agent_id, title, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id,
                conversation.agent_id,
                conversation.title,
                conversation.model,
                now_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation: &mut Conversation,
        api_key: &ApiKey,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO messages (conversation_id, role, content, api_key_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conversation.id,
                    role.as_str(),
                    content,
                    api_key.id,
                    now_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        }
        conversation.push(Message {
            role,
            content: content.to_string(),
        });
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

    fn sample_task() -> Task {
        let executor = Agent::new("AI助手").with_api_key(
            ApiKey::new("执行密钥", "deepseek-chat", "sk-executor")
                .with_base_url("https://api.deepseek.com/v1"),
        );
        let manager = Agent::new("项目经理")
            .with_api_key(ApiKey::new("管理密钥", "deepseek-reasoner", "sk-manager"))
            .with_functions(vec!["web_search".to_string()]);
        Task::new("代码审查任务", "审查提交的代码", executor, manager)
    }

    #[tokio::test]
    async fn test_task_roundtrip_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("duet.db")).unwrap();

        let task = sample_task();
        store.insert_task(&task).unwrap();

        let loaded = store.find(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "代码审查任务");
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.executor.name, "AI助手");
        assert_eq!(
            loaded.executor.preferred_api_key().unwrap().model,
            "deepseek-chat"
        );
        assert_eq!(
            loaded
                .executor
                .preferred_api_key()
                .unwrap()
                .base_url
                .as_deref(),
            Some("https://api.deepseek.com/v1")
        );
        assert_eq!(loaded.manager.functions, vec!["web_search".to_string()]);
        assert!(loaded.result.is_none());
    }

    #[tokio::test]
    async fn test_find_missing_task_returns_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.find("task_不存在").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush_updates_status_and_result() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut task = sample_task();
        store.insert_task(&task).unwrap();

        task.status = TaskStatus::Completed;
        task.result = Some("最终成果".to_string());
        task.executor_conversation_id = Some("conv_a".to_string());
        store.flush(&task).await.unwrap();
        // 重复写同一检查点
        store.flush(&task).await.unwrap();

        let loaded = store.find(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.result.as_deref(), Some("最终成果"));
        assert_eq!(loaded.executor_conversation_id.as_deref(), Some("conv_a"));
    }

    #[tokio::test]
    async fn test_messages_append_in_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let agent = Agent::new("AI助手")
            .with_api_key(ApiKey::new("测试密钥", "mock-chat", "sk-test"));
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
            .append_message(&mut conversation, &key, Role::User, "开始执行任务")
            .await
            .unwrap();
        store
            .append_message(&mut conversation, &key, Role::Assistant, "已完成第一步")
            .await
            .unwrap();

        let messages = store.load_messages(&conversation.id).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "开始执行任务");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(conversation.len(), 3);
    }
}
