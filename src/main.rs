//! duet - 双智能体任务执行器
//!
//! 用法：
//!   duet new <task.toml>        从 TOML 描述创建任务并打印任务 ID
//!   duet run <task-id> [-d]     执行任务（-d / --debug 输出调试日志）
//!
//! 环境变量：
//!   RUST_LOG    覆盖日志级别
//!   DUET__*     覆盖配置（如 DUET__STORE__DB_PATH=/tmp/duet.db）

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Deserialize;

use duet::config::{load_config, AppConfig};
use duet::llm::OpenAiChat;
use duet::runner::{ConsoleObserver, TaskRun, TaskRunner};
use duet::store::{SqliteStore, TaskStore};
use duet::tools::FunctionRegistry;
use duet::{Agent, ApiKey, Task};

/// 任务描述文件（duet new 的输入）
#[derive(Debug, Deserialize)]
struct TaskFile {
    name: String,
    requirements: String,
    executor: AgentSection,
    manager: AgentSection,
}

/// 任务描述文件中的角色段
#[derive(Debug, Deserialize)]
struct AgentSection {
    name: String,
    model: String,
    /// 密钥本体；缺省时从 api_key_env 指定的环境变量读取
    api_key: Option<String>,
    api_key_env: Option<String>,
    key_title: Option<String>,
    base_url: Option<String>,
    #[serde(default)]
    function_calling: bool,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    presence_penalty: Option<f32>,
    frequency_penalty: Option<f32>,
    #[serde(default)]
    functions: Vec<String>,
}

impl AgentSection {
    fn into_agent(self) -> anyhow::Result<Agent> {
        let secret = match (self.api_key, &self.api_key_env) {
            (Some(key), _) => key,
            (None, Some(var)) => {
                std::env::var(var).with_context(|| format!("环境变量 {var} 未设置"))?
            }
            (None, None) => bail!("角色 {} 缺少 api_key 或 api_key_env", self.name),
        };

        let mut api_key = ApiKey::new(
            self.key_title.unwrap_or_else(|| self.model.clone()),
            self.model,
            secret,
        )
        .with_function_calling(self.function_calling);
        if let Some(url) = self.base_url {
            api_key = api_key.with_base_url(url);
        }

        let mut agent = Agent::new(self.name)
            .with_api_key(api_key)
            .with_functions(self.functions);
        agent.temperature = self.temperature;
        agent.top_p = self.top_p;
        agent.max_tokens = self.max_tokens;
        agent.presence_penalty = self.presence_penalty;
        agent.frequency_penalty = self.frequency_penalty;
        Ok(agent)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|a| a == "-d" || a == "--debug");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();

    duet::observability::init(debug);

    let cfg = load_config(None).unwrap_or_else(|_| AppConfig::default());
    let store = Arc::new(
        SqliteStore::open(&cfg.store.db_path)
            .with_context(|| format!("打开数据库失败: {}", cfg.store.db_path.display()))?,
    );

    match positional.as_slice() {
        [cmd, path] if cmd.as_str() == "new" => cmd_new(&store, PathBuf::from(path)),
        [cmd, task_id] if cmd.as_str() == "run" => cmd_run(&cfg, store, task_id).await,
        _ => {
            eprintln!("用法:");
            eprintln!("  duet new <task.toml>     创建任务");
            eprintln!("  duet run <task-id> [-d]  执行任务");
            std::process::exit(2);
        }
    }
}

fn cmd_new(store: &SqliteStore, path: PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("读取任务描述失败: {}", path.display()))?;
    let file: TaskFile = toml::from_str(&text).context("任务描述格式不正确")?;

    let task = Task::new(
        file.name,
        file.requirements,
        file.executor.into_agent()?,
        file.manager.into_agent()?,
    );
    store.insert_task(&task)?;
    println!("{}", task.id);
    Ok(())
}

async fn cmd_run(cfg: &AppConfig, store: Arc<SqliteStore>, task_id: &str) -> anyhow::Result<()> {
    let task = store
        .find(task_id)
        .await?
        .with_context(|| format!("任务不存在: {task_id}"))?;

    let runner = TaskRunner::new(
        Arc::new(OpenAiChat::new()),
        store.clone(),
        Arc::new(FunctionRegistry::new()),
        store,
    )
    .with_max_rounds(cfg.task.max_rounds);

    let mut run = TaskRun::new(task);
    let mut observer = ConsoleObserver;
    // 任务被负责人判为失败属于正常结束；只有运行错误返回非零退出码
    runner.run(&mut run, &mut observer).await?;
    Ok(())
}
