//! 工具声明透传
//!
//! 核心不执行工具，只把角色允许的工具声明随请求下发给模型（前提是
//! 密钥支持函数调用）。声明的参数结构对核心不透明，原样进入请求。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::Agent;

/// 工具声明：名称、说明与参数 JSON Schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema，核心不解释其内容
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// 工具枚举服务：列出某个角色可随请求下发的工具声明
pub trait FunctionService: Send + Sync {
    fn tools_for(&self, agent: &Agent) -> Vec<ToolSpec>;
}

/// 注册表实现：按名注册声明，按角色的 functions 配置过滤
#[derive(Default)]
pub struct FunctionRegistry {
    specs: HashMap<String, ToolSpec>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    /// 已注册的工具名
    pub fn names(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }
}

impl FunctionService for FunctionRegistry {
    fn tools_for(&self, agent: &Agent) -> Vec<ToolSpec> {
        agent
            .functions
            .iter()
            .filter_map(|name| self.specs.get(name).cloned())
            .collect()
    }
}
