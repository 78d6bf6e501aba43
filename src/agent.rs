//! 角色与模型凭证
//!
//! 执行者与负责人是同一类型，差别只在任务里被引用的位置。角色绑定一个
//! 首选密钥与采样参数，任务运行期间这些配置只读。

use serde::{Deserialize, Serialize};

/// 模型凭证：密钥、目标模型与能力标志
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    /// 展示用名称（进度输出与日志）
    pub title: String,
    /// 模型标识，如 deepseek-chat
    pub model: String,
    /// OpenAI 兼容端点；None 时用官方默认地址
    pub base_url: Option<String>,
    pub secret: String,
    /// 是否支持函数调用，决定请求是否附带工具声明
    pub function_calling: bool,
}

impl ApiKey {
    pub fn new(
        title: impl Into<String>,
        model: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("key_{}", uuid::Uuid::new_v4()),
            title: title.into(),
            model: model.into(),
            base_url: None,
            secret: secret.into(),
            function_calling: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_function_calling(mut self, enabled: bool) -> Self {
        self.function_calling = enabled;
        self
    }
}

/// 参与任务的角色
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// 首选密钥；缺失时任务无法开始
    pub preferred_api_key: Option<ApiKey>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    /// 允许随请求下发的工具名
    pub functions: Vec<String>,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: format!("agent_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            preferred_api_key: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
            functions: Vec::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.preferred_api_key = Some(api_key);
        self
    }

    pub fn with_functions(mut self, functions: Vec<String>) -> Self {
        self.functions = functions;
        self
    }

    pub fn preferred_api_key(&self) -> Option<&ApiKey> {
        self.preferred_api_key.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_defaults() {
        let agent = Agent::new("AI助手");
        assert_eq!(agent.name, "AI助手");
        assert!(agent.preferred_api_key().is_none());
        assert!(agent.functions.is_empty());
        assert!(agent.temperature.is_none());
    }

    #[test]
    fn test_api_key_builder() {
        let key = ApiKey::new("测试密钥", "deepseek-chat", "sk-test")
            .with_base_url("https://api.deepseek.com/v1")
            .with_function_calling(true);
        assert_eq!(key.model, "deepseek-chat");
        assert_eq!(key.base_url.as_deref(), Some("https://api.deepseek.com/v1"));
        assert!(key.function_calling);

        let agent = Agent::new("项目经理").with_api_key(key);
        assert_eq!(agent.preferred_api_key().unwrap().title, "测试密钥");
    }
}
