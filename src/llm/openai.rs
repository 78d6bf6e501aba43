//! OpenAI 兼容聊天服务
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（base_url 取自密钥配置）；
//! 支持 DeepSeek、OpenAI、自建代理等。连接配置按调用方传入的密钥构造，
//! 同一进程可以混用多把密钥。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionTools, CreateChatCompletionRequestArgs, FunctionObject,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::agent::ApiKey;
use crate::conversation::{Message, Role};
use crate::llm::{ChatChoice, ChatChunk, ChatService, ChunkStream, LlmError, StreamOptions};
use crate::tools::ToolSpec;

/// OpenAI 兼容聊天服务
#[derive(Debug, Default)]
pub struct OpenAiChat;

impl OpenAiChat {
    pub fn new() -> Self {
        Self
    }

    fn client_for(api_key: &ApiKey) -> Client<OpenAIConfig> {
        let mut config = OpenAIConfig::new().with_api_key(api_key.secret.clone());
        if let Some(url) = &api_key.base_url {
            config = config.with_api_base(url.clone());
        }
        Client::with_config(config)
    }
}

fn build_err(e: OpenAIError) -> LlmError {
    LlmError::InvalidRequest(e.to_string())
}

fn to_request_messages(
    messages: &[Message],
) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        let message = match m.role {
            Role::System => ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(build_err)?,
            ),
            Role::User => ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(build_err)?,
            ),
            Role::Assistant => ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(build_err)?,
            ),
        };
        out.push(message);
    }
    Ok(out)
}

fn to_request_tools(tools: &[ToolSpec]) -> Vec<ChatCompletionTool> {
    tools
        .iter()
        .map(|t| ChatCompletionTool {
            function: FunctionObject {
                name: t.name.clone(),
                description: Some(t.description.clone()),
                parameters: Some(t.parameters.clone()),
                strict: None,
            },
        })
        .collect()
}

#[async_trait]
impl ChatService for OpenAiChat {
    async fn stream_chat(
        &self,
        api_key: &ApiKey,
        messages: &[Message],
        options: &StreamOptions,
    ) -> Result<ChunkStream, LlmError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&options.model)
            .messages(to_request_messages(messages)?);
        if let Some(v) = options.temperature {
            builder.temperature(v);
        }
        if let Some(v) = options.top_p {
            builder.top_p(v);
        }
        if let Some(v) = options.max_tokens {
            builder.max_tokens(v);
        }
        if let Some(v) = options.presence_penalty {
            builder.presence_penalty(v);
        }
        if let Some(v) = options.frequency_penalty {
            builder.frequency_penalty(v);
        }
        if !options.tools.is_empty() {
            builder.tools(
                to_request_tools(&options.tools)
                    .into_iter()
                    .map(ChatCompletionTools::Function)
                    .collect::<Vec<_>>(),
            );
        }
        let mut request = builder.build().map_err(build_err)?;
        request.stream = Some(true);

        tracing::debug!("发起流式调用，模型 {}", options.model);

        let stream = Self::client_for(api_key)
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LlmError::Upstream(e.to_string()))?;

        Ok(Box::pin(stream.map(|item| {
            item.map(|response| ChatChunk {
                choices: response
                    .choices
                    .into_iter()
                    .map(|c| ChatChoice {
                        content: c.delta.content,
                    })
                    .collect(),
            })
            .map_err(|e| LlmError::Upstream(e.to_string()))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_messages_map_to_request_roles() {
        let messages = vec![
            Message::system("系统提示"),
            Message::user("指令"),
            Message::assistant("回复"),
        ];
        let mapped = to_request_messages(&messages).unwrap();
        assert_eq!(mapped.len(), 3);
        assert!(matches!(mapped[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(mapped[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(
            mapped[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
    }

    #[test]
    fn test_tool_specs_pass_through() {
        let specs = vec![ToolSpec::new(
            "web_search",
            "搜索互联网",
            json!({ "type": "object" }),
        )];
        let tools = to_request_tools(&specs);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "web_search");
        assert_eq!(tools[0].function.description.as_deref(), Some("搜索互联网"));
        assert_eq!(tools[0].function.parameters, Some(json!({ "type": "object" })));
    }
}
