//! HTTP adapter for the Converse-style LLM wire contract (SPEC_FULL.md §6):
//! messages with `{user, assistant}` roles and `{text | tool_use |
//! tool_result}` content blocks, a response `stop_reason`, and optional
//! token usage.

use std::time::Duration;

use sa_domain::config::ModelConfig;
use sa_domain::conversation::{ContentBlock, Message, Role, ToolResultStatus};
use sa_domain::error::{Error, Result};
use sa_domain::task::Usage;
use sa_domain::tool::ToolDefinition;
use serde::{Deserialize, Serialize};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider, StopReason};
use crate::util::{from_reqwest, resolve_api_key};

pub struct ConverseProvider {
    model_id: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ConverseProvider {
    pub fn from_config(cfg: &ModelConfig, timeout_ms: u64) -> Result<Self> {
        let api_key = match resolve_api_key(&cfg.auth) {
            Ok(key) => Some(key),
            Err(_) if cfg.auth.env.is_none() => None,
            Err(e) => return Err(e),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            model_id: cfg.model_id.clone(),
            base_url: cfg.base_url.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for ConverseProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let wire_req = WireRequest {
            model_id: req.model_id.clone(),
            messages: req.messages.iter().map(WireMessage::from_domain).collect(),
            system_prompt: req.system_prompt,
            tool_spec: req.tools.iter().map(WireToolDefinition::from_domain).collect(),
            inference_config: WireInferenceConfig {
                temperature: req.temperature,
                max_tokens: req.max_tokens,
            },
        };

        let mut builder = self.client.post(&self.base_url).json(&wire_req);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(from_reqwest)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(Error::Throttled { model_id: self.model_id.clone() });
            }
            return Err(Error::Provider {
                provider: self.model_id.clone(),
                message: format!("HTTP {status}: {body}"),
            });
        }

        let wire_resp: WireResponse = resp.json().await.map_err(from_reqwest)?;
        wire_resp.into_domain()
    }

    fn provider_id(&self) -> &str {
        &self.model_id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire format
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
struct WireRequest {
    model_id: String,
    messages: Vec<WireMessage>,
    system_prompt: String,
    tool_spec: Vec<WireToolDefinition>,
    inference_config: WireInferenceConfig,
}

#[derive(Serialize)]
struct WireInferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireToolDefinition {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

impl WireToolDefinition {
    fn from_domain(t: &ToolDefinition) -> Self {
        Self {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.input_schema.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: Vec<WireContentBlock>,
}

impl WireMessage {
    fn from_domain(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
            },
            content: m.content.iter().map(WireContentBlock::from_domain).collect(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum WireContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        id: String,
        content: Vec<WireContentBlock>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
}

impl WireContentBlock {
    fn from_domain(b: &ContentBlock) -> Self {
        match b {
            ContentBlock::Text { text } => WireContentBlock::Text { text: text.clone() },
            ContentBlock::ToolUse { id, name, input } => WireContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
            ContentBlock::ToolResult { id, content, status } => WireContentBlock::ToolResult {
                id: id.clone(),
                content: content.iter().map(WireContentBlock::from_domain).collect(),
                status: status.map(|s| match s {
                    ToolResultStatus::Success => "success".into(),
                    ToolResultStatus::Error => "error".into(),
                }),
            },
        }
    }

    fn into_domain(self) -> ContentBlock {
        match self {
            WireContentBlock::Text { text } => ContentBlock::Text { text },
            WireContentBlock::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
            WireContentBlock::ToolResult { id, content, status } => ContentBlock::ToolResult {
                id,
                content: content.into_iter().map(WireContentBlock::into_domain).collect(),
                status: status.map(|s| match s.as_str() {
                    "error" => ToolResultStatus::Error,
                    _ => ToolResultStatus::Success,
                }),
            },
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
    stop_reason: String,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(rename = "inputTokens")]
    input_tokens: u64,
    #[serde(rename = "outputTokens")]
    output_tokens: u64,
    #[serde(rename = "totalTokens")]
    total_tokens: u64,
}

impl WireResponse {
    fn into_domain(self) -> Result<ChatResponse> {
        let stop_reason = match self.stop_reason.as_str() {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => {
                return Err(Error::Provider {
                    provider: "converse".into(),
                    message: format!("unrecognized stop_reason: {other}"),
                })
            }
        };
        Ok(ChatResponse {
            content: self.content.into_iter().map(WireContentBlock::into_domain).collect(),
            stop_reason,
            usage: self.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_message_roundtrips_tool_use_and_result() {
        let msg = Message::assistant(vec![ContentBlock::tool_use(
            "u1",
            "clock",
            serde_json::json!({}),
        )]);
        let wire = WireMessage::from_domain(&msg);
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains("\"tool_use\""));
        assert!(json.contains("\"u1\""));
    }

    #[test]
    fn wire_response_maps_stop_reasons() {
        for (wire, expected) in [
            ("end_turn", StopReason::EndTurn),
            ("tool_use", StopReason::ToolUse),
            ("max_tokens", StopReason::MaxTokens),
            ("stop_sequence", StopReason::StopSequence),
        ] {
            let resp = WireResponse {
                content: vec![],
                stop_reason: wire.into(),
                usage: None,
            };
            assert_eq!(resp.into_domain().unwrap().stop_reason, expected);
        }
    }

    #[test]
    fn wire_response_rejects_unknown_stop_reason() {
        let resp = WireResponse {
            content: vec![],
            stop_reason: "bogus".into(),
            usage: None,
        };
        assert!(resp.into_domain().is_err());
    }

    #[test]
    fn wire_usage_maps_camel_case_fields() {
        let json = r#"{"content":[],"stop_reason":"end_turn","usage":{"inputTokens":10,"outputTokens":5,"totalTokens":15}}"#;
        let resp: WireResponse = serde_json::from_str(json).unwrap();
        let domain = resp.into_domain().unwrap();
        let usage = domain.usage.unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }
}
