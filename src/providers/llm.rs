use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::Config;
use crate::error::OracleError;
use crate::types::Frame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

/// Plain text, or a list of text and image parts for vision models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// User turn carrying text followed by the frame as a data URL.
    pub fn user_with_image(text: impl Into<String>, frame: &Frame) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: frame.data_url(),
                    },
                },
            ]),
        }
    }

    /// All text in the message, parts joined by newlines.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(&self.content, MessageContent::Parts(parts)
            if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }
}

/// Which of the three decision tiers is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Planner,
    Supervisor,
    Executor,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Planner => "planner",
            Tier::Supervisor => "supervisor",
            Tier::Executor => "executor",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub tier: Tier,
    pub messages: Vec<Message>,
    /// Function definitions offered to the model; empty means none.
    pub tools: Vec<Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A structured call as returned by the model, arguments still raw JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: &Value) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.to_string(),
        }
    }

    pub fn parse_arguments(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn call(name: impl Into<String>, arguments: Value) -> Self {
        Self::default().and_call(name, arguments)
    }

    pub fn and_call(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.tool_calls.push(ToolCallRequest::new(name, &arguments));
        self
    }

    pub fn content_text(&self) -> &str {
        self.content.as_deref().unwrap_or("").trim()
    }
}

/// One chat-completion round trip to whatever decides the next move.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Reply, OracleError>;
}

/// Client for any server speaking the OpenAI chat-completions dialect
/// (LM Studio, llama.cpp, vLLM, hosted APIs).
#[derive(Debug, Clone)]
pub struct OpenAICompatibleOracle {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl OpenAICompatibleOracle {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

/// Decode a chat-completions response body into a `Reply`.
///
/// Some servers send `arguments` as an object rather than a JSON string;
/// both are accepted.
pub fn parse_reply(body: &str) -> Result<Reply, OracleError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| OracleError::Malformed(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(OracleError::Empty)?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCallRequest {
            name: tc.function.name,
            arguments: match tc.function.arguments {
                Value::String(s) => s,
                Value::Null => "{}".to_string(),
                other => other.to_string(),
            },
        })
        .collect();

    Ok(Reply {
        content: choice.message.content,
        tool_calls,
    })
}

#[async_trait]
impl Oracle for OpenAICompatibleOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<Reply, OracleError> {
        let tools = (!request.tools.is_empty()).then_some(request.tools.as_slice());
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            tools,
            tool_choice: tools.map(|_| "auto"),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_reply(&text)
    }
}

/// Test double answering each tier from its own queue. An exhausted queue
/// yields an empty reply (no text, no calls). Every request is recorded.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: Mutex<HashMap<Tier, VecDeque<Result<Reply, OracleError>>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tier: Tier, reply: Reply) -> &Self {
        self.enqueue(tier, Ok(reply))
    }

    pub fn push_error(&self, tier: Tier, error: OracleError) -> &Self {
        self.enqueue(tier, Err(error))
    }

    fn enqueue(&self, tier: Tier, item: Result<Reply, OracleError>) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(tier)
            .or_default()
            .push_back(item);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn requests_for(&self, tier: Tier) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.tier == tier)
            .collect()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<Reply, OracleError> {
        let tier = request.tier;
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&tier)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Reply::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_constructors() {
        let sys = Message::system("test");
        assert_eq!(sys.role, "system");
        assert_eq!(sys.text(), "test");

        let frame = Frame::new(1, 1, 1, vec![1, 2, 3]);
        let user = Message::user_with_image("look", &frame);
        assert_eq!(user.role, "user");
        assert_eq!(user.text(), "look");
        assert!(user.has_image());
    }

    #[test]
    fn test_image_message_wire_shape() {
        let frame = Frame::new(1, 1, 1, vec![0]);
        let wire = serde_json::to_value(Message::user_with_image("Mission: x", &frame)).unwrap();
        assert_eq!(wire["content"][0], json!({"type": "text", "text": "Mission: x"}));
        assert_eq!(wire["content"][1]["type"], "image_url");
        assert_eq!(
            wire["content"][1]["image_url"]["url"],
            "data:image/png;base64,AA=="
        );
    }

    #[test]
    fn test_request_omits_tools_when_none_offered() {
        let messages = vec![Message::user("hi")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            tools: None,
            tool_choice: None,
            temperature: 0.3,
            max_tokens: 10,
        };
        let wire = serde_json::to_value(&body).unwrap();
        assert!(wire.get("tools").is_none());
        assert!(wire.get("tool_choice").is_none());
        assert_eq!(wire["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_parse_reply_tool_calls() {
        let body = r#"{"choices":[{"message":{"content":null,"tool_calls":[
            {"id":"a","type":"function","function":{"name":"press_key","arguments":"{\"key\":\"enter\"}"}},
            {"id":"b","type":"function","function":{"name":"scroll_up","arguments":{"justification":"x"}}}
        ]}}]}"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.content, None);
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].name, "press_key");
        assert_eq!(
            reply.tool_calls[0].parse_arguments().unwrap(),
            json!({"key": "enter"})
        );
        assert_eq!(
            reply.tool_calls[1].parse_arguments().unwrap(),
            json!({"justification": "x"})
        );
    }

    #[test]
    fn test_parse_reply_errors() {
        assert!(matches!(parse_reply("{\"choices\":[]}"), Err(OracleError::Empty)));
        assert!(matches!(parse_reply("not json"), Err(OracleError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_scripted_oracle_queues_per_tier() {
        let oracle = ScriptedOracle::new();
        oracle
            .push(Tier::Planner, Reply::text("doctrine"))
            .push_error(Tier::Executor, OracleError::Timeout);

        let req = |tier| CompletionRequest {
            tier,
            messages: vec![Message::user("x")],
            tools: Vec::new(),
            temperature: 0.0,
            max_tokens: 1,
        };

        let planner = oracle.complete(req(Tier::Planner)).await.unwrap();
        assert_eq!(planner.content_text(), "doctrine");
        assert!(oracle.complete(req(Tier::Executor)).await.is_err());
        assert_eq!(
            oracle.complete(req(Tier::Executor)).await.unwrap(),
            Reply::default()
        );
        assert_eq!(oracle.requests_for(Tier::Executor).len(), 2);
    }
}
