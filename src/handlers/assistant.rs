use crate::config::AiConfig;
use crate::editor::ScopeSnapshot;
use crate::error::AiError;
use crate::handlers::fence::extract_code_block;
use flume::Sender;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

const EXPLAIN_INSTRUCTION: &str = "You are a senior software engineer helping a developer \
understand a piece of code. Explain what the code does in plain language. Structure the \
answer as: a one-sentence summary, then a short list of the key steps, then any bugs or \
risks you notice. Do not rewrite the code.";

const REFACTOR_INSTRUCTION: &str = "You are a senior software engineer. Refactor the given \
code to fix bugs and improve readability without changing its behavior. Reply with a short \
explanation of your changes followed by the complete corrected code inside exactly one \
fenced code block (```language ... ```). Do not include any other code blocks. If the code \
is a fragment, return a fragment that can replace it verbatim.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiMode {
    Explain,
    Refactor,
}

impl AiMode {
    pub fn system_instruction(self) -> &'static str {
        match self {
            AiMode::Explain => EXPLAIN_INSTRUCTION,
            AiMode::Refactor => REFACTOR_INSTRUCTION,
        }
    }
}

impl fmt::Display for AiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiMode::Explain => write!(f, "explain"),
            AiMode::Refactor => write!(f, "refactor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Builds the provider request for one AI action over a captured scope.
pub fn build_request(
    mode: AiMode,
    scope: &ScopeSnapshot,
    language: &str,
    config: &AiConfig,
) -> ChatRequest {
    let user_content = format!(
        "Task: {}\nScope: {}\nLanguage: {}\n\n```{}\n{}\n```",
        mode,
        scope.label(),
        language,
        language,
        scope.text
    );

    ChatRequest {
        model: config.model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: mode.system_instruction().to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user_content,
            },
        ],
        temperature: config.temperature,
    }
}

/// Usable part of a provider reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiReply {
    pub text: String,
    /// Present only for refactor replies that contained a fenced block.
    pub extracted_code: Option<String>,
}

/// Pulls the first textual choice out of a chat completion payload.
pub fn parse_response(payload: &Value, mode: AiMode) -> Result<AiReply, AiError> {
    let choices = payload
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| AiError::MalformedResponse("response has no choices".to_string()))?;

    let text = choices
        .iter()
        .find_map(|choice| choice.get("message")?.get("content")?.as_str())
        .ok_or_else(|| AiError::MalformedResponse("no choice carries text content".to_string()))?
        .to_string();

    let extracted_code = match mode {
        AiMode::Refactor => extract_code_block(&text),
        AiMode::Explain => None,
    };

    Ok(AiReply {
        text,
        extracted_code,
    })
}

/// Pulls `error.message` out of an error body, falling back to the raw body.
fn upstream_message(body: &str, status: reqwest::StatusCode) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error.message;
    }

    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

/// OpenAI-compatible chat completions client
#[derive(Debug, Clone)]
pub struct AssistantClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AssistantClient {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Posts the request and returns the raw JSON payload.
    pub async fn send(&self, request: &ChatRequest) -> Result<Value, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(%url, model = %request.model, "sending chat completion request");

        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::Network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = upstream_message(&body, status);
            tracing::warn!(status = status.as_u16(), %message, "provider returned an error");
            return Err(AiError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| AiError::MalformedResponse(format!("response is not JSON: {}", e)))
    }

    /// Send and parse in one step.
    pub async fn complete(&self, request: &ChatRequest, mode: AiMode) -> Result<AiReply, AiError> {
        let payload = self.send(request).await?;
        parse_response(&payload, mode)
    }
}

/// A request ready to leave the session, tagged with its exchange id
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub id: Uuid,
    pub mode: AiMode,
    pub request: ChatRequest,
}

/// Result of a dispatched request, delivered back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiMessage {
    Reply { id: Uuid, reply: AiReply },
    Failed { id: Uuid, error: AiError },
}

impl AiMessage {
    pub fn id(&self) -> Uuid {
        match self {
            AiMessage::Reply { id, .. } | AiMessage::Failed { id, .. } => *id,
        }
    }
}

/// Runs the request on a worker thread with its own runtime so the caller
/// never blocks; the outcome arrives on `sender`.
pub fn dispatch(
    client: AssistantClient,
    outbound: OutboundRequest,
    sender: Sender<AiMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let id = outbound.id;
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = sender.send(AiMessage::Failed {
                    id,
                    error: AiError::Network(format!("Runtime error: {}", e)),
                });
                return;
            }
        };

        let result = rt.block_on(client.complete(&outbound.request, outbound.mode));

        let message = match result {
            Ok(reply) => AiMessage::Reply { id, reply },
            Err(error) => AiMessage::Failed { id, error },
        };

        if sender.send(message).is_err() {
            tracing::debug!(%id, "session gone before AI reply arrived");
        }
    })
}
