//! LLM adapter: one `invoke(messages) -> text` contract in front of the
//! dual OpenAI-chat-completions/Anthropic-messages backend, used by the
//! relevance filter (C10) and logical grouper (C11) for free-text/JSON
//! responses. Grounded on `vowstar-llm-git/src/api.rs`'s dual-mode request
//! building, retry-with-backoff loop, and response-text extraction; unlike
//! the teacher this adapter has no function-calling schema, since its two
//! callers parse plain JSON or prose out of the response body themselves.

use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
   System,
   User,
   Assistant,
}

#[derive(Debug, Clone)]
pub struct Message {
   pub role:    Role,
   pub content: String,
}

impl Message {
   pub fn system(content: impl Into<String>) -> Self {
      Self { role: Role::System, content: content.into() }
   }

   pub fn user(content: impl Into<String>) -> Self {
      Self { role: Role::User, content: content.into() }
   }

   pub fn assistant(content: impl Into<String>) -> Self {
      Self { role: Role::Assistant, content: content.into() }
   }
}

/// Everything an adapter needs to reach a provider; mirrors the teacher's
/// `CommitConfig` HTTP fields.
#[derive(Debug, Clone)]
pub struct LlmSettings {
   pub api_base_url:         String,
   pub api_key:              Option<String>,
   pub model:                String,
   pub request_timeout_secs: u64,
   pub connect_timeout_secs: u64,
   pub temperature:          f32,
   pub max_retries:          u32,
   pub initial_backoff_ms:   u64,
}

pub trait LlmAdapter: Send + Sync {
   fn invoke(&self, messages: &[Message]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiMode {
   ChatCompletions,
   AnthropicMessages,
}

/// Same heuristic the teacher's config resolves model names against: Claude
/// models speak the Anthropic Messages API, everything else is assumed
/// OpenAI-compatible chat completions.
fn resolve_mode(model: &str) -> ApiMode {
   if model.to_ascii_lowercase().contains("claude") {
      ApiMode::AnthropicMessages
   } else {
      ApiMode::ChatCompletions
   }
}

fn anthropic_messages_url(base_url: &str) -> String {
   let trimmed = base_url.trim_end_matches('/');
   if trimmed.ends_with("/v1") {
      format!("{trimmed}/messages")
   } else {
      format!("{trimmed}/v1/messages")
   }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
   role:    &'static str,
   content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
   model:       String,
   max_tokens:  u32,
   temperature: f32,
   messages:    Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
   message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
   #[serde(default)]
   content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
   #[serde(default)]
   choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
   role:    &'static str,
   content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
   model:       String,
   max_tokens:  u32,
   temperature: f32,
   #[serde(skip_serializing_if = "Option::is_none")]
   system:      Option<String>,
   messages:    Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
   #[serde(rename = "type")]
   content_type: String,
   #[serde(default)]
   text:         String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
   #[serde(default)]
   content: Vec<AnthropicContent>,
}

fn role_str(role: Role) -> &'static str {
   match role {
      Role::System => "system",
      Role::User => "user",
      Role::Assistant => "assistant",
   }
}

fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
   let mut system = None;
   let mut rest = Vec::with_capacity(messages.len());
   for m in messages {
      if m.role == Role::System && system.is_none() {
         system = Some(m.content.clone());
      } else {
         rest.push(m);
      }
   }
   (system, rest)
}

/// Blocking HTTP adapter talking either dialect, with retry-with-backoff
/// around transport and 5xx failures.
pub struct HttpLlmAdapter {
   settings: LlmSettings,
   client:   reqwest::blocking::Client,
}

impl HttpLlmAdapter {
   pub fn new(settings: LlmSettings) -> Self {
      let client = reqwest::blocking::Client::builder()
         .timeout(Duration::from_secs(settings.request_timeout_secs))
         .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
         .build()
         .expect("failed to build HTTP client");
      Self { settings, client }
   }

   fn try_invoke(&self, mode: ApiMode, messages: &[Message]) -> std::result::Result<String, AdapterError> {
      match mode {
         ApiMode::ChatCompletions => self.try_chat_completions(messages),
         ApiMode::AnthropicMessages => self.try_anthropic_messages(messages),
      }
   }

   fn try_chat_completions(&self, messages: &[Message]) -> std::result::Result<String, AdapterError> {
      let request = ChatRequest {
         model:       self.settings.model.clone(),
         max_tokens:  1024,
         temperature: self.settings.temperature,
         messages:    messages
            .iter()
            .map(|m| ChatMessage { role: role_str(m.role), content: m.content.clone() })
            .collect(),
      };

      let mut builder = self
         .client
         .post(format!("{}/chat/completions", self.settings.api_base_url))
         .header("content-type", "application/json");
      if let Some(key) = &self.settings.api_key {
         builder = builder.header("Authorization", format!("Bearer {key}"));
      }

      let response = builder
         .json(&request)
         .send()
         .map_err(|e| AdapterError::Transport(e.to_string()))?;
      let status = response.status();
      let body = response
         .text()
         .map_err(|e| AdapterError::Transport(e.to_string()))?;

      if !status.is_success() {
         return Err(AdapterError::Http { status: status.as_u16(), body });
      }

      let parsed: ChatResponse =
         serde_json::from_str(&body).map_err(|e| AdapterError::Unparseable(e.to_string()))?;
      parsed
         .choices
         .into_iter()
         .next()
         .and_then(|c| c.message.content)
         .filter(|s| !s.trim().is_empty())
         .ok_or_else(|| AdapterError::MissingField("choices[0].message.content".to_string()))
   }

   fn try_anthropic_messages(&self, messages: &[Message]) -> std::result::Result<String, AdapterError> {
      let (system, rest) = split_system(messages);
      let request = AnthropicRequest {
         model:       self.settings.model.clone(),
         max_tokens:  1024,
         temperature: self.settings.temperature,
         system,
         messages:    rest
            .into_iter()
            .map(|m| AnthropicMessage { role: role_str(m.role), content: m.content.clone() })
            .collect(),
      };

      let mut builder = self
         .client
         .post(anthropic_messages_url(&self.settings.api_base_url))
         .header("content-type", "application/json")
         .header("anthropic-version", "2023-06-01");
      if let Some(key) = &self.settings.api_key {
         builder = builder.header("x-api-key", key);
      }

      let response = builder
         .json(&request)
         .send()
         .map_err(|e| AdapterError::Transport(e.to_string()))?;
      let status = response.status();
      let body = response
         .text()
         .map_err(|e| AdapterError::Transport(e.to_string()))?;

      if !status.is_success() {
         return Err(AdapterError::Http { status: status.as_u16(), body });
      }

      let parsed: AnthropicResponse =
         serde_json::from_str(&body).map_err(|e| AdapterError::Unparseable(e.to_string()))?;
      let text: String = parsed
         .content
         .into_iter()
         .filter(|c| c.content_type == "text")
         .map(|c| c.text)
         .collect::<Vec<_>>()
         .join("\n");

      if text.trim().is_empty() {
         return Err(AdapterError::MissingField("content[].text".to_string()));
      }
      Ok(text)
   }
}

impl LlmAdapter for HttpLlmAdapter {
   fn invoke(&self, messages: &[Message]) -> Result<String> {
      let mode = resolve_mode(&self.settings.model);
      let mut attempt = 0u32;
      loop {
         attempt += 1;
         match self.try_invoke(mode, messages) {
            Ok(text) => return Ok(text),
            Err(err) => {
               let retryable = matches!(&err, AdapterError::Http { status, .. } if (500..600).contains(status))
                  || matches!(err, AdapterError::Transport(_));
               if retryable && attempt < self.settings.max_retries {
                  let backoff_ms = self.settings.initial_backoff_ms * (1 << (attempt - 1));
                  eprintln!(
                     "{}",
                     crate::style::warning(&format!(
                        "llm call failed ({err}), retry {attempt}/{} after {backoff_ms}ms",
                        self.settings.max_retries
                     ))
                  );
                  thread::sleep(Duration::from_millis(backoff_ms));
                  continue;
               }
               return Err(err.into());
            },
         }
      }
   }
}

#[cfg(test)]
pub(crate) struct StaticAdapter(pub String);

#[cfg(test)]
impl LlmAdapter for StaticAdapter {
   fn invoke(&self, _messages: &[Message]) -> Result<String> {
      Ok(self.0.clone())
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn resolve_mode_routes_claude_models_to_anthropic() {
      assert_eq!(resolve_mode("claude-sonnet-4.5"), ApiMode::AnthropicMessages);
      assert_eq!(resolve_mode("gpt-4o"), ApiMode::ChatCompletions);
   }

   #[test]
   fn anthropic_messages_url_appends_v1_when_missing() {
      assert_eq!(anthropic_messages_url("https://api.anthropic.com"), "https://api.anthropic.com/v1/messages");
      assert_eq!(anthropic_messages_url("https://api.anthropic.com/v1"), "https://api.anthropic.com/v1/messages");
   }

   #[test]
   fn split_system_extracts_only_first_system_message() {
      let messages = vec![Message::system("sys"), Message::user("hi")];
      let (system, rest) = split_system(&messages);
      assert_eq!(system.as_deref(), Some("sys"));
      assert_eq!(rest.len(), 1);
   }

   #[test]
   fn static_adapter_echoes_configured_text() {
      let adapter = StaticAdapter("hello".to_string());
      assert_eq!(adapter.invoke(&[Message::user("x")]).unwrap(), "hello");
   }
}
