use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("language model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("language model returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("language model reply is empty")]
    EmptyReply,
    #[error("language model reply contains no JSON object")]
    NoJsonObject,
    #[error("failed to parse language model JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("language model reply is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("language model reply is unusable: {0}")]
    Unusable(&'static str),
}

/// The text-generation collaborator. One prompt in, one free-text reply
/// out; everything else (JSON extraction, shape validation) happens on our
/// side of the boundary.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, AiError>;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiChat {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(api_key: &str, base_url: Option<String>, model: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    content: String,
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, AiError> {
        let body = ChatRequest {
            model: self.model.clone(),
            max_tokens,
            temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::Status(response.status()));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(AiError::EmptyReply);
        }

        Ok(content)
    }
}

/// Pulls the first JSON object out of a reply that may wrap it in prose or
/// markdown fences.
pub fn extract_json_object(reply: &str) -> Result<Value, AiError> {
    lazy_static! {
        static ref JSON_OBJECT: Regex =
            Regex::new(r"(?s)\{.*\}").expect("hardcoded regex should compile");
    }

    let matched = JSON_OBJECT.find(reply).ok_or(AiError::NoJsonObject)?;
    Ok(serde_json::from_str(matched.as_str())?)
}

/// Rejects replies that dropped a required top-level field.
pub fn require_fields(value: &Value, fields: &[&'static str]) -> Result<(), AiError> {
    for field in fields {
        if value.get(field).is_none() {
            return Err(AiError::MissingField(field));
        }
    }
    Ok(())
}

/// Scripted model for unit tests: replays canned replies in order.
pub struct MockChat {
    replies: std::sync::Mutex<std::collections::VecDeque<String>>,
}

impl MockChat {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl ChatModel for MockChat {
    async fn complete(
        &self,
        _prompt: &str,
        _temperature: f64,
        _max_tokens: u32,
    ) -> Result<String, AiError> {
        self.replies
            .lock()
            .expect("mock reply queue poisoned")
            .pop_front()
            .ok_or(AiError::EmptyReply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_markdown_fences() {
        let reply = "Here you go:\n```json\n{\"level\": \"B1\", \"confidence\": 0.8}\n```\nHope it helps!";
        let value = extract_json_object(reply).unwrap();
        assert_eq!(value["level"], "B1");
    }

    #[test]
    fn extracts_json_from_surrounding_prose() {
        let reply = "The analysis is {\"questions\": []} as requested.";
        let value = extract_json_object(reply).unwrap();
        assert!(value["questions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn reply_without_json_is_an_error() {
        assert!(matches!(
            extract_json_object("I cannot help with that."),
            Err(AiError::NoJsonObject)
        ));
    }

    #[test]
    fn missing_required_field_is_reported_by_name() {
        let value = serde_json::json!({"level": "A2"});
        let err = require_fields(&value, &["level", "confidence"]).unwrap_err();
        assert!(matches!(err, AiError::MissingField("confidence")));
    }

    #[tokio::test]
    async fn mock_chat_replays_replies_in_order() {
        let chat = MockChat::new(vec!["first", "second"]);
        assert_eq!(chat.complete("p", 0.3, 100).await.unwrap(), "first");
        assert_eq!(chat.complete("p", 0.3, 100).await.unwrap(), "second");
        assert!(matches!(
            chat.complete("p", 0.3, 100).await,
            Err(AiError::EmptyReply)
        ));
    }
}
