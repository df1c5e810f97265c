use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use reqwest::Client;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    /// Machine feedback such as compiler diagnostics
    Tool,
}

/// A single turn in a multi-turn model conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Tool, content: content.into() }
    }

    /// Tool feedback travels as a user turn; chat APIs reserve their own tool
    /// role for structured function calls.
    fn wire_role(&self) -> &'static str {
        match self.role {
            ChatRole::User | ChatRole::Tool => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    fn wire_content(&self) -> String {
        match self.role {
            ChatRole::Tool => format!("[TOOL FEEDBACK]\n{}", self.content),
            _ => self.content.clone(),
        }
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Complete a conversation under a system directive and return the reply text
    async fn complete(&self, model: &str, system: &str, history: &[ChatMessage]) -> Result<String>;
}

pub struct OllamaProvider {
    client: ollama_rs::Ollama,
}

impl OllamaProvider {
    pub fn new(client: ollama_rs::Ollama) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn complete(&self, model: &str, system: &str, history: &[ChatMessage]) -> Result<String> {
        use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage as OllamaMessage};

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(OllamaMessage::system(system.to_string()));
        for turn in history {
            let content = turn.wire_content();
            messages.push(match turn.wire_role() {
                "assistant" => OllamaMessage::assistant(content),
                _ => OllamaMessage::user(content),
            });
        }

        let res = self.client.send_chat_messages(ChatMessageRequest::new(
            model.to_string(),
            messages,
        )).await?;

        Ok(res.message.content)
    }
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            temperature: 0.1,
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn complete(&self, model: &str, system: &str, history: &[ChatMessage]) -> Result<String> {
        let mut messages = vec![json!({ "role": "system", "content": system })];
        for turn in history {
            messages.push(json!({ "role": turn.wire_role(), "content": turn.wire_content() }));
        }

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
        });

        let mut request = self.client.post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?.error_for_status()?;
        let json: serde_json::Value = res.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("Failed to parse content from OpenAI response")?;

        Ok(content.to_string())
    }
}
