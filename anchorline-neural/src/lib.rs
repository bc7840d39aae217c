use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub mod privacy;
pub mod suggestion;

pub use privacy::PrivacyGuard;
pub use suggestion::{
    assess_command, parse_suggestion, Alternative, CommandSuggestion, RiskAssessment,
    SuggestionError,
};

/// Turns a natural-language query into a structured shell command.
#[async_trait]
pub trait CommandSuggester: Send + Sync {
    /// `context` is recent terminal output, oldest line first.
    async fn suggest_command(&self, query: &str, context: &[String]) -> Result<CommandSuggestion>;
}

const SYSTEM_PROMPT: &str = "You are a terminal expert. Turn the user's request into one shell command. \
Reply with ONLY a JSON object: {\"command\": string, \"explanation\": string, \
\"isDangerous\": bool, \"requiresSudo\": bool, \"affectsFiles\": [string], \
\"alternatives\": [{\"command\": string, \"description\": string}], \"warning\": string|null}";

/// Direct HTTP client for any OpenAI-compatible server.
pub struct ChatCompletionClient {
    http: Client,
    base_url: String,
    model_name: String,
    context_lines: usize,
}

impl ChatCompletionClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_name: model.to_string(),
            context_lines: 20,
        }
    }

    /// Cap on terminal lines sent with each query.
    pub fn with_context_lines(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a chat completion request and return the content string.
    async fn chat(&self, messages: Vec<Value>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": self.model_name,
            "messages": messages,
            "stream": false
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to contact completion provider")?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Provider returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            ));
        }

        let parsed: Value = serde_json::from_str(&text)?;

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .context("Provider returned empty content")?
            .trim()
            .to_string();

        Ok(content)
    }

    fn build_messages(&self, query: &str, context: &[String]) -> Vec<Value> {
        let safe_query = PrivacyGuard::scrub(query);
        if safe_query != query {
            tracing::warn!("query contained sensitive data; scrubbed");
        }

        let mut user = safe_query;
        let recent = PrivacyGuard::scrub_context(context, self.context_lines);
        if !recent.is_empty() {
            user.push_str("\n\nRecent terminal output:\n");
            user.push_str(&recent.join("\n"));
        }

        vec![
            json!({ "role": "system", "content": SYSTEM_PROMPT }),
            json!({ "role": "user", "content": user }),
        ]
    }
}

#[async_trait]
impl CommandSuggester for ChatCompletionClient {
    async fn suggest_command(&self, query: &str, context: &[String]) -> Result<CommandSuggestion> {
        let reply = self.chat(self.build_messages(query, context)).await?;
        tracing::debug!(chars = reply.len(), "suggestion reply received");
        let suggestion = parse_suggestion(&reply).context("Unusable suggestion from provider")?;
        Ok(suggestion.with_local_assessment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_scrub_query_and_context() {
        let client = ChatCompletionClient::new("http://localhost:8000/v1/", "m").with_context_lines(1);
        let context = vec!["old line".to_string(), "ssh root@10.1.2.3".to_string()];
        let messages = client.build_messages("connect to 192.168.0.9", &context);

        assert_eq!(client.base_url(), "http://localhost:8000/v1");
        let user = messages[1]["content"].as_str().unwrap();
        assert!(user.starts_with("connect to [REDACTED_IP]"));
        assert!(!user.contains("old line"));
        assert!(!user.contains("10.1.2.3"));
    }
}
