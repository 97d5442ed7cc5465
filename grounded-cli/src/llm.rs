use anyhow::{Context, Result};
use async_trait::async_trait;
use grounded_core::{Completion, CompletionError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::auth::AuthState;
use crate::config::LlmSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(alias = "open-ai")]
    OpenAI,
    Anthropic,
}

impl Provider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com",
            Provider::Anthropic => "https://api.anthropic.com",
        }
    }
}

const ANTHROPIC_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicReq<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Msg<'a>>,
}

/// Single-shot chat completion against OpenAI or Anthropic
pub struct LlmClient {
    provider: Provider,
    model: String,
    base_url: String,
    temperature: f32,
    timeout: Duration,
    key: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(cfg: &LlmSection, auth: &AuthState) -> Result<Self> {
        let key = auth.key_for(cfg.provider).ok_or_else(|| {
            let hint = match cfg.provider {
                Provider::OpenAI => "set OPENAI_API_KEY or run: grounded auth set-openai-key",
                Provider::Anthropic => "set ANTHROPIC_API_KEY or run: grounded auth set-anthropic-key",
            };
            CompletionError::MissingCredentials(hint.to_string())
        })?;

        let timeout = Duration::from_secs(cfg.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            provider: cfg.provider,
            model: cfg.model.clone(),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| cfg.provider.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: cfg.temperature,
            timeout,
            key,
            http,
        })
    }

    fn transport(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::Timeout(self.timeout.as_secs())
        } else {
            CompletionError::Transport(err.to_string())
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, CompletionError> {
        let resp = req.send().await.map_err(|e| self.transport(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport(e))?;
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn openai_complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = openai_request(&self.model, self.temperature, system, user);
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.key))
            .map_err(|e| CompletionError::MissingCredentials(e.to_string()))?;

        let req = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, auth)
            .json(&body);
        let text = self.send(req).await?;
        parse_openai(&text)
    }

    async fn anthropic_complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = anthropic_request(&self.model, self.temperature, system, user);

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.key)
                .map_err(|e| CompletionError::MissingCredentials(e.to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let req = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .headers(headers)
            .json(&body);
        let text = self.send(req).await?;
        parse_anthropic(&text)
    }
}

#[async_trait]
impl Completion for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        debug!(provider = ?self.provider, model = %self.model, "completion request");
        match self.provider {
            Provider::OpenAI => self.openai_complete(system, user).await,
            Provider::Anthropic => self.anthropic_complete(system, user).await,
        }
    }
}

fn openai_request<'a>(model: &'a str, temperature: f32, system: &'a str, user: &'a str) -> OpenAiReq<'a> {
    OpenAiReq {
        model,
        messages: vec![
            Msg { role: "system", content: system },
            Msg { role: "user", content: user },
        ],
        temperature,
    }
}

fn anthropic_request<'a>(model: &'a str, temperature: f32, system: &'a str, user: &'a str) -> AnthropicReq<'a> {
    AnthropicReq {
        model,
        max_tokens: ANTHROPIC_MAX_TOKENS,
        temperature,
        system,
        messages: vec![Msg { role: "user", content: user }],
    }
}

fn parse_openai(body: &str) -> Result<String, CompletionError> {
    #[derive(Deserialize)]
    struct Resp {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: MsgOut,
    }

    #[derive(Deserialize)]
    struct MsgOut {
        content: Option<String>,
    }

    let out: Resp = serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;
    let choice = out
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Malformed("no choices in response".to_string()))?;
    Ok(choice.message.content.unwrap_or_default().trim().to_string())
}

fn parse_anthropic(body: &str) -> Result<String, CompletionError> {
    #[derive(Deserialize)]
    struct Resp {
        content: Vec<ContentBlock>,
    }

    #[derive(Deserialize)]
    struct ContentBlock {
        #[serde(rename = "type")]
        t: String,
        text: Option<String>,
    }

    let out: Resp = serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;
    let mut s = String::new();
    for b in out.content {
        if b.t == "text" {
            if let Some(t) = b.text {
                s.push_str(&t);
            }
        }
    }
    Ok(s.trim().to_string())
}
