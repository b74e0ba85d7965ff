// src/scoring/provider.rs
//! Semantic scoring providers: OpenAI-compatible chat completions (DashScope, OpenAI,
//! Azure OpenAI) plus a local mock.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::ScoringError;

pub const DASHSCOPE_ENDPOINT: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const AZURE_API_VERSION: &str = "2024-08-01-preview";

const SYSTEM_PROMPT: &str = "You are an expert research assistant. Respond only with valid JSON.";

/// What a provider returns for one paper.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub relevant: bool,
    pub confidence: String,
    /// Clamped to 0..=100.
    pub score: u32,
    pub reasoning: String,
    pub topics: Vec<String>,
}

#[async_trait]
pub trait ScoringProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Judge one paper summary against the interest description.
    async fn submit(&self, paper_summary: &str, interests: &str) -> Result<Verdict, ScoringError>;
}

pub fn build_prompt(paper_summary: &str, interests: &str) -> String {
    format!(
        r#"You are an expert research assistant helping to filter academic papers.

Research Interests:
{interests}

Paper to Evaluate:
{paper_summary}

Task: Determine if this paper is relevant to the research interests above.

Respond with a JSON object with the following fields:
- "relevant": boolean (true if relevant, false if not)
- "confidence": string ("high", "medium", "low")
- "score": integer (0-100, where 100 is highly relevant)
- "reasoning": string (brief explanation of why this paper is or isn't relevant)
- "topics": list of strings (key topics from the paper that relate to research interests)

Only respond with the JSON object, no additional text."#
    )
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    relevant: Option<bool>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    score: Option<serde_json::Value>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
}

fn score_value(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse model output. Accepts a bare JSON object or one embedded in prose.
pub fn parse_verdict(content: &str) -> Result<Verdict, ScoringError> {
    static RE_OBJECT: OnceCell<Regex> = OnceCell::new();
    let raw: RawVerdict = match serde_json::from_str(content.trim()) {
        Ok(v) => v,
        Err(_) => {
            let re = RE_OBJECT.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap());
            let m = re.find(content).ok_or_else(|| {
                ScoringError::InvalidResponse(format!("no JSON object in: {}", preview(content)))
            })?;
            serde_json::from_str(m.as_str())
                .map_err(|e| ScoringError::InvalidResponse(format!("{e}: {}", preview(content))))?
        }
    };
    let score = raw
        .score
        .as_ref()
        .and_then(score_value)
        .filter(|s| s.is_finite())
        .ok_or_else(|| ScoringError::InvalidResponse("missing numeric score".to_string()))?;
    let score = score.round().clamp(0.0, 100.0) as u32;
    Ok(Verdict {
        relevant: raw.relevant.unwrap_or(score >= 50),
        confidence: raw.confidence.unwrap_or_else(|| "low".to_string()),
        score,
        reasoning: raw.reasoning.unwrap_or_default().trim().to_string(),
        topics: raw.topics,
    })
}

fn preview(s: &str) -> String {
    s.chars().take(120).collect()
}

#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    /// Azure takes the key in an `api-key` header.
    ApiKeyHeader(String),
}

/// Chat-completions client shared by all OpenAI-compatible services.
pub struct OpenAiCompatibleProvider {
    name: &'static str,
    http: reqwest::Client,
    url: String,
    auth: Auth,
    /// Omitted from the request body for Azure (the deployment is in the URL).
    model: Option<String>,
    json_mode: bool,
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("research-weekly-feed/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

impl OpenAiCompatibleProvider {
    pub fn dashscope(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::openai_like("dashscope", DASHSCOPE_ENDPOINT, api_key, model)
    }

    /// `endpoint` is the API base, e.g. `https://api.openai.com/v1`.
    pub fn openai(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: Option<&str>,
    ) -> Self {
        Self::openai_like("openai", endpoint.unwrap_or(OPENAI_ENDPOINT), api_key, model)
    }

    pub fn azure(
        api_key: impl Into<String>,
        endpoint: &str,
        deployment: &str,
        api_version: Option<&str>,
    ) -> Self {
        let url = format!(
            "{}/openai/deployments/{deployment}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            api_version.unwrap_or(AZURE_API_VERSION)
        );
        Self {
            name: "azure",
            http: http_client(),
            url,
            auth: Auth::ApiKeyHeader(api_key.into()),
            model: None,
            json_mode: true,
        }
    }

    fn openai_like(
        name: &'static str,
        base: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name,
            http: http_client(),
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            auth: Auth::Bearer(api_key.into()),
            model: Some(model.into()),
            json_mode: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ScoringProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn submit(&self, paper_summary: &str, interests: &str) -> Result<Verdict, ScoringError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            model: Option<&'a str>,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            #[serde(skip_serializing_if = "Option::is_none")]
            response_format: Option<ResponseFormat>,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let prompt = build_prompt(paper_summary, interests);
        let req = Req {
            model: self.model.as_deref(),
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.1,
            max_tokens: 300,
            response_format: self.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let builder = self.http.post(&self.url).json(&req);
        let builder = match &self.auth {
            Auth::Bearer(key) => builder.bearer_auth(key),
            Auth::ApiKeyHeader(key) => builder.header("api-key", key),
        };
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScoringError::Status {
                status: status.as_u16(),
                body: preview(&body),
            });
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))?;
        let content = body
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("");
        parse_verdict(content)
    }
}

enum MockMode {
    /// Score by how many interest terms appear in the summary.
    Overlap,
    Fixed(Verdict),
    Fail(String),
}

/// Offline provider. Counts calls so tests can assert cache behavior.
pub struct MockProvider {
    mode: MockMode,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn overlap() -> Self {
        Self::with_mode(MockMode::Overlap)
    }

    pub fn fixed(verdict: Verdict) -> Self {
        Self::with_mode(MockMode::Fixed(verdict))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_mode(MockMode::Fail(message.into()))
    }

    fn with_mode(mode: MockMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn terms(s: &str) -> BTreeSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl ScoringProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, paper_summary: &str, interests: &str) -> Result<Verdict, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            MockMode::Fixed(v) => Ok(v.clone()),
            MockMode::Fail(msg) => Err(ScoringError::Unavailable(msg.clone())),
            MockMode::Overlap => {
                let wanted = terms(interests);
                let found: Vec<String> = terms(paper_summary)
                    .intersection(&wanted)
                    .cloned()
                    .collect();
                let score = (found.len() as u32 * 20).min(100);
                Ok(Verdict {
                    relevant: score >= 50,
                    confidence: "low".to_string(),
                    score,
                    reasoning: format!("{} shared interest terms", found.len()),
                    topics: found,
                })
            }
        }
    }
}
