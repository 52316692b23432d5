use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// One chat-completion call: a system prompt and a single user turn.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub user_text: &'a str,
    pub max_tokens: u32,
}

#[async_trait]
pub trait Completion: Send + Sync {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, Error>;
}

pub struct Client {
    api_key: String,
    url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl<'a> From<ChatRequest<'a>> for ApiRequest<'a> {
    fn from(request: ChatRequest<'a>) -> Self {
        Self {
            model: request.model,
            max_tokens: request.max_tokens,
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: request.system_prompt,
                },
                ApiMessage {
                    role: "user",
                    content: request.user_text,
                },
            ],
        }
    }
}

fn first_choice(body: &str) -> Result<String, Error> {
    let response: ApiResponse = serde_json::from_str(body).map_err(|e| Error::Parse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(Error::Empty)
}

impl Client {
    pub fn new(api_key: String) -> Self {
        Self::with_url(api_key, API_URL)
    }

    pub fn with_url(api_key: String, url: impl Into<String>) -> Self {
        Self {
            api_key,
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Completion for Client {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, Error> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&ApiRequest::from(request))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Api(format!("{status}: {body}")));
        }

        first_choice(&body)
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}
