//! HTTP adapters for the external collaborators.
//!
//! The generator, poster, and interpreter are sidecar services configured by
//! URL. Transport failures and 5xx/429 responses map to `ExternalTransient`
//! so the engine retries them; other non-success responses map to
//! `ExternalPermanent` and hold the quest.

use async_trait::async_trait;
use questline_core::chapter::Chapter;
use questline_core::collaborators::{
    ChapterGenerator, GeneratedChapter, InterpretedChoice, ReplyInterpreter, SocialPoster,
};
use questline_core::error::EngineError;
use questline_core::quest::Quest;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

fn send_error(err: &reqwest::Error) -> EngineError {
    EngineError::ExternalTransient(format!("upstream request failed: {err}"))
}

async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, EngineError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(|err| {
            EngineError::ExternalPermanent(format!("malformed upstream response: {err}"))
        });
    }
    let message = format!("upstream returned {status}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(EngineError::ExternalTransient(message))
    } else {
        Err(EngineError::ExternalPermanent(message))
    }
}

/// Chapter generator backed by an HTTP sidecar.
#[derive(Debug, Clone)]
pub struct HttpChapterGenerator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChapterGenerator {
    /// Creates a generator client for the given base URL.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    quest: &'a Quest,
    history: &'a [Chapter],
    winning_option: usize,
}

#[async_trait]
impl ChapterGenerator for HttpChapterGenerator {
    async fn generate(
        &self,
        quest: &Quest,
        history: &[Chapter],
        winning_option: usize,
    ) -> Result<GeneratedChapter, EngineError> {
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&GenerateRequest {
                quest,
                history,
                winning_option,
            })
            .send()
            .await
            .map_err(|err| send_error(&err))?;
        decode_response(response).await
    }
}

/// Social poster backed by an HTTP sidecar.
#[derive(Debug, Clone)]
pub struct HttpSocialPoster {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSocialPoster {
    /// Creates a poster client for the given base URL.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PostRequest<'a> {
    content: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct PostResponse {
    remote_id: String,
}

#[async_trait]
impl SocialPoster for HttpSocialPoster {
    async fn post(&self, content: &str) -> Result<String, EngineError> {
        let response = self
            .client
            .post(format!("{}/post", self.base_url))
            .json(&PostRequest { content })
            .send()
            .await
            .map_err(|err| send_error(&err))?;
        let body: PostResponse = decode_response(response).await?;
        Ok(body.remote_id)
    }
}

/// Reply interpreter backed by an HTTP sidecar.
#[derive(Debug, Clone)]
pub struct HttpReplyInterpreter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReplyInterpreter {
    /// Creates an interpreter client for the given base URL.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct InterpretRequest<'a> {
    reply_text: &'a str,
    options: &'a [String],
}

#[async_trait]
impl ReplyInterpreter for HttpReplyInterpreter {
    async fn interpret(
        &self,
        reply_text: &str,
        options: &[String],
    ) -> Result<InterpretedChoice, EngineError> {
        let response = self
            .client
            .post(format!("{}/interpret", self.base_url))
            .json(&InterpretRequest {
                reply_text,
                options,
            })
            .send()
            .await
            .map_err(|err| send_error(&err))?;
        decode_response(response).await
    }
}
