// REST client for the storefront's chat endpoints.
//
// The hub only pushes deltas; session lists, history and agent actions go
// through these calls. `ChatBackend` is the seam the app depends on so tests
// can substitute an in-memory backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::chat::{ChatMessage, ChatSession};
use crate::config::Config;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("access token cannot be sent as a header")]
    InvalidToken,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError>;
    async fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, ApiError>;
    /// Assign the session to the signed-in agent, taking it over from the AI.
    async fn take_over(&self, session_id: &str) -> Result<(), ApiError>;
    async fn close_session(&self, session_id: &str) -> Result<(), ApiError>;
}

pub struct ChatApi {
    http: reqwest::Client,
    base_url: Url,
}

impl ChatApi {
    pub fn new(
        base_url: &str,
        access_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ApiError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(
            &config.api.base_url,
            config.credentials.access_token.as_deref(),
            config.api.request_timeout(),
        )
    }

    /// `{base}/chat/sessions/...`, with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("chat").extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(%url, "GET");
        let response = check(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn post(&self, url: Url) -> Result<(), ApiError> {
        debug!(%url, "POST");
        check(self.http.post(url).send().await?).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChatBackend for ChatApi {
    async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
        self.get_json(self.endpoint(&["sessions"])).await
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        self.get_json(self.endpoint(&["sessions", session_id, "messages"]))
            .await
    }

    async fn take_over(&self, session_id: &str) -> Result<(), ApiError> {
        self.post(self.endpoint(&["sessions", session_id, "assign"]))
            .await
    }

    async fn close_session(&self, session_id: &str) -> Result<(), ApiError> {
        self.post(self.endpoint(&["sessions", session_id, "close"]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn api(base: &str) -> ChatApi {
        ChatApi::new(base, Some("tok"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoints_append_to_base_path() {
        let client = api("http://shop.test/api");
        assert_eq!(
            client.endpoint(&["sessions"]).as_str(),
            "http://shop.test/api/chat/sessions"
        );
        let client = api("http://shop.test/api/");
        assert_eq!(
            client.endpoint(&["sessions", "s-1", "messages"]).as_str(),
            "http://shop.test/api/chat/sessions/s-1/messages"
        );
    }

    #[test]
    fn session_ids_are_percent_encoded() {
        let client = api("http://shop.test/api");
        assert_eq!(
            client.endpoint(&["sessions", "a/b c", "close"]).as_str(),
            "http://shop.test/api/chat/sessions/a%2Fb%20c/close"
        );
    }

    #[test]
    fn rejects_bad_base_urls_and_tokens() {
        assert!(matches!(
            ChatApi::new("not a url", None, Duration::from_secs(1)),
            Err(ApiError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            ChatApi::new("mailto:desk@shop.test", None, Duration::from_secs(1)),
            Err(ApiError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            ChatApi::new("http://shop.test", Some("bad\ntoken"), Duration::from_secs(1)),
            Err(ApiError::InvalidToken)
        ));
    }

    /// Serve a single HTTP response and hand back the raw request head.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == &b"\r\n\r\n"[..]) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).into_owned()
        });
        (format!("http://{addr}/api"), handle)
    }

    #[tokio::test]
    async fn list_sessions_sends_bearer_token() {
        let body = r#"[{"id":"s-1","status":"Escalated","updatedAt":"2026-10-18T09:30:00Z"}]"#;
        let (base, server) = serve_once("200 OK", body).await;

        let sessions = api(&base).list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "s-1");

        let head = server.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /api/chat/sessions http/1.1"), "{head}");
        assert!(head.contains("authorization: bearer tok"), "{head}");
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let (base, server) = serve_once("409 Conflict", r#"{"error":"already assigned"}"#).await;

        let err = api(&base).take_over("s-1").await.unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 409);
                assert!(body.contains("already assigned"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let head = server.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("post /api/chat/sessions/s-1/assign"), "{head}");
    }
}
