use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

const GENERIC_API_ERROR: &str = "Error communicating with the completion API";
const CONNECTIVITY_ERROR: &str = "Could not reach the completion API";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One user message in, the assistant's full reply out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn send(&self, text: &str) -> Result<String, RemoteError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    api_url: String,
    api_key: Option<String>,
    model: String,
    http: Client,
}

impl OpenAiClient {
    pub fn new(api_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            api_url,
            api_key,
            model,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn send(&self, text: &str) -> Result<String, RemoteError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![RequestMessage {
                role: "user",
                content: text,
            }],
            store: true,
        };

        let mut request = self.http.post(&self.api_url).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            error!(error = %err, "completion request failed");
            RemoteError::new(CONNECTIVITY_ERROR)
        })?;

        let status = response.status();
        let payload = response.text().await.map_err(|err| {
            error!(error = %err, "failed to read completion response");
            RemoteError::new(CONNECTIVITY_ERROR)
        })?;

        if !status.is_success() {
            let message = error_message_from_body(&payload).unwrap_or_else(|| GENERIC_API_ERROR.to_string());
            error!(status = status.as_u16(), %message, "completion api returned an error");
            return Err(RemoteError::new(message));
        }

        let reply = reply_from_body(&payload)?;
        debug!(chars = reply.chars().count(), "completion received");
        Ok(reply)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    store: bool,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn reply_from_body(body: &str) -> Result<String, RemoteError> {
    let parsed: CompletionResponse = serde_json::from_str(body).map_err(|err| {
        error!(error = %err, "malformed completion response");
        RemoteError::new(GENERIC_API_ERROR)
    })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            error!("completion response had no message content");
            RemoteError::new(GENERIC_API_ERROR)
        })
}

fn error_message_from_body(body: &str) -> Option<String> {
    let parsed: ErrorResponse = serde_json::from_str(body).ok()?;
    parsed.error.message.filter(|message| !message.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves exactly one canned HTTP response and hands back the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    #[test]
    fn reply_is_taken_from_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}},{"message":{"content":"ignored"}}]}"#;
        assert_eq!(reply_from_body(body).unwrap(), "Hi there");
    }

    #[test]
    fn empty_or_malformed_reply_is_remote_error() {
        assert!(reply_from_body(r#"{"choices":[]}"#).is_err());
        assert!(reply_from_body(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(reply_from_body("<html>").is_err());
    }

    #[test]
    fn provider_error_message_is_extracted() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        assert_eq!(error_message_from_body(body).as_deref(), Some("Rate limit reached"));
        assert_eq!(error_message_from_body(r#"{"error":{}}"#), None);
        assert_eq!(error_message_from_body("bad gateway"), None);
    }

    #[tokio::test]
    async fn sends_openai_request_and_returns_reply() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#,
        )
        .await;
        let client = OpenAiClient::new(url, Some("sk-test".to_string()), "gpt-4o-mini".to_string());

        assert_eq!(client.send("Hello").await.unwrap(), "Hi there");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Hello"}],
                "store": true
            })
        );
    }

    #[tokio::test]
    async fn error_status_uses_provider_message() {
        let (url, server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"rate limited"}}"#,
        )
        .await;
        let client = OpenAiClient::new(url, None, "gpt-4o-mini".to_string());

        let err = client.send("Hello").await.unwrap_err();
        assert_eq!(err.message, "rate limited");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn error_status_without_body_uses_generic_message() {
        let (url, server) = serve_once("500 Internal Server Error", "oops").await;
        let client = OpenAiClient::new(url, None, "gpt-4o-mini".to_string());

        let err = client.send("Hello").await.unwrap_err();
        assert_eq!(err.message, GENERIC_API_ERROR);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_host_is_connectivity_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenAiClient::new(format!("http://{addr}/v1/chat/completions"), None, "m".to_string());
        let err = client.send("Hello").await.unwrap_err();
        assert_eq!(err.message, CONNECTIVITY_ERROR);
    }
}
