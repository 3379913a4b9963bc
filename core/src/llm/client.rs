//! Gemini streaming client
//!
//! Talks to the Generative Language API `streamGenerateContent` endpoint in
//! SSE mode and turns each `data:` payload into [`StreamEvent`]s.

use super::{ChunkStream, GenerationRequest, ModelTransport, Role, StreamEvent};
use crate::config::EndpointConfig;
use crate::util::{sanitize_base_url, validate_api_key};
use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client as HttpClient,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Finish reasons that mean the provider withheld the answer.
const BLOCKING_FINISH_REASONS: [&str; 4] = ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// Gemini client
pub struct GeminiClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a new client from endpoint settings
    pub fn new(endpoint: &EndpointConfig) -> Result<Self> {
        let base_url = sanitize_base_url(&endpoint.base_url, "Base URL")?;
        let api_key = validate_api_key(endpoint.api_key.as_deref().unwrap_or(""))?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .user_agent(concat!("rahyab/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            model: endpoint.model.clone(),
        })
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    fn stream_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.base_url, self.model
        ))
        .context("Invalid streaming URL")?;
        url.query_pairs_mut().append_pair("alt", "sse");
        Ok(url)
    }

    /// Build headers for API requests
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            self.api_key.parse().context("Invalid API key header")?,
        );
        Ok(headers)
    }
}

impl ModelTransport for GeminiClient {
    fn stream_generate(&self, request: GenerationRequest) -> ChunkStream {
        let http_client = self.http_client.clone();
        let url_res = self.stream_url();
        let headers_res = self.build_headers();
        let body = GeminiRequest::from_request(&request);

        Box::pin(async_stream::try_stream! {
            let url = url_res?;
            let headers = headers_res?;
            debug!("Streaming from {}", url.path());

            let response = http_client
                .post(url)
                .headers(headers)
                .json(&body)
                .send()
                .await
                .context("Failed to send streaming request")?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                Err(anyhow!("API request failed ({}): {}", status, error_message(&text)))?;
                return;
            }

            let mut stream = response.bytes_stream();
            // Lines are split on raw bytes so multi-byte characters spanning
            // two network chunks stay intact.
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_res) = stream.next().await {
                let chunk = chunk_res.context("Failed to read chunk")?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&line_bytes);
                    let line = line.trim_end_matches(['\r', '\n']);

                    if let Some(data) = line.strip_prefix("data:") {
                        for event in parse_sse_payload(data.trim())? {
                            let blocked = matches!(event, StreamEvent::Blocked { .. });
                            yield event;
                            if blocked {
                                return;
                            }
                        }
                    }
                }
            }

            let tail = String::from_utf8_lossy(&buffer).to_string();
            if let Some(data) = tail.trim().strip_prefix("data:") {
                for event in parse_sse_payload(data.trim())? {
                    yield event;
                }
            }

            yield StreamEvent::Done;
        })
    }
}

/// Turn one SSE `data:` payload into stream events.
///
/// Payloads that are not JSON are skipped. An `error` object is an error.
pub fn parse_sse_payload(data: &str) -> Result<Vec<StreamEvent>> {
    if data.is_empty() || data == "[DONE]" {
        return Ok(Vec::new());
    }

    let parsed: GeminiStreamResponse = match serde_json::from_str(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Skipping unparseable SSE payload: {}", e);
            return Ok(Vec::new());
        }
    };

    if let Some(error) = parsed.error {
        return Err(anyhow!(
            "API error{}: {}",
            error.code.map(|c| format!(" {}", c)).unwrap_or_default(),
            error.message.unwrap_or_else(|| "unknown error".to_string())
        ));
    }

    let mut events = Vec::new();
    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        events.push(StreamEvent::Blocked { reason });
        return Ok(events);
    }

    if let Some(candidate) = parsed.candidates.into_iter().next() {
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if !text.is_empty() {
            events.push(StreamEvent::Content(text));
        }
        if let Some(reason) = candidate.finish_reason {
            if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) {
                events.push(StreamEvent::Blocked { reason });
            }
        }
    }
    Ok(events)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<GeminiErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| body.chars().take(500).collect())
}

// Gemini API types
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

impl GeminiRequest {
    fn from_request(request: &GenerationRequest) -> Self {
        let mut contents: Vec<GeminiContent> = Vec::new();
        for message in &request.contents {
            let role = match message.role {
                Role::User => "user",
                Role::Model => "model",
            };
            // Consecutive turns of one role are merged
            if let Some(last) = contents.last_mut() {
                if last.role.as_deref() == Some(role) {
                    last.parts.push(GeminiPart::text(&message.text));
                    continue;
                }
            }
            contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts: vec![GeminiPart::text(&message.text)],
            });
        }

        // Contents must start with a user turn
        while contents.first().map(|c| c.role.as_deref() != Some("user")).unwrap_or(false) {
            contents.remove(0);
        }

        Self {
            contents,
            system_instruction: request
                .system_instruction
                .as_ref()
                .filter(|s| !s.trim().is_empty())
                .map(|text| GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::text(text)],
                }),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
            },
            tools: request.live_search.then(|| {
                vec![GeminiTool {
                    google_search: GoogleSearch {},
                }]
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: GoogleSearch,
}

#[derive(Serialize, Debug)]
struct GoogleSearch {}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    error: Option<GeminiError>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiErrorEnvelope {
    error: GeminiError,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    code: Option<u16>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use serde_json::json;

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            api_key: Some("test-key".to_string()),
            ..EndpointConfig::default()
        }
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(GeminiClient::new(&EndpointConfig::default()).is_err());
        assert!(GeminiClient::new(&endpoint()).is_ok());
    }

    #[test]
    fn test_stream_url() {
        let client = GeminiClient::new(&endpoint()).unwrap();
        let url = client.stream_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_parse_content_chunk() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"<<<EVENT>>>"},{"text":"{\"a\""}]}}]}"#;
        let events = parse_sse_payload(data).unwrap();
        assert_eq!(events, vec![StreamEvent::Content("<<<EVENT>>>{\"a\"".to_string())]);
    }

    #[test]
    fn test_parse_block_reason() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert_eq!(
            parse_sse_payload(data).unwrap(),
            vec![StreamEvent::Blocked {
                reason: "SAFETY".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_safety_finish_reason() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"partial"}]},"finishReason":"SAFETY"}]}"#;
        let events = parse_sse_payload(data).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Content("partial".to_string()));
        assert!(matches!(events[1], StreamEvent::Blocked { .. }));

        let data = r#"{"candidates":[{"content":{"parts":[{"text":"end"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(parse_sse_payload(data).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_error_payload() {
        let data = r#"{"error":{"code":429,"message":"Resource exhausted"}}"#;
        let err = parse_sse_payload(data).unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Resource exhausted"));
    }

    #[test]
    fn test_unparseable_payload_is_skipped() {
        assert!(parse_sse_payload("{not json").unwrap().is_empty());
        assert!(parse_sse_payload("[DONE]").unwrap().is_empty());
    }

    #[test]
    fn test_request_body() {
        let request = GenerationRequest {
            contents: vec![
                ChatMessage::model("dangling model turn"),
                ChatMessage::user("first"),
                ChatMessage::user("second"),
                ChatMessage::model("reply"),
            ],
            system_instruction: Some("be precise".to_string()),
            temperature: Some(0.4),
            top_p: Some(0.95),
            live_search: true,
        };
        let body = serde_json::to_value(GeminiRequest::from_request(&request)).unwrap();

        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be precise");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["tools"], json!([{ "googleSearch": {} }]));
        assert!(body["generationConfig"]["topP"].is_number());
    }

    #[test]
    fn test_request_without_live_search_has_no_tools() {
        let request = GenerationRequest {
            contents: vec![ChatMessage::user("hi")],
            ..GenerationRequest::default()
        };
        let body = serde_json::to_value(GeminiRequest::from_request(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"code":400,"message":"API key not valid"}}"#),
            "API key not valid"
        );
        assert_eq!(error_message("plain failure"), "plain failure");
    }

    /// Accept one connection, read the whole request and answer with `response`.
    async fn serve_once(response: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            if name.eq_ignore_ascii_case("content-length") {
                                value.trim().parse::<usize>().ok()
                            } else {
                                None
                            }
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_error_status_ends_stream_with_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid"}}"#;
        let base_url = serve_once(format!(
            "HTTP/1.1 400 Bad Request\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;

        let client = GeminiClient::new(&EndpointConfig {
            base_url,
            ..endpoint()
        })
        .unwrap();
        let items: Vec<_> = client
            .stream_generate(GenerationRequest {
                contents: vec![ChatMessage::user("hi")],
                ..GenerationRequest::default()
            })
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        let message = items[0].as_ref().unwrap_err().to_string();
        assert!(message.contains("400"), "{}", message);
        assert!(message.contains("API key not valid"), "{}", message);
    }

    #[tokio::test]
    async fn test_sse_body_is_streamed() {
        let body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hello\"}]}}]}\n\n";
        let base_url = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;

        let client = GeminiClient::new(&EndpointConfig {
            base_url,
            ..endpoint()
        })
        .unwrap();
        let items: Vec<StreamEvent> = client
            .stream_generate(GenerationRequest {
                contents: vec![ChatMessage::user("hi")],
                ..GenerationRequest::default()
            })
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(items, vec![StreamEvent::Content("hello".to_string()), StreamEvent::Done]);
    }
}
