//! Caption client backed by the Gemini `generateContent` REST API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::caption::{
    CaptionClient, CaptionError, CaptionRequest, CaptionResult, NO_OUTPUT_MESSAGE,
};
use crate::core::data_url;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Clone)]
pub struct GeminiCaptionClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiCaptionClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(request: &CaptionRequest) -> Result<GenerateContentRequest, CaptionError> {
        let decoded = data_url::parse(&request.photo_data_uri)
            .map_err(|e| CaptionError::Generation(e.to_string()))?;

        Ok(GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Text {
                        text: request.prompt(),
                    },
                    Part::InlineData {
                        inline_data: InlineDataPayload {
                            mime_type: decoded.mime_type,
                            // re-use the caller's payload instead of re-encoding
                            data: request
                                .photo_data_uri
                                .split_once(',')
                                .map(|(_, payload)| payload.to_string())
                                .unwrap_or_default(),
                        },
                    },
                ],
            }],
        })
    }
}

#[async_trait]
impl CaptionClient for GeminiCaptionClient {
    async fn generate_caption(&self, request: CaptionRequest) -> Result<CaptionResult, CaptionError> {
        let body = Self::build_request(&request)?;
        let url = format!(
            "{}/{model}:generateContent?key={api_key}",
            self.base_url,
            model = self.model,
            api_key = self.api_key
        );

        debug!(model = %self.model, style = %request.style(), "requesting caption");
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                CaptionError::Generation(format!("Caption generation failed: {}", err.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            warn!(%status, "Gemini request failed");
            return Err(map_http_error(status, body_text));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|err| {
            CaptionError::InvalidResponseShape(format!("Failed to parse Gemini response: {}", err))
        })?;

        let caption = extract_text_response(parsed)?;
        Ok(CaptionResult::new(caption))
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_text_response(response: GenerateContentResponse) -> Result<String, CaptionError> {
    response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .map(|text| text.trim().trim_matches('"').trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| CaptionError::Generation(NO_OUTPUT_MESSAGE.to_string()))
}

fn map_http_error(status: StatusCode, body: String) -> CaptionError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.clone());
            if status_text.is_empty() {
                msg
            } else {
                format!("{}: {}", status_text, msg)
            }
        })
        .unwrap_or_else(|_| body.clone());

    CaptionError::Generation(format!(
        "Caption generation failed: {} - {}",
        status.as_u16(),
        message
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::caption::{CaptionParams, CaptionStyle};
    use mockito::Matcher;
    use serde_json::json;

    const PHOTO: &str = "data:image/png;base64,iVBORw==";

    fn request() -> CaptionRequest {
        CaptionRequest::new(
            PHOTO,
            &CaptionParams {
                style: CaptionStyle::Descriptive,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_caption_from_first_candidate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gemini-test:generateContent")
            .match_query(Matcher::UrlEncoded("key".into(), "secret".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""mimeType":"image/png""#.to_string()),
                Matcher::Regex(r#""data":"iVBORw==""#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{"content": {"parts": [{"text": "  A cat on a windowsill.\n"}]}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GeminiCaptionClient::new("secret", "gemini-test")
            .unwrap()
            .with_base_url(server.url());
        let result = client.generate_caption(request()).await.unwrap();

        assert_eq!(result, CaptionResult::new("A cat on a windowsill."));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_candidates_is_no_output() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/gemini-test:generateContent")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"candidates": []}).to_string())
            .create_async()
            .await;

        let client = GeminiCaptionClient::new("secret", "gemini-test")
            .unwrap()
            .with_base_url(server.url());
        let err = client.generate_caption(request()).await.unwrap_err();

        assert_eq!(err, CaptionError::Generation(NO_OUTPUT_MESSAGE.to_string()));
        assert_eq!(
            err.to_string(),
            "Caption generation failed: No output received from AI model."
        );
    }

    #[tokio::test]
    async fn test_http_error_carries_provider_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/gemini-test:generateContent")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(
                json!({"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = GeminiCaptionClient::new("secret", "gemini-test")
            .unwrap()
            .with_base_url(server.url());
        let err = client.generate_caption(request()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Caption generation failed: 429 - RESOURCE_EXHAUSTED: Quota exceeded"
        );
    }

    #[tokio::test]
    async fn test_rejects_non_data_url_before_sending() {
        let client = GeminiCaptionClient::new("secret", "gemini-test")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = client
            .generate_caption(CaptionRequest::new("not-a-data-url", &CaptionParams::default()))
            .await
            .unwrap_err();

        assert!(matches!(err, CaptionError::Generation(_)));
    }
}
