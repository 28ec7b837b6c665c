//! Caption request/response shapes and the client boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NO_OUTPUT_MESSAGE: &str = "Caption generation failed: No output received from AI model.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionStyle {
    #[default]
    Default,
    Descriptive,
    Creative,
    Humorous,
    Professional,
    Social,
}

impl CaptionStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionStyle::Default => "default",
            CaptionStyle::Descriptive => "descriptive",
            CaptionStyle::Creative => "creative",
            CaptionStyle::Humorous => "humorous",
            CaptionStyle::Professional => "professional",
            CaptionStyle::Social => "social",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            CaptionStyle::Default => "Write a short, relevant caption.",
            CaptionStyle::Descriptive => {
                "Write a detailed caption that describes the subjects, setting and colors."
            }
            CaptionStyle::Creative => "Write an imaginative, evocative caption.",
            CaptionStyle::Humorous => "Write a witty, light-hearted caption.",
            CaptionStyle::Professional => {
                "Write a concise caption in a neutral, professional tone."
            }
            CaptionStyle::Social => "Write an engaging caption suited to a social media post.",
        }
    }
}

impl fmt::Display for CaptionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptionStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "" => Ok(CaptionStyle::Default),
            "descriptive" => Ok(CaptionStyle::Descriptive),
            "creative" => Ok(CaptionStyle::Creative),
            "humorous" | "funny" => Ok(CaptionStyle::Humorous),
            "professional" => Ok(CaptionStyle::Professional),
            "social" => Ok(CaptionStyle::Social),
            other => Err(format!("unknown caption style: {}", other)),
        }
    }
}

/// User-chosen generation parameters, kept by the workflow between attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptionParams {
    pub style: CaptionStyle,
    pub language: Option<String>,
    pub context: Option<String>,
    pub include_hashtags: bool,
    pub include_emojis: bool,
}

/// Wire shape of the caption endpoint. Absent fields are skipped, never sent
/// as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionRequest {
    pub photo_data_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<CaptionStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_hashtags: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_emojis: Option<bool>,
}

impl CaptionRequest {
    pub fn new(photo_data_uri: impl Into<String>, params: &CaptionParams) -> Self {
        Self {
            photo_data_uri: photo_data_uri.into(),
            style: Some(params.style).filter(|s| *s != CaptionStyle::Default),
            language: non_blank(params.language.as_deref()),
            context: non_blank(params.context.as_deref()),
            include_hashtags: params.include_hashtags.then_some(true),
            include_emojis: params.include_emojis.then_some(true),
        }
    }

    pub fn style(&self) -> CaptionStyle {
        self.style.unwrap_or_default()
    }

    pub fn wants_hashtags(&self) -> bool {
        self.include_hashtags.unwrap_or(false)
    }

    /// Instruction text sent to the model next to the image.
    pub fn prompt(&self) -> String {
        let mut parts = vec![
            "You are an expert image captioner. Generate a caption for the image provided."
                .to_string(),
            self.style().instruction().to_string(),
        ];

        if let Some(language) = non_blank(self.language.as_deref()) {
            parts.push(format!("Write the caption in this language: {}.", language));
        }
        if let Some(context) = non_blank(self.context.as_deref()) {
            parts.push(format!("Additional context from the user: {}", context));
        }
        if self.include_emojis.unwrap_or(false) {
            parts.push("Include a few fitting emojis.".to_string());
        } else {
            parts.push("Do not use emojis.".to_string());
        }
        parts.push("Respond with the caption text only, without quotes or hashtags.".to_string());

        parts.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionResult {
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
}

impl CaptionResult {
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            hashtags: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.caption.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptionError {
    #[error("{0}")]
    Generation(String),

    #[error("Caption service returned an invalid response: {0}")]
    InvalidResponseShape(String),
}

/// Anything that can turn an encoded image into a caption.
#[async_trait]
pub trait CaptionClient: Send + Sync {
    async fn generate_caption(&self, request: CaptionRequest) -> Result<CaptionResult, CaptionError>;
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_fields_are_omitted() {
        let params = CaptionParams {
            language: Some("   ".to_string()),
            context: Some(String::new()),
            ..Default::default()
        };
        let request = CaptionRequest::new("data:image/png;base64,AAAA", &params);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"photoDataUri": "data:image/png;base64,AAAA"})
        );
    }

    #[test]
    fn test_chosen_fields_are_sent() {
        let params = CaptionParams {
            style: CaptionStyle::Humorous,
            language: Some(" fr ".to_string()),
            context: Some("birthday party".to_string()),
            include_hashtags: true,
            include_emojis: false,
        };
        let request = CaptionRequest::new("data:image/png;base64,AAAA", &params);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "photoDataUri": "data:image/png;base64,AAAA",
                "style": "humorous",
                "language": "fr",
                "context": "birthday party",
                "includeHashtags": true
            })
        );
        assert!(request.wants_hashtags());
    }

    #[test]
    fn test_prompt_mentions_parameters() {
        let request: CaptionRequest = serde_json::from_value(json!({
            "photoDataUri": "data:image/png;base64,AAAA",
            "style": "social",
            "language": "de",
            "context": "team offsite",
            "includeEmojis": true
        }))
        .unwrap();

        let prompt = request.prompt();
        assert!(prompt.contains("social media"));
        assert!(prompt.contains("language: de"));
        assert!(prompt.contains("team offsite"));
        assert!(prompt.contains("emojis"));
        assert!(!prompt.contains("Do not use emojis"));
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!("Creative".parse::<CaptionStyle>(), Ok(CaptionStyle::Creative));
        assert_eq!("".parse::<CaptionStyle>(), Ok(CaptionStyle::Default));
        assert!("gothic".parse::<CaptionStyle>().is_err());
        assert_eq!(CaptionStyle::Professional.to_string(), "professional");
    }

    #[test]
    fn test_result_validity() {
        assert!(CaptionResult::new("A cat on a windowsill.").is_valid());
        assert!(!CaptionResult::new("  \n").is_valid());
    }
}
