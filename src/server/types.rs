use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{CurrentUser, IdentityProvider};
use crate::core::caption::CaptionClient;
use crate::store::HistoryStore;

#[derive(Clone)]
pub struct AppState {
    pub captioner: Arc<dyn CaptionClient>,
    pub history: Arc<dyn HistoryStore>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub require_auth: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct UploadQuery {
    pub content_type: Option<String>,
    pub style: Option<String>,
    pub language: Option<String>,
    pub context: Option<String>,
    pub hashtags: Option<bool>,
    pub emojis: Option<bool>,
    pub save: Option<bool>,
}

#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SaveImageResponse {
    pub message: String,
    pub id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HashtagsRequest {
    #[serde(default)]
    pub caption: String,
}

#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HashtagsResponse {
    pub hashtags: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FederatedRequest {
    pub id_token: String,
}

#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id_token: String,
    pub user: CurrentUser,
}

#[derive(Serialize, Debug, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
}
