//! HTTP client for a running captionator server.
//!
//! Implements the same traits as the server-side backends, so the CLI drives
//! a [`crate::core::session::CaptionSession`] against a remote server.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::auth::{AuthError, CurrentUser, IdentityProvider, SignedIn};
use crate::core::caption::{CaptionClient, CaptionError, CaptionRequest, CaptionResult};
use crate::server::types::{
    CredentialsRequest, ErrorResponse, FederatedRequest, HashtagsRequest, HashtagsResponse,
    SaveImageResponse, SessionResponse,
};
use crate::store::{HistoryRecord, HistoryStore, NewHistoryRecord, StoreError};
use crate::utils::urls::join_url;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("{} {}", status, text.trim()));
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = join_url(&self.base_url, path);
        debug!(%url, "POST");
        self.send(self.client.post(url).json(body)).await
    }

    pub async fn hashtags(&self, caption: &str) -> Result<Vec<String>, ClientError> {
        let res: HashtagsResponse = self
            .post(
                "/api/hashtags",
                &HashtagsRequest {
                    caption: caption.to_string(),
                },
            )
            .await?;
        Ok(res.hashtags)
    }

    async fn session(&self, path: &str, body: &impl Serialize) -> Result<SignedIn, AuthError> {
        let res: SessionResponse = self.post(path, body).await.map_err(auth_error)?;
        Ok(SignedIn {
            id_token: res.id_token,
            refresh_token: None,
            user: res.user,
        })
    }
}

fn auth_error(err: ClientError) -> AuthError {
    match err {
        ClientError::Status { status: 401, message } => AuthError::InvalidCredentials(message),
        ClientError::Status { status: 503, .. } => AuthError::NotConfigured,
        other => AuthError::Provider(other.to_string()),
    }
}

#[async_trait]
impl CaptionClient for ApiClient {
    async fn generate_caption(
        &self,
        request: CaptionRequest,
    ) -> Result<CaptionResult, CaptionError> {
        match self.post::<_, CaptionResult>("/api/caption", &request).await {
            Ok(result) => Ok(result),
            Err(ClientError::Decode(message)) => Err(CaptionError::InvalidResponseShape(message)),
            Err(err) => Err(CaptionError::Generation(err.to_string())),
        }
    }
}

#[async_trait]
impl HistoryStore for ApiClient {
    async fn save(&self, record: NewHistoryRecord) -> Result<String, StoreError> {
        match self.post::<_, SaveImageResponse>("/api/images", &record).await {
            Ok(res) => Ok(res.id),
            Err(ClientError::Status { status: 400, .. }) => Err(StoreError::MissingImageData),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    async fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let url = join_url(&self.base_url, "/api/images");
        self.send(self.client.get(url).query(&[("limit", limit)]))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for ApiClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        let body = CredentialsRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.session("/api/auth/signup", &body).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        let body = CredentialsRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.session("/api/auth/login", &body).await
    }

    async fn sign_in_with_google(&self, google_id_token: &str) -> Result<SignedIn, AuthError> {
        let body = FederatedRequest {
            id_token: google_id_token.to_string(),
        };
        self.session("/api/auth/federated", &body).await
    }

    async fn lookup(&self, id_token: &str) -> Result<CurrentUser, AuthError> {
        let url = join_url(&self.base_url, "/api/auth/me");
        let request = self.client.get(url).bearer_auth(id_token);
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.without_url().to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(AuthError::InvalidToken),
            StatusCode::SERVICE_UNAVAILABLE => Err(AuthError::NotConfigured),
            status if status.is_success() => response
                .json::<CurrentUser>()
                .await
                .map_err(|e| AuthError::Provider(e.to_string())),
            status => Err(AuthError::Provider(format!("unexpected status {}", status))),
        }
    }
}
