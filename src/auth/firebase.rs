use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{AuthError, CurrentUser, IdentityProvider, SignedIn};

pub const IDENTITY_API_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Identity Toolkit REST client. Calls are blocking `ureq` requests run on
/// tokio's blocking pool.
#[derive(Clone)]
pub struct FirebaseIdentityProvider {
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    refresh_token: Option<String>,
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
}

impl From<TokenResponse> for SignedIn {
    fn from(res: TokenResponse) -> Self {
        SignedIn {
            id_token: res.id_token,
            refresh_token: res.refresh_token,
            user: CurrentUser {
                uid: res.local_id,
                email: res.email,
                display_name: res.display_name.filter(|n| !n.is_empty()),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: String,
}

impl FirebaseIdentityProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: IDENTITY_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T>(&self, endpoint: &str, body: Value) -> Result<T, AuthError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = format!("{}/accounts:{}?key={}", self.base_url, endpoint, self.api_key);
        let endpoint = endpoint.to_string();
        debug!(%endpoint, "identity provider call");

        tokio::task::spawn_blocking(move || post_json(&url, &body))
            .await
            .map_err(|e| AuthError::Provider(format!("identity call for {endpoint} panicked: {e}")))?
    }
}

fn post_json<T: DeserializeOwned>(url: &str, body: &Value) -> Result<T, AuthError> {
    let mut response = ureq::post(url)
        .config()
        .http_status_as_error(false)
        .build()
        .send_json(body)
        .map_err(|e| AuthError::Provider(redact_key(&e)))?;

    if response.status().is_success() {
        return response
            .body_mut()
            .read_json::<T>()
            .map_err(|e| AuthError::Provider(format!("unexpected response: {e}")));
    }

    let status = response.status();
    let text = response.body_mut().read_to_string().unwrap_or_default();
    let code = serde_json::from_str::<ProviderError>(&text)
        .map(|e| e.error.message)
        .unwrap_or(text);
    warn!(%status, %code, "identity provider rejected request");
    Err(map_provider_error(&code))
}

/// Maps Identity Toolkit error codes such as `EMAIL_EXISTS` or
/// `WEAK_PASSWORD : Password should be at least 6 characters`.
fn map_provider_error(message: &str) -> AuthError {
    let code = message.split(" : ").next().unwrap_or(message).trim();
    match code {
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => {
            AuthError::InvalidToken
        }
        "EMAIL_EXISTS"
        | "EMAIL_NOT_FOUND"
        | "INVALID_EMAIL"
        | "INVALID_PASSWORD"
        | "INVALID_LOGIN_CREDENTIALS"
        | "WEAK_PASSWORD"
        | "MISSING_PASSWORD"
        | "USER_DISABLED"
        | "INVALID_IDP_RESPONSE" => AuthError::InvalidCredentials(code.to_string()),
        _ => AuthError::Provider(message.to_string()),
    }
}

/// Form-encoded `postBody` for a Google credential exchange.
fn idp_post_body(google_id_token: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("id_token", google_id_token)
        .append_pair("providerId", "google.com")
        .finish()
}

/// Transport errors can echo the request URL, which carries the API key.
fn redact_key(err: &ureq::Error) -> String {
    let text = err.to_string();
    match text.find("key=") {
        Some(at) => format!("{}key=<redacted>", &text[..at]),
        None => text,
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        let res: TokenResponse = self
            .call(
                "signUp",
                json!({"email": email, "password": password, "returnSecureToken": true}),
            )
            .await?;
        Ok(res.into())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        let res: TokenResponse = self
            .call(
                "signInWithPassword",
                json!({"email": email, "password": password, "returnSecureToken": true}),
            )
            .await?;
        Ok(res.into())
    }

    async fn sign_in_with_google(&self, google_id_token: &str) -> Result<SignedIn, AuthError> {
        let post_body = idp_post_body(google_id_token);
        let res: TokenResponse = self
            .call(
                "signInWithIdp",
                json!({
                    "postBody": post_body,
                    "requestUri": "http://localhost",
                    "returnSecureToken": true,
                    "returnIdpCredential": true
                }),
            )
            .await?;
        Ok(res.into())
    }

    async fn lookup(&self, id_token: &str) -> Result<CurrentUser, AuthError> {
        let res: LookupResponse = self.call("lookup", json!({"idToken": id_token})).await?;
        let user = res.users.into_iter().next().ok_or(AuthError::InvalidToken)?;
        Ok(CurrentUser {
            uid: user.local_id,
            email: user.email,
            display_name: user.display_name.filter(|n| !n.is_empty()),
        })
    }
}
