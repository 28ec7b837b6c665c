use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use super::{AuthError, CurrentUser, IdentityProvider, SignedIn};

/// Holds the signed-in user, if any, and lets callers watch it change.
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<Option<SignedIn>>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(None);
        Self { provider, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SignedIn>> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.state.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn id_token(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|s| s.id_token.clone())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, AuthError> {
        let signed = self.provider.sign_in(email, password).await?;
        Ok(self.replace(signed))
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<CurrentUser, AuthError> {
        let signed = self.provider.sign_up(email, password).await?;
        Ok(self.replace(signed))
    }

    pub async fn login_with_google(&self, google_id_token: &str) -> Result<CurrentUser, AuthError> {
        let signed = self.provider.sign_in_with_google(google_id_token).await?;
        Ok(self.replace(signed))
    }

    /// Adopts a token obtained elsewhere after checking it with the provider.
    pub async fn resume(&self, id_token: &str) -> Result<CurrentUser, AuthError> {
        let user = self.provider.lookup(id_token).await?;
        Ok(self.replace(SignedIn {
            id_token: id_token.to_string(),
            refresh_token: None,
            user,
        }))
    }

    fn replace(&self, signed: SignedIn) -> CurrentUser {
        let user = signed.user.clone();
        info!(uid = %user.uid, "signed in");
        self.state.send_replace(Some(signed));
        user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProvider;

    fn ada() -> CurrentUser {
        CurrentUser {
            uid: "uid-ada".to_string(),
            email: Some("ada@example.com".to_string()),
            display_name: None,
        }
    }

    #[async_trait]
    impl IdentityProvider for FixedProvider {
        async fn sign_up(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
            self.sign_in(email, password).await
        }

        async fn sign_in(&self, _email: &str, password: &str) -> Result<SignedIn, AuthError> {
            if password != "hunter22" {
                return Err(AuthError::InvalidCredentials("INVALID_PASSWORD".to_string()));
            }
            Ok(SignedIn {
                id_token: "id-token-1".to_string(),
                refresh_token: None,
                user: ada(),
            })
        }

        async fn sign_in_with_google(&self, _token: &str) -> Result<SignedIn, AuthError> {
            Err(AuthError::NotConfigured)
        }

        async fn lookup(&self, id_token: &str) -> Result<CurrentUser, AuthError> {
            match id_token {
                "id-token-1" => Ok(ada()),
                _ => Err(AuthError::InvalidToken),
            }
        }
    }

    #[tokio::test]
    async fn test_login_is_observed() {
        let session = AuthSession::new(Arc::new(FixedProvider));
        let mut rx = session.subscribe();
        assert!(rx.borrow_and_update().is_none());

        session.login("ada@example.com", "hunter22").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().map(|s| s.user.clone()), Some(ada()));
        assert_eq!(session.id_token().as_deref(), Some("id-token-1"));

        session.login_with_google("google").await.unwrap_err();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(session.current_user(), Some(ada()));
    }

    #[tokio::test]
    async fn test_register_signs_in() {
        let session = AuthSession::new(Arc::new(FixedProvider));
        let user = session.register("ada@example.com", "hunter22").await.unwrap();
        assert_eq!(user, ada());
        assert_eq!(session.id_token().as_deref(), Some("id-token-1"));
    }

    #[tokio::test]
    async fn test_failed_login_keeps_previous_state() {
        let session = AuthSession::new(Arc::new(FixedProvider));
        session.login("ada@example.com", "hunter22").await.unwrap();

        let err = session.login("ada@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials(_)));
        assert_eq!(session.current_user(), Some(ada()));
    }

    #[tokio::test]
    async fn test_resume_checks_token() {
        let session = AuthSession::new(Arc::new(FixedProvider));
        assert_eq!(session.resume("bogus").await, Err(AuthError::InvalidToken));
        assert_eq!(session.current_user(), None);

        session.resume("id-token-1").await.unwrap();
        assert_eq!(session.current_user(), Some(ada()));
    }
}
