use crate::utils::get_env::env_var_to_vec;
use crate::utils::urls::to_url;
use axum::extract::ConnectInfo;
use axum::http::Request;
use std::net::SocketAddr;
use tower_governor::GovernorError;
use tower_governor::key_extractor::KeyExtractor;

/// Rate-limit key: the client IP. Request headers are caller-controlled and
/// are never part of the key.
#[derive(Clone)]
pub struct ClientIpExtractor;

impl KeyExtractor for ClientIpExtractor {
    type Key = String;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|addr| format!("ip:{}", addr.0.ip()))
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

pub fn whitelisted_urls() -> Vec<String> {
    env_var_to_vec("WHITELISTED_HOSTS")
}

/// Whether an `Origin` value names one of the allowed hosts. Scheme and port
/// are ignored.
pub fn is_whitelisted(origin: Option<String>, whitelisted_domains: &[String]) -> bool {
    origin
        .and_then(|origin| to_url(origin).ok())
        .and_then(|url| url.host_str().map(String::from))
        .is_some_and(|host| whitelisted_domains.contains(&host))
}

#[cfg(test)]
mod cfg_tests {
    use super::*;
    use axum::body::Body;

    #[test]
    pub fn test_whitelisted_function() {
        let whitelisted_domains = vec![
            String::from("captions.example.com"),
            String::from("localhost"),
        ];

        assert!(is_whitelisted(
            Some("http://captions.example.com".to_string()),
            &whitelisted_domains
        ));
        assert!(is_whitelisted(
            Some("http://localhost:5173".to_string()),
            &whitelisted_domains
        ));
        assert!(is_whitelisted(
            Some("https://localhost".to_string()),
            &whitelisted_domains
        ));
        assert!(!is_whitelisted(
            Some("https://evil.example.org".to_string()),
            &whitelisted_domains
        ));
        assert!(!is_whitelisted(Some("not a url".to_string()), &whitelisted_domains));
        assert!(!is_whitelisted(None, &whitelisted_domains));

        unsafe {
            std::env::set_var("WHITELISTED_HOSTS", "app.example.com, studio.example.com");
        }

        let whitelisted_domains = whitelisted_urls();
        assert!(is_whitelisted(
            Some("https://studio.example.com".to_string()),
            &whitelisted_domains
        ));
        assert!(!is_whitelisted(
            Some("https://localhost".to_string()),
            &whitelisted_domains
        ));
    }

    #[test]
    pub fn test_key_ignores_bearer_token() {
        let addr: SocketAddr = "10.0.0.7:41000".parse().unwrap();

        let mut req = Request::builder()
            .header("authorization", "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(ClientIpExtractor.extract(&req).unwrap(), "ip:10.0.0.7");

        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(ClientIpExtractor.extract(&req).unwrap(), "ip:10.0.0.7");

        let req = Request::builder().body(Body::empty()).unwrap();
        assert!(ClientIpExtractor.extract(&req).is_err());
    }
}
