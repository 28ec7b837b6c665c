use url::{ParseError, Url};

pub fn to_url(host: String) -> Result<Url, ParseError> {
    Url::parse(&host)
}

/// Joins a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
