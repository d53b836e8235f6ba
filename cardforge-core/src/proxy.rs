//! Proxy Client - The Search/Normalize Endpoint Collaborator
//!
//! The proxy forwards `?query=<text>&type=<kind>` to the upstream catalogs
//! and passes their native payloads through untouched. Normalization is the
//! provider layer's job, not the proxy's.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::schema::ContentType;

const USER_AGENT: &str = concat!("cardforge/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid proxy endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Proxy returned status {0}")]
    Status(u16),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ProxyError::Status(status.as_u16()),
            None => ProxyError::Network(err.to_string()),
        }
    }
}

/// The `type` parameter of a proxy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Movie,
    Tv,
    Game,
    Anime,
    Manga,
    Book,
    GameDetails,
    GameCover,
    ImageProxy,
    Translate,
}

impl ProxyKind {
    pub fn as_param(&self) -> &'static str {
        match self {
            ProxyKind::Movie => "movie",
            ProxyKind::Tv => "tv",
            ProxyKind::Game => "game",
            ProxyKind::Anime => "anime",
            ProxyKind::Manga => "manga",
            ProxyKind::Book => "book",
            ProxyKind::GameDetails => "game_details",
            ProxyKind::GameCover => "game_cover",
            ProxyKind::ImageProxy => "image_proxy",
            ProxyKind::Translate => "translate",
        }
    }

    /// Search kind for a content type. Manual cards have no catalog.
    pub fn search_for(content_type: ContentType) -> Option<ProxyKind> {
        match content_type {
            ContentType::Movie => Some(ProxyKind::Movie),
            ContentType::Tv => Some(ProxyKind::Tv),
            ContentType::Game => Some(ProxyKind::Game),
            ContentType::Anime => Some(ProxyKind::Anime),
            ContentType::Manga => Some(ProxyKind::Manga),
            ContentType::Book => Some(ProxyKind::Book),
            ContentType::Manual => None,
        }
    }
}

pub trait ProxyClient {
    /// Raw response body for `kind`/`query`.
    fn fetch(&self, kind: ProxyKind, query: &str) -> Result<Vec<u8>, ProxyError>;

    /// Parse the body as JSON. `{"error": ...}` bodies become `Upstream`.
    fn fetch_json(&self, kind: ProxyKind, query: &str) -> Result<Value, ProxyError> {
        let body = self.fetch(kind, query)?;
        let value: Value = serde_json::from_slice(&body)?;
        if let Some(err) = value.get("error") {
            let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
            return Err(ProxyError::Upstream(message));
        }
        Ok(value)
    }
}

/// Blocking HTTP client for the proxy endpoint.
pub struct HttpProxy {
    endpoint: Url,
    client: reqwest::blocking::Client,
}

impl HttpProxy {
    pub fn new(endpoint: &str) -> Result<Self, ProxyError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProxyError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { endpoint, client })
    }

    pub fn request_url(&self, kind: ProxyKind, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("type", kind.as_param());
        url
    }
}

impl ProxyClient for HttpProxy {
    fn fetch(&self, kind: ProxyKind, query: &str) -> Result<Vec<u8>, ProxyError> {
        let url = self.request_url(kind, query);
        tracing::debug!(kind = kind.as_param(), %url, "proxy request");

        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

/// In-memory proxy answering from registered responses. Unregistered
/// requests fail with status 404. Used offline and in tests.
#[derive(Default)]
pub struct MemoryProxy {
    responses: HashMap<(ProxyKind, String), Vec<u8>>,
    calls: RefCell<Vec<(ProxyKind, String)>>,
}

impl MemoryProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, kind: ProxyKind, query: &str, body: Value) -> Self {
        self.responses.insert((kind, query.to_string()), body.to_string().into_bytes());
        self
    }

    pub fn with_bytes(mut self, kind: ProxyKind, query: &str, body: Vec<u8>) -> Self {
        self.responses.insert((kind, query.to_string()), body);
        self
    }

    /// Every request seen so far, in order.
    pub fn calls(&self) -> Vec<(ProxyKind, String)> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self, kind: ProxyKind) -> usize {
        self.calls.borrow().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl ProxyClient for MemoryProxy {
    fn fetch(&self, kind: ProxyKind, query: &str) -> Result<Vec<u8>, ProxyError> {
        self.calls.borrow_mut().push((kind, query.to_string()));
        self.responses
            .get(&(kind, query.to_string()))
            .cloned()
            .ok_or(ProxyError::Status(404))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_url_encodes_query() {
        let proxy = HttpProxy::new("http://localhost:8080/proxy.php").unwrap();
        let url = proxy.request_url(ProxyKind::GameDetails, "the witcher 3");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/proxy.php?query=the+witcher+3&type=game_details"
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(HttpProxy::new("not a url"), Err(ProxyError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_error_body_is_upstream_failure() {
        let proxy = MemoryProxy::new().with_json(
            ProxyKind::Translate,
            "hi",
            json!({"error": "Translation failed"}),
        );
        let err = proxy.fetch_json(ProxyKind::Translate, "hi").unwrap_err();
        assert!(matches!(err, ProxyError::Upstream(m) if m == "Translation failed"));
    }

    #[test]
    fn test_memory_proxy_records_calls() {
        let proxy = MemoryProxy::new();
        assert!(matches!(proxy.fetch(ProxyKind::Book, "dune"), Err(ProxyError::Status(404))));
        assert_eq!(proxy.calls(), vec![(ProxyKind::Book, "dune".to_string())]);
        assert_eq!(proxy.call_count(ProxyKind::Movie), 0);
    }

    #[test]
    fn test_manual_has_no_catalog() {
        assert_eq!(ProxyKind::search_for(ContentType::Manual), None);
        assert_eq!(ProxyKind::search_for(ContentType::Manga), Some(ProxyKind::Manga));
    }
}
