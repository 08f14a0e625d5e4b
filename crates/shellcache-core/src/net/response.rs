use bytes::Bytes;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// How much of a response the page is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response, fully readable.
    Basic,
    /// Cross-origin response delivered under CORS.
    Cors,
    /// Cross-origin response whose status and body are hidden.
    Opaque,
    /// Synthesized network error.
    Error,
}

impl ResponseType {
    /// Classify a response by comparing where it finally came from against
    /// the origin the app shell is served from.
    pub fn classify(scope: &Url, final_url: &Url) -> Self {
        if scope.origin() == final_url.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

/// Snapshot of a network response: status, headers and the full body.
///
/// Cloning is cheap (the body is reference counted), which is how one copy
/// goes back to the page while another is written to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub url: String,
    pub status: u16,
    #[serde(rename = "type")]
    pub kind: ResponseType,
    #[serde(default)]
    pub redirected: bool,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Bytes,
}

impl Response {
    pub fn new(url: &Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.to_string(),
            status,
            kind: ResponseType::Basic,
            redirected: false,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_kind(mut self, kind: ResponseType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    /// Status in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only plain same-origin 200s are stored at runtime; cross-origin,
    /// opaque and redirected responses pass through untouched.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseType::Basic && !self.redirected
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
