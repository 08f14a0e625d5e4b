use std::fmt;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

/// What kind of resource the page asked for.
///
/// Only `Document` changes behavior: a failed navigation is answered with
/// the offline fallback page instead of no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Font,
    Image,
    Manifest,
    #[default]
    Empty,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Empty,
            headers: Vec::new(),
        }
    }

    /// A top-level page navigation.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.as_str(), &self.url)
    }
}

/// Normalized request identity used as the cache key.
///
/// The URL fragment never reaches the network, so it is dropped here too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Rebuild a plain request for this key (used when refreshing entries).
    pub fn to_request(&self) -> Result<Request, String> {
        let url = Url::parse(&self.url).map_err(|e| format!("{}: {}", self.url, e))?;
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|e| format!("{}: {}", self.method, e))?;
        Ok(Request::get(url).with_method(method))
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_drops_fragment() {
        let url = Url::parse("https://app.test/app/index.html#top").unwrap();
        let key = Request::get(url).key();
        assert_eq!(key.url, "https://app.test/app/index.html");
        assert_eq!(key.method, "GET");
    }

    #[test]
    fn test_key_keeps_query() {
        let a = Url::parse("https://app.test/app/data?x=1").unwrap();
        let b = Url::parse("https://app.test/app/data?x=2").unwrap();
        assert_ne!(Request::get(a).key(), Request::get(b).key());
    }

    #[test]
    fn test_key_round_trips_to_request() {
        let url = Url::parse("https://app.test/app/app.js").unwrap();
        let key = Request::get(url.clone()).key();
        let rebuilt = key.to_request().unwrap();
        assert_eq!(rebuilt.url, url);
        assert!(rebuilt.is_get());
        assert_eq!(rebuilt.destination, Destination::Empty);
    }

    #[test]
    fn test_key_display() {
        let url = Url::parse("https://app.test/").unwrap();
        let key = Request::get(url).with_method(Method::POST).key();
        assert_eq!(key.to_string(), "POST https://app.test/");
    }
}
