//! reqwest-backed network access.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use tracing::debug;

use super::{Fetch, FetchError, Request, Response, ResponseType};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP fetcher bound to the origin the app shell is served from.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    scope: Url,
}

impl HttpFetcher {
    pub fn new(scope: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, scope })
    }

    fn header_map(request: &Request) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        for (name, value) in &request.headers {
            match (
                header::HeaderName::from_bytes(name.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => debug!(header = %name, "Dropping malformed request header"),
            }
        }
        headers
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(Self::header_map(request))
            .send()
            .await?;

        let final_url = response.url().clone();
        let redirected = {
            let mut requested = request.url.clone();
            requested.set_fragment(None);
            requested != final_url
        };
        let kind = ResponseType::classify(&self.scope, &final_url);
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?;

        debug!(url = %final_url, status = status, kind = ?kind, redirected = redirected, "Network response");

        Ok(Response {
            url: final_url.to_string(),
            status,
            kind,
            redirected,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn reply(path: &str) -> String {
        match path {
            "/app/old" => "HTTP/1.1 301 Moved Permanently\r\nLocation: /app/new\r\n\
                           Content-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
            "/app/index.html" | "/app/new" => {
                let body = format!("served {}", path);
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\
                     Connection: close\r\n\r\n{}",
                    body.len(),
                    body
                )
            }
            _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        }
    }

    /// Minimal HTTP/1.1 server on an ephemeral port. Returns its base URL.
    async fn serve() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head).into_owned();
                    let path = head.split_whitespace().nth(1).unwrap_or("/");
                    let _ = socket.write_all(reply(path).as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    fn fetcher(scope: &Url) -> HttpFetcher {
        HttpFetcher::new(scope.clone(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_same_origin_ok_is_basic() {
        let base = serve().await;
        let url = base.join("/app/index.html#main").unwrap();

        let response = fetcher(&base).fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.kind, ResponseType::Basic);
        assert!(!response.redirected);
        assert!(response.is_cacheable());
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.text(), "served /app/index.html");
    }

    #[tokio::test]
    async fn test_followed_redirect_is_marked_and_not_cacheable() {
        let base = serve().await;
        let url = base.join("/app/old").unwrap();

        let response = fetcher(&base).fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(response.redirected);
        assert!(response.url.ends_with("/app/new"));
        assert_eq!(response.text(), "served /app/new");
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_other_port_is_cors() {
        let base = serve().await;
        let scope = Url::parse("http://127.0.0.1:1/").unwrap();
        let url = base.join("/app/index.html").unwrap();

        let response = fetcher(&scope).fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.kind, ResponseType::Cors);
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let base = serve().await;
        let url = base.join("/app/missing").unwrap();

        let response = fetcher(&base).fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.ok());
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        drop(listener);

        let err = fetcher(&base)
            .fetch(&Request::get(base.join("/app/").unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
