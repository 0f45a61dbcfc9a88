//! HTTP retrieval of the camera still image.
//!
//! A non-2xx status is not an error here: the response is handed back
//! as-is so the caller can decide based on its content type.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use crate::error::CaptureError;

/// A response received from the camera.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status_code: u16,
    /// Status line as sent, e.g. `200 OK`.
    pub status: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Source of still images.
pub trait Fetch {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, CaptureError>;
}

/// Blocking HTTP fetcher; the connection pool lives as long as the fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Cannot create HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, CaptureError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| CaptureError::Network(e.to_string()))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = resp
            .bytes()
            .map_err(|e| CaptureError::Network(format!("reading body: {e}")))?
            .to_vec();
        debug!("GET {url} → {status} ({} bytes)", body.len());

        Ok(FetchResponse {
            status_code: status.as_u16(),
            status: status.to_string(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve a single raw HTTP response on a loopback port.
    fn serve_once(response: Vec<u8>, hold: Duration) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            std::thread::sleep(hold);
            stream.write_all(&response).ok();
        });
        Url::parse(&format!("http://{addr}/snapshot")).unwrap()
    }

    /// Loopback requests must not be routed through a proxy from the environment.
    fn fetcher(timeout: Duration) -> HttpFetcher {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .unwrap();
        HttpFetcher { client }
    }

    fn response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_fetch_ok() {
        let url = serve_once(response("200 OK", "image/png", b"pngdata"), Duration::ZERO);
        let fetcher = fetcher(Duration::from_secs(5));
        let resp = fetcher.fetch(&url).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.status, "200 OK");
        assert_eq!(resp.content_type.as_deref(), Some("image/png"));
        assert_eq!(resp.body, b"pngdata");
        assert!(resp.is_success());
    }

    #[test]
    fn test_fetch_non_success_is_not_an_error() {
        let url = serve_once(
            response("404 Not Found", "text/html", b"<h1>nope</h1>"),
            Duration::ZERO,
        );
        let fetcher = fetcher(Duration::from_secs(5));
        let resp = fetcher.fetch(&url).unwrap();
        assert_eq!(resp.status_code, 404);
        assert_eq!(resp.content_type.as_deref(), Some("text/html"));
        assert!(!resp.is_success());
    }

    #[test]
    fn test_fetch_timeout() {
        let url = serve_once(
            response("200 OK", "image/png", b"late"),
            Duration::from_secs(3),
        );
        let fetcher = fetcher(Duration::from_millis(200));
        let err = fetcher.fetch(&url).unwrap_err();
        assert!(matches!(err, CaptureError::Network(_)));
    }
}
