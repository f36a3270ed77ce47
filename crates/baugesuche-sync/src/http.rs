//! Shared HTTP plumbing and the adapter error type.

use std::time::Duration;

use thiserror::Error;
use tracing::info;

/// Everything that can go wrong while acquiring raw rows.
///
/// Callers treat every variant the same way: report the source as
/// unavailable and continue with an empty collection.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("ArcGIS error {code}: {message}")]
    ArcGis { code: i64, message: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("ZIP archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),
    #[error("DBF error: {0}")]
    Dbase(#[from] shapefile::dbase::Error),
    #[error("archive has no {0} member")]
    MissingMember(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response: {0}")]
    Format(String),
}

/// Thin wrapper around a `reqwest::Client` with the adapters' timeout and
/// status handling.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("baugesuche/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` with `query` parameters and return the body as text.
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        let resp = self.send(url, query).await?;
        Ok(resp.text().await?)
    }

    /// GET `url` and return the raw body.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let resp = self.send(url, &[]).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response, SourceError> {
        info!(url = %url, "fetching");
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        Ok(resp)
    }
}

/// Error for a non-success response; long bodies are cut to keep logs readable.
fn status_error(status: reqwest::StatusCode, body: String) -> SourceError {
    const MAX_BODY: usize = 200;
    let body = match body.char_indices().nth(MAX_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body,
    };
    SourceError::Server {
        status: status.as_u16(),
        body: body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_timeout() {
        assert!(HttpClient::new(Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn server_error_message() {
        let err = status_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, "maintenance\n".into());
        assert!(matches!(err, SourceError::Server { status: 503, .. }));
        assert_eq!(err.to_string(), "server returned 503: maintenance");
    }

    #[test]
    fn long_error_bodies_are_cut() {
        let page = "<html>".repeat(100);
        match status_error(reqwest::StatusCode::BAD_GATEWAY, page) {
            SourceError::Server { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.chars().count(), 203);
                assert!(body.ends_with("..."));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }
}
