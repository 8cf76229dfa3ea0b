// Camera snapshot retrieval
//
// The hub has no single contractual snapshot endpoint, so the fetcher walks
// an ordered list of URL templates and takes the first response that looks
// like an image. "Looks like" is a size threshold: small bodies are treated
// as error pages. This is a best-effort heuristic, not image validation.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Token;
use crate::error::Error;

/// Snapshot URL conventions known to work on Scrypted hubs, tried in order.
///
/// Placeholders: `{host}` (hub base URL, no trailing slash), `{token}`, `{id}`.
pub const DEFAULT_SNAPSHOT_TEMPLATES: &[&str] = &[
    "{host}/endpoint/@scrypted/core/api/{token}/device/{id}/Camera.getSnapshot",
    "{host}/endpoint/@scrypted/snapshot/public/{id}",
];

/// Bodies at or below this many bytes are taken for error pages.
pub const DEFAULT_MIN_SNAPSHOT_BYTES: usize = 100;

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// A fetched camera image.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub content_type: String,
    pub data: Bytes,
}

/// Walks snapshot URL templates against the hub.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    http: reqwest::Client,
    base_url: Url,
    templates: Vec<String>,
    min_bytes: usize,
    attempt_timeout: Duration,
}

impl SnapshotFetcher {
    /// Fetcher with the default templates, threshold and a 10s per-attempt timeout.
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            templates: DEFAULT_SNAPSHOT_TEMPLATES
                .iter()
                .map(|t| (*t).to_owned())
                .collect(),
            min_bytes: DEFAULT_MIN_SNAPSHOT_BYTES,
            attempt_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_templates(mut self, templates: Vec<String>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    /// Try each template in order; return the first plausible image.
    ///
    /// Exhausting the list yields [`Error::SnapshotUnavailable`].
    pub async fn fetch(&self, device_id: &str, token: &Token) -> Result<Snapshot, Error> {
        for template in &self.templates {
            let url = self.render(template, device_id, token);
            match self.try_fetch(&url, token).await {
                Ok(Some(snapshot)) => {
                    debug!(device_id, bytes = snapshot.data.len(), "snapshot fetched");
                    return Ok(snapshot);
                }
                Ok(None) => {}
                Err(e) => {
                    // Rendered URLs may embed the token; errors carry none.
                    debug!(device_id, template = %template, error = %e, "snapshot attempt failed");
                }
            }
        }

        Err(Error::SnapshotUnavailable {
            device_id: device_id.to_owned(),
            attempts: self.templates.len(),
        })
    }

    async fn try_fetch(&self, url: &str, token: &Token) -> Result<Option<Snapshot>, Error> {
        let resp = self
            .http
            .get(url)
            .header(header::COOKIE, token.cookie_header())
            .timeout(self.attempt_timeout)
            .send()
            .await
            .map_err(redact_url)?;

        let status = resp.status();
        if !status.is_success() {
            trace!(status = status.as_u16(), "snapshot attempt returned error status");
            return Ok(None);
        }

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();

        let data = resp.bytes().await.map_err(redact_url)?;
        if data.len() <= self.min_bytes {
            trace!(bytes = data.len(), min = self.min_bytes, "snapshot body too small");
            return Ok(None);
        }

        Ok(Some(Snapshot { content_type, data }))
    }

    fn render(&self, template: &str, device_id: &str, token: &Token) -> String {
        let host = self.base_url.as_str().trim_end_matches('/');
        template
            .replace("{host}", host)
            .replace("{token}", token.expose())
            .replace("{id}", device_id)
    }
}

/// Strip the request URL from a transport error. Snapshot URLs may embed
/// the login token.
fn redact_url(err: reqwest::Error) -> Error {
    Error::Transport(err.without_url())
}
