use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use regex::Regex;
use reqwest::{Method, StatusCode, Url, header};
use tracing::{debug, instrument};

use crate::config::RepositoryConfig;
use crate::error::{FetchError, ListError};
use crate::events::ImagePayload;

use super::{decode_id, encode_id};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

const HREF_PATTERN: &str = r"href>(/[^<]+)";

/// WebDAV collection such as a Nextcloud folder.
#[derive(Debug, Clone)]
pub struct RemoteShare {
    base: Url,
    credentials: Option<(String, String)>,
    client: reqwest::Client,
    href: Regex,
}

impl RemoteShare {
    pub fn from_config(cfg: &RepositoryConfig) -> Result<Self> {
        let base = Url::parse(cfg.path.trim())
            .with_context(|| format!("invalid share URL {:?}", cfg.path))?;
        let credentials = cfg
            .credentials()
            .map(|(user, pass)| (user.to_string(), pass.to_string()));
        Self::new(base, credentials)
    }

    pub fn new(base: Url, credentials: Option<(String, String)>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build share HTTP client")?;
        Ok(Self {
            base,
            credentials,
            client,
            href: Regex::new(HREF_PATTERN)?,
        })
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match &self.credentials {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    #[instrument(skip(self), fields(base = %self.base))]
    pub async fn list(&self) -> Result<Vec<String>, ListError> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|err| ListError::Network(err.to_string()))?;
        let response = self
            .request(method, self.base.clone())
            .header("Depth", "1")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ListError::Network(format!("share answered {status}")));
        }
        let body = response.text().await?;
        let ids = parse_listing(&self.href, &body, self.base.path());
        debug!(count = ids.len(), "parsed share listing");
        if ids.is_empty() {
            return Err(ListError::Empty(self.base.to_string()));
        }
        Ok(ids)
    }

    /// GET `base + id` and wrap the body in a data URI carrying the
    /// server-declared content type.
    pub async fn fetch(&self, id: &str) -> Result<ImagePayload, FetchError> {
        let url = self.file_url(id)?;
        let response = self.request(Method::GET, url.clone()).send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Auth {
                    status: response.status().as_u16(),
                });
            }
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(url.to_string())),
            status if !status.is_success() => {
                return Err(FetchError::Network(format!("{url} answered {status}")));
            }
            _ => {}
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        debug!(%url, bytes = body.len(), %content_type, "fetched share image");
        Ok(ImagePayload::DataUri(format!(
            "data:{content_type};base64,{}",
            STANDARD.encode(body)
        )))
    }

    fn file_url(&self, id: &str) -> Result<Url, FetchError> {
        let mut raw = self.base.to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        raw.push_str(decode_id(id).trim_start_matches('/'));
        Url::parse(&raw).map_err(|err| FetchError::NotFound(format!("{raw}: {err}")))
    }
}

/// Extract entry ids from a multistatus body.
///
/// The first href is the queried collection itself and is dropped.
/// Sub-collections (hrefs ending in `/`) are skipped.
fn parse_listing(href: &Regex, body: &str, base_path: &str) -> Vec<String> {
    href.captures_iter(body)
        .skip(1)
        .filter_map(|caps| {
            let href = caps.get(1)?.as_str();
            let rest = href.strip_prefix(base_path).unwrap_or(href);
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() || rest.ends_with('/') {
                None
            } else {
                Some(encode_id(rest))
            }
        })
        .collect()
}
