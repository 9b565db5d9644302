use std::time::Duration;

use reqwest::{redirect, Client, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::core::errors::{PipelineError, Result};

const MAX_REDIRECTS: usize = 10;

/// Raw fetch result for one URL: body bytes plus the HTTP metadata the rest
/// of the pipeline records.
#[derive(Clone, Debug)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub status_code: u16,
    pub content_type: String,
    pub final_url: String,
    /// Every pre-final hop in order, starting with the requested URL.
    /// Empty when no redirect occurred.
    pub redirect_chain: Vec<String>,
}

/// HTTP GET with explicit redirect tracking. Redirects are followed manually
/// so every intermediate URL lands in the chain; the hard cap is 10 hops.
/// Retry policy is deliberately left to callers.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(redirect::Policy::none())
            .user_agent(concat!("webcorpus/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Cheap probe to surface dead hosts before the real GET. Failures here
    /// are advisory only; the GET still decides the URL's fate.
    pub async fn head_check(&self, url: &str) -> Option<u16> {
        let response = self
            .client
            .head(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .ok()?;
        Some(response.status().as_u16())
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        let mut current = Url::parse(url).map_err(|e| PipelineError::Fetch {
            url: url.to_string(),
            message: format!("unparseable URL: {}", e),
        })?;
        let mut chain: Vec<String> = Vec::new();

        if let Some(status) = self.head_check(url).await {
            debug!("head check for {}: {}", url, status);
        }

        loop {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| classify_transport_error(url, e))?;

            let status = response.status();
            if status.is_redirection() {
                if chain.len() >= MAX_REDIRECTS {
                    return Err(PipelineError::Fetch {
                        url: url.to_string(),
                        message: format!("redirect chain exceeded {} hops", MAX_REDIRECTS),
                    });
                }
                let location = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| PipelineError::Fetch {
                        url: url.to_string(),
                        message: format!("redirect {} without Location header", status),
                    })?;
                let next = current.join(location).map_err(|e| PipelineError::Fetch {
                    url: url.to_string(),
                    message: format!("bad redirect target '{}': {}", location, e),
                })?;
                debug!("redirect {} -> {}", current, next);
                chain.push(current.to_string());
                current = next;
                continue;
            }

            if status.as_u16() >= StatusCode::BAD_REQUEST.as_u16() {
                return Err(PipelineError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("text/html")
                .to_string();
            let final_url = current.to_string();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| classify_transport_error(url, e))?
                .to_vec();

            info!(
                "fetched {} ({} bytes, {} hops, status {})",
                url,
                bytes.len(),
                chain.len(),
                status.as_u16()
            );

            return Ok(FetchedDocument {
                bytes,
                status_code: status.as_u16(),
                content_type,
                final_url,
                redirect_chain: chain,
            });
        }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_transport_error(url: &str, err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout {
            url: url.to_string(),
        }
    } else {
        PipelineError::Fetch {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
