//! HTTP client for the Graph API.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;
use crate::models::{Comment, ErrorEnvelope, Page, Post, ReplyReceipt};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0/";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct GraphClientConfig {
    /// API root, e.g. `https://graph.facebook.com/v19.0/`.
    pub base_url: String,
    /// Per-request timeout. Every call carries one.
    pub request_timeout: Duration,
    /// Upper bound on comment pages fetched per post.
    pub max_comment_pages: usize,
    /// Items requested per page.
    pub page_size: u32,
}

impl Default for GraphClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            max_comment_pages: 5,
            page_size: 100,
        }
    }
}

/// Graph API client.
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: Client,
    base_url: Url,
    config: GraphClientConfig,
}

impl GraphClient {
    pub fn new(config: GraphClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: GraphClientConfig) -> Result<Self, ApiError> {
        let base_url = parse_base_url(&config.base_url)?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &GraphClientConfig {
        &self.config
    }

    /// `GET {page_id}/posts`
    pub async fn list_posts(&self, page_id: &str, token: &str) -> Result<Vec<Post>, ApiError> {
        let url = self.endpoint(&format!("{page_id}/posts"))?;
        let limit = self.config.page_size.to_string();
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("fields", "id,message,created_time"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let page: Page<Post> = decode(response).await?;
        debug!(page_id, count = page.data.len(), "Fetched posts");
        Ok(page.data)
    }

    /// `GET {post_id}/comments`, following `after` cursors up to
    /// `max_comment_pages` pages.
    pub async fn list_comments(
        &self,
        post_id: &str,
        token: &str,
    ) -> Result<Vec<Comment>, ApiError> {
        let url = self.endpoint(&format!("{post_id}/comments"))?;
        let limit = self.config.page_size.to_string();
        let mut comments = Vec::new();
        let mut after: Option<String> = None;

        for page_index in 0..self.config.max_comment_pages.max(1) {
            let mut request = self
                .client
                .get(url.clone())
                .bearer_auth(token)
                .query(&[
                    ("fields", "id,message,from,created_time,attachment"),
                    ("limit", limit.as_str()),
                ]);
            if let Some(cursor) = after.as_deref() {
                request = request.query(&[("after", cursor)]);
            }

            let page: Page<Comment> = decode(request.send().await?).await?;
            after = page.next_cursor();
            comments.extend(page.data);

            if after.is_none() {
                break;
            }
            if page_index + 1 == self.config.max_comment_pages {
                debug!(post_id, "Comment page limit reached, remaining pages skipped");
            }
        }

        Ok(comments)
    }

    /// `POST {comment_id}/comments`
    pub async fn reply_to_comment(
        &self,
        comment_id: &str,
        message: &str,
        token: &str,
    ) -> Result<ReplyReceipt, ApiError> {
        let url = self.endpoint(&format!("{comment_id}/comments"))?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .form(&[("message", message)])
            .send()
            .await?;

        decode(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return Ok(serde_json::from_str(&body)?);
    }

    Err(api_error(status.as_u16(), &body))
}

fn api_error(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ApiError::Api {
            status,
            message: envelope.error.message,
            code: envelope.error.code,
        },
        Err(_) => {
            warn!(status, "Graph API returned a non-JSON error body");
            ApiError::Api {
                status,
                message: body.chars().take(200).collect(),
                code: None,
            }
        }
    }
}
