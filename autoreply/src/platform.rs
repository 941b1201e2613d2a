//! Platform API seam.
//!
//! The engine talks to the social platform only through [`PlatformApi`], so
//! the Graph client can be swapped for a scripted fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use graph_api::{ApiError, GraphClient};

use crate::domain::{AccessToken, IncomingComment};

/// A post as needed by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformPost {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Most recent posts of a page, newest first.
    async fn list_posts(
        &self,
        page_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<PlatformPost>, ApiError>;

    /// Comments of a post, following pagination up to a fixed page bound.
    async fn list_comments(
        &self,
        post_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<IncomingComment>, ApiError>;

    /// Post a reply and return the new comment id.
    async fn reply_to_comment(
        &self,
        comment_id: &str,
        message: &str,
        token: &AccessToken,
    ) -> Result<String, ApiError>;
}

#[async_trait]
impl PlatformApi for GraphClient {
    async fn list_posts(
        &self,
        page_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<PlatformPost>, ApiError> {
        let posts = GraphClient::list_posts(self, page_id, token.expose()).await?;
        Ok(posts
            .into_iter()
            .map(|p| PlatformPost {
                id: p.id,
                created_at: p.created_time,
            })
            .collect())
    }

    async fn list_comments(
        &self,
        post_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<IncomingComment>, ApiError> {
        let comments = GraphClient::list_comments(self, post_id, token.expose()).await?;
        Ok(comments
            .into_iter()
            .map(|c| IncomingComment::from_platform(post_id, c))
            .collect())
    }

    async fn reply_to_comment(
        &self,
        comment_id: &str,
        message: &str,
        token: &AccessToken,
    ) -> Result<String, ApiError> {
        let receipt =
            GraphClient::reply_to_comment(self, comment_id, message, token.expose()).await?;
        Ok(receipt.id)
    }
}
