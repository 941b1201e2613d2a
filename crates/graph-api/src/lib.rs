//! Client for the page/post/comment Graph API.
//!
//! Exposes the three calls the reply engine needs:
//! - listing the posts of a page
//! - listing the comments of a post (cursor pagination, bounded page count)
//! - posting a reply to a comment

pub mod client;
pub mod error;
pub mod models;

pub use client::{GraphClient, GraphClientConfig};
pub use error::ApiError;
pub use models::{Attachment, Comment, CommentAuthor, Post, ReplyReceipt};
