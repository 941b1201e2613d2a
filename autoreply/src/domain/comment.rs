//! Inbound comment as seen by the pipeline.

use chrono::{DateTime, Utc};

/// Platform-neutral view of a fetched comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingComment {
    pub id: String,
    pub post_id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub has_media: bool,
}

impl IncomingComment {
    pub fn new(id: impl Into<String>, post_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            post_id: post_id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.author_id = Some(id.into());
        self.author_name = Some(name.into());
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_media(mut self) -> Self {
        self.has_media = true;
        self
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_question(&self) -> bool {
        self.text.contains('?') || self.text.contains('؟')
    }

    /// Wrap a platform comment fetched under `post_id`.
    pub fn from_platform(post_id: &str, comment: graph_api::Comment) -> Self {
        let has_media = comment.has_media();
        let (author_id, author_name) = match comment.from {
            Some(author) => (Some(author.id), Some(author.name).filter(|n| !n.is_empty())),
            None => (None, None),
        };
        Self {
            id: comment.id,
            post_id: post_id.to_string(),
            text: comment.message,
            author_id,
            author_name,
            created_at: Some(comment.created_time),
            has_media,
        }
    }
}
