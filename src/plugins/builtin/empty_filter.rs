use crate::core::comment::FileComment;
use crate::github::types::PullFile;
use crate::plugins::PostProcessor;
use anyhow::Result;
use async_trait::async_trait;

/// Drops comments without text or without a file to attach to.
pub struct EmptyCommentFilter;

impl EmptyCommentFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PostProcessor for EmptyCommentFilter {
    fn id(&self) -> &str {
        "empty_filter"
    }

    async fn run(&self, mut comments: Vec<FileComment>, _files: &[PullFile]) -> Result<Vec<FileComment>> {
        comments.retain(|c| !c.comment.trim().is_empty() && !c.filename.trim().is_empty());
        Ok(comments)
    }
}
