use anyhow::Result;
use async_trait::async_trait;
use crate::core::comment::FileComment;
use crate::github::types::PullFile;

#[async_trait]
pub trait PostProcessor: Send + Sync {
    fn id(&self) -> &str;
    async fn run(&self, comments: Vec<FileComment>, files: &[PullFile]) -> Result<Vec<FileComment>>;
}
