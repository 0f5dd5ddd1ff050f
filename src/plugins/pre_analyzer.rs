use crate::core::LLMContextChunk;
use crate::github::types::PullFile;
use anyhow::Result;
use async_trait::async_trait;

/// The pull request a review is being prepared for.
#[derive(Debug, Clone)]
pub struct ReviewTarget<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub head_sha: &'a str,
    pub files: &'a [PullFile],
}

#[async_trait]
pub trait PreAnalyzer: Send + Sync {
    fn id(&self) -> &str;
    async fn run(&self, target: &ReviewTarget<'_>) -> Result<Vec<LLMContextChunk>>;
}
