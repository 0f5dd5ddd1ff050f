use anyhow::Result;
use std::sync::Arc;
use crate::config::Config;
use crate::core::comment::FileComment;
use crate::core::LLMContextChunk;
use crate::github::types::PullFile;
use crate::github::GitHubClient;
use crate::plugins::builtin::{CodebaseContextAnalyzer, DuplicateFilter, EmptyCommentFilter, LineSnapper};
use crate::plugins::{PostProcessor, PreAnalyzer, ReviewTarget};

#[derive(Default)]
pub struct PluginManager {
    pre_analyzers: Vec<Arc<dyn PreAnalyzer>>,
    post_processors: Vec<Arc<dyn PostProcessor>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the builtins enabled in `config`.
    pub fn load_builtin_plugins(&mut self, config: &Config, client: &GitHubClient) {
        if config.analyze_codebase {
            self.register_pre_analyzer(Arc::new(CodebaseContextAnalyzer::new(client.clone())));
        }
        if config.plugins.empty_filter {
            self.register_post_processor(Arc::new(EmptyCommentFilter::new()));
        }
        if config.plugins.line_anchor {
            self.register_post_processor(Arc::new(LineSnapper::new()));
        }
        if config.plugins.duplicate_filter {
            self.register_post_processor(Arc::new(DuplicateFilter::new()));
        }
    }

    pub fn register_pre_analyzer(&mut self, analyzer: Arc<dyn PreAnalyzer>) {
        self.pre_analyzers.push(analyzer);
    }

    pub fn register_post_processor(&mut self, processor: Arc<dyn PostProcessor>) {
        self.post_processors.push(processor);
    }

    pub fn post_processor_ids(&self) -> Vec<&str> {
        self.post_processors.iter().map(|p| p.id()).collect()
    }

    pub async fn run_pre_analyzers(&self, target: &ReviewTarget<'_>) -> Vec<LLMContextChunk> {
        let mut all_chunks = Vec::new();

        for analyzer in &self.pre_analyzers {
            match analyzer.run(target).await {
                Ok(chunks) => all_chunks.extend(chunks),
                Err(e) => {
                    tracing::warn!("Pre-analyzer {} failed: {:#}", analyzer.id(), e);
                }
            }
        }

        all_chunks
    }

    pub async fn run_post_processors(
        &self,
        comments: Vec<FileComment>,
        files: &[PullFile],
    ) -> Result<Vec<FileComment>> {
        let mut processed = comments;

        for processor in &self.post_processors {
            match processor.run(processed.clone(), files).await {
                Ok(result) => processed = result,
                Err(e) => {
                    tracing::warn!("Post-processor {} failed: {:#}", processor.id(), e);
                }
            }
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Failing;

    #[async_trait]
    impl PostProcessor for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        async fn run(&self, _comments: Vec<FileComment>, _files: &[PullFile]) -> Result<Vec<FileComment>> {
            anyhow::bail!("boom")
        }
    }

    #[async_trait]
    impl PreAnalyzer for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        async fn run(&self, _target: &ReviewTarget<'_>) -> Result<Vec<LLMContextChunk>> {
            anyhow::bail!("boom")
        }
    }

    #[test]
    fn test_builtins_follow_config() {
        let client = GitHubClient::new("t", None).unwrap();
        let mut config = Config::default();
        config.plugins.duplicate_filter = false;

        let mut manager = PluginManager::new();
        manager.load_builtin_plugins(&config, &client);
        assert_eq!(manager.post_processor_ids(), vec!["empty_filter", "line_anchor"]);
        assert!(manager.pre_analyzers.is_empty());

        config.analyze_codebase = true;
        let mut manager = PluginManager::new();
        manager.load_builtin_plugins(&config, &client);
        assert_eq!(manager.pre_analyzers.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_skipped() {
        let mut manager = PluginManager::new();
        manager.register_pre_analyzer(Arc::new(Failing));
        manager.register_post_processor(Arc::new(Failing));
        manager.register_post_processor(Arc::new(EmptyCommentFilter::new()));

        let target = ReviewTarget {
            owner: "o",
            repo: "r",
            head_sha: "",
            files: &[],
        };
        assert!(manager.run_pre_analyzers(&target).await.is_empty());

        let comments = vec![
            FileComment { filename: "a.rs".into(), line: None, comment: "keep".into() },
            FileComment { filename: "a.rs".into(), line: None, comment: "".into() },
        ];
        let out = manager.run_post_processors(comments, &[]).await.unwrap();
        assert_eq!(out.len(), 1);
    }
}
