use crate::core::context::{CodebaseSnapshot, IMPORTANT_FILES};
use crate::core::LLMContextChunk;
use crate::github::{GitHubClient, GitHubError};
use crate::plugins::{PreAnalyzer, ReviewTarget};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Describes the repository around the change: metadata, layout and key config files.
pub struct CodebaseContextAnalyzer {
    client: GitHubClient,
}

impl CodebaseContextAnalyzer {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PreAnalyzer for CodebaseContextAnalyzer {
    fn id(&self) -> &str {
        "codebase_context"
    }

    async fn run(&self, target: &ReviewTarget<'_>) -> Result<Vec<LLMContextChunk>> {
        let repo = self
            .client
            .get_repo(target.owner, target.repo)
            .await
            .context("Failed to fetch repository info")?;

        let tree_ref = if target.head_sha.is_empty() {
            "HEAD"
        } else {
            target.head_sha
        };
        let tree = self
            .client
            .get_tree(target.owner, target.repo, tree_ref)
            .await
            .context("Failed to fetch repository tree")?;

        let mut snapshot = CodebaseSnapshot::new(&repo);
        snapshot.tree = tree.tree;

        for path in IMPORTANT_FILES {
            let git_ref = (!target.head_sha.is_empty()).then_some(target.head_sha);
            match self
                .client
                .get_file_content(target.owner, target.repo, path, git_ref)
                .await
            {
                Ok(content) => snapshot.files.push((path.to_string(), content)),
                Err(GitHubError::NotFound(_)) => debug!(path, "Project file not present"),
                Err(err) => warn!(path, error = %err, "Skipping project file"),
            }
        }

        Ok(vec![snapshot.into_chunk()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_collects_repo_tree_and_existing_files() {
        let mut server = mockito::Server::new_async().await;
        let _repo = server
            .mock("GET", "/repos/acme/widgets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"widgets","full_name":"acme/widgets","owner":{"login":"acme","id":1,"type":"Organization"},"description":"Widget factory","language":"Rust"}"#)
            .create_async()
            .await;
        let _tree = server
            .mock("GET", "/repos/acme/widgets/git/trees/abc")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"tree":[{"path":"src","type":"tree"},{"path":"src/lib.rs","type":"blob"}],"truncated":false}"#)
            .create_async()
            .await;
        let _cargo = server
            .mock("GET", "/repos/acme/widgets/contents/Cargo.toml")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type":"file","encoding":"base64","content":"W3BhY2thZ2Vd"}"#)
            .create_async()
            .await;

        let client = GitHubClient::new("t", Some(&server.url())).unwrap();
        let analyzer = CodebaseContextAnalyzer::new(client);
        let chunks = analyzer
            .run(&ReviewTarget {
                owner: "acme",
                repo: "widgets",
                head_sha: "abc",
                files: &[],
            })
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        let text = &chunks[0].content;
        assert!(text.contains("**Description:** Widget factory"));
        assert!(text.contains("📄 src/lib.rs"));
        assert!(text.contains("### Cargo.toml\n```\n[package]\n```"));
        assert!(!text.contains("### README.md"));
    }

    #[tokio::test]
    async fn test_missing_repo_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _repo = server
            .mock("GET", "/repos/acme/gone")
            .with_status(404)
            .create_async()
            .await;

        let client = GitHubClient::new("t", Some(&server.url())).unwrap();
        let result = CodebaseContextAnalyzer::new(client)
            .run(&ReviewTarget {
                owner: "acme",
                repo: "gone",
                head_sha: "",
                files: &[],
            })
            .await;
        assert!(result.is_err());
    }
}
