//! Thin GitHub REST client for the calls the desk needs.

use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::github::types::{
    ContentItem, IssueComment, NewReview, PullFile, PullRequest, Repository, Review,
    ReviewComment, Tree, User,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub token is invalid or expired; sign in again")]
    Unauthorized,
    #[error("Not found or no access: {0}")]
    NotFound(String),
    #[error("GitHub rejected the request: {0}")]
    Validation(String),
    #[error("GitHub API error ({status}): {body}")]
    Api { status: StatusCode, body: String },
    #[error("{0}")]
    Other(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type GitHubResult<T> = std::result::Result<T, GitHubError>;

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, base_url: Option<&str>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("prdesk/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.authorize(self.client.request(method, format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> GitHubResult<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, what, "GitHub request failed");
        Err(match status {
            StatusCode::UNAUTHORIZED => GitHubError::Unauthorized,
            StatusCode::NOT_FOUND => GitHubError::NotFound(what.to_string()),
            StatusCode::UNPROCESSABLE_ENTITY => GitHubError::Validation(body),
            _ => GitHubError::Api { status, body },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> GitHubResult<T> {
        let response = self.send(self.request(reqwest::Method::GET, path), what).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        what: &str,
    ) -> GitHubResult<T> {
        let response = self
            .send(self.request(reqwest::Method::POST, path).json(body), what)
            .await?;
        Ok(response.json().await?)
    }

    pub async fn authenticated_user(&self) -> GitHubResult<User> {
        self.get_json("/user", "authenticated user").await
    }

    pub async fn list_user_repos(&self) -> GitHubResult<Vec<Repository>> {
        self.get_json("/user/repos?sort=updated&per_page=100", "repositories")
            .await
    }

    pub async fn get_repo(&self, owner: &str, repo: &str) -> GitHubResult<Repository> {
        self.get_json(
            &format!("/repos/{}/{}", owner, repo),
            &format!("repository {}/{}", owner, repo),
        )
        .await
    }

    pub async fn list_pulls(
        &self,
        owner: &str,
        repo: &str,
        state: &str,
    ) -> GitHubResult<Vec<PullRequest>> {
        self.get_json(
            &format!(
                "/repos/{}/{}/pulls?state={}&sort=updated&per_page=100",
                owner, repo, state
            ),
            &format!("pull requests of {}/{}", owner, repo),
        )
        .await
    }

    pub async fn get_pull(&self, owner: &str, repo: &str, number: u64) -> GitHubResult<PullRequest> {
        self.get_json(
            &format!("/repos/{}/{}/pulls/{}", owner, repo, number),
            &format!("pull request {}/{}#{}", owner, repo, number),
        )
        .await
    }

    pub async fn list_pull_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> GitHubResult<Vec<PullFile>> {
        self.get_json(
            &format!("/repos/{}/{}/pulls/{}/files?per_page=100", owner, repo, number),
            "pull request files",
        )
        .await
    }

    pub async fn list_reviews(&self, owner: &str, repo: &str, number: u64) -> GitHubResult<Vec<Review>> {
        self.get_json(
            &format!("/repos/{}/{}/pulls/{}/reviews?per_page=100", owner, repo, number),
            "pull request reviews",
        )
        .await
    }

    pub async fn list_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> GitHubResult<Vec<IssueComment>> {
        self.get_json(
            &format!("/repos/{}/{}/issues/{}/comments?per_page=100", owner, repo, number),
            "pull request comments",
        )
        .await
    }

    pub async fn list_review_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> GitHubResult<Vec<ReviewComment>> {
        self.get_json(
            &format!("/repos/{}/{}/pulls/{}/comments?per_page=100", owner, repo, number),
            "review comments",
        )
        .await
    }

    /// `contents/{path}` with every path segment percent-encoded.
    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> GitHubResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GitHubError::Other(format!("Invalid GitHub API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::Other(format!("Invalid GitHub API URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "contents"])
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    /// Fetches a file's text at `git_ref` (commit sha, branch or tag).
    pub async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> GitHubResult<String> {
        let mut builder = self.authorize(self.client.get(self.contents_url(owner, repo, path)?));
        if let Some(git_ref) = git_ref {
            builder = builder.query(&[("ref", git_ref)]);
        }

        let value: serde_json::Value = self.send(builder, path).await?.json().await?;
        if value.is_array() {
            return Err(GitHubError::Other(format!("Path is not a file: {}", path)));
        }
        let item: ContentItem = serde_json::from_value(value)
            .map_err(|e| GitHubError::Other(format!("Unexpected contents payload: {}", e)))?;
        if item.entry_type != "file" {
            return Err(GitHubError::Other(format!("Path is not a file: {}", path)));
        }
        if item.encoding.as_deref().is_some_and(|enc| enc != "base64") {
            return Err(GitHubError::Other(format!(
                "Unsupported content encoding for {}",
                path
            )));
        }

        let encoded: String = item
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| GitHubError::Other(format!("Invalid base64 content: {}", e)))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn get_tree(&self, owner: &str, repo: &str, tree_sha: &str) -> GitHubResult<Tree> {
        self.get_json(
            &format!("/repos/{}/{}/git/trees/{}?recursive=1", owner, repo, tree_sha),
            "repository tree",
        )
        .await
    }

    pub async fn create_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        review: &NewReview,
    ) -> GitHubResult<Review> {
        self.post_json(
            &format!("/repos/{}/{}/pulls/{}/reviews", owner, repo, number),
            review,
            "create review",
        )
        .await
    }

    pub async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> GitHubResult<IssueComment> {
        self.post_json(
            &format!("/repos/{}/{}/issues/{}/comments", owner, repo, number),
            &serde_json::json!({ "body": body }),
            "create comment",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::types::{NewReviewComment, ReviewEvent, Side};
    use mockito::Matcher;

    #[tokio::test]
    async fn test_get_file_content_decodes_base64() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/o/r/contents/src/lib.rs")
            .match_query(Matcher::UrlEncoded("ref".into(), "abc123".into()))
            .match_header("authorization", "Bearer t0k")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type":"file","encoding":"base64","content":"Zm4g\nbWFpbigpIHt9\n"}"#)
            .create_async()
            .await;

        let client = GitHubClient::new("t0k", Some(&server.url())).unwrap();
        let content = client
            .get_file_content("o", "r", "src/lib.rs", Some("abc123"))
            .await
            .unwrap();
        assert_eq!(content, "fn main() {}");
    }

    #[tokio::test]
    async fn test_get_file_content_encodes_path_and_ref() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/o/r/contents/docs/a%23b%3F.md")
            .match_query(Matcher::UrlEncoded("ref".into(), "feature/x&y".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type":"file","encoding":"base64","content":"aGk="}"#)
            .create_async()
            .await;

        let client = GitHubClient::new("t", Some(&format!("{}/", server.url()))).unwrap();
        let content = client
            .get_file_content("o", "r", "docs/a#b?.md", Some("feature/x&y"))
            .await
            .unwrap();
        assert_eq!(content, "hi");
    }

    #[tokio::test]
    async fn test_get_file_content_rejects_directory() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/o/r/contents/src")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"type":"file","name":"lib.rs"}]"#)
            .create_async()
            .await;

        let client = GitHubClient::new("t", Some(&server.url())).unwrap();
        let err = client.get_file_content("o", "r", "src", None).await.unwrap_err();
        assert!(err.to_string().contains("not a file"));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let mut server = mockito::Server::new_async().await;
        let _unauthorized = server
            .mock("GET", "/user")
            .with_status(401)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/repos/o/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = GitHubClient::new("t", Some(&server.url())).unwrap();
        assert!(matches!(
            client.authenticated_user().await,
            Err(GitHubError::Unauthorized)
        ));
        assert!(matches!(
            client.get_repo("o", "missing").await,
            Err(GitHubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_review_sends_inline_comments() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/o/r/pulls/7/reviews")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "event": "COMMENT",
                "comments": [{"path": "a.rs", "line": 3, "side": "RIGHT", "body": "nit"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 1, "user": null, "state": "COMMENTED"}"#)
            .create_async()
            .await;

        let client = GitHubClient::new("t", Some(&server.url())).unwrap();
        let review = NewReview {
            body: "summary".into(),
            event: ReviewEvent::Comment,
            comments: vec![NewReviewComment {
                path: "a.rs".into(),
                line: 3,
                side: Side::Right,
                body: "nit".into(),
            }],
        };
        let posted = client.create_review("o", "r", 7, &review).await.unwrap();
        assert_eq!(posted.id, 1);
        mock.assert_async().await;
    }
}
