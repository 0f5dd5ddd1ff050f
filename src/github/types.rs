//! GitHub REST payloads.

#![allow(dead_code)] // Deserialization structs carry fields only some commands print

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: User,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl Repository {
    pub fn is_org_owned(&self) -> bool {
        self.owner.account_type.as_deref() == Some("Organization")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub user: User,
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub additions: Option<u64>,
    #[serde(default)]
    pub deletions: Option<u64>,
    #[serde(default)]
    pub changed_files: Option<u64>,
    #[serde(default)]
    pub draft: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
    #[serde(default)]
    pub patch: Option<String>,
}

/// A submitted (or pending) pull request review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub user: Option<User>,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: String,
}

/// A conversation comment on the PR (issues API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub user: Option<User>,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
}

/// An inline review comment attached to a diff line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    #[serde(default)]
    pub in_reply_to_id: Option<u64>,
    #[serde(default)]
    pub pull_request_review_id: Option<u64>,
    pub path: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub original_line: Option<u32>,
    pub body: String,
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContentItem {
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Comment,
    Approve,
    RequestChanges,
}

impl std::str::FromStr for ReviewEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "comment" => Ok(Self::Comment),
            "approve" => Ok(Self::Approve),
            "request-changes" => Ok(Self::RequestChanges),
            other => anyhow::bail!("Unknown review event: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewReviewComment {
    pub path: String,
    pub line: u32,
    pub side: Side,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewReview {
    pub body: String,
    pub event: ReviewEvent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<NewReviewComment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_comment_deserializes_reply() {
        let json = r#"{
            "id": 12,
            "in_reply_to_id": 10,
            "pull_request_review_id": 99,
            "path": "src/lib.rs",
            "line": null,
            "original_line": 40,
            "body": "agreed",
            "user": {"login": "octo", "id": 1},
            "created_at": "2024-05-01T10:00:00Z",
            "html_url": "https://github.com/o/r/pull/1#discussion_r12"
        }"#;
        let comment: ReviewComment = serde_json::from_str(json).unwrap();
        assert_eq!(comment.in_reply_to_id, Some(10));
        assert_eq!(comment.line, None);
        assert_eq!(comment.original_line, Some(40));
    }

    #[test]
    fn test_review_event_parsing_and_wire_format() {
        assert_eq!("approve".parse::<ReviewEvent>().unwrap(), ReviewEvent::Approve);
        assert_eq!(
            "REQUEST_CHANGES".parse::<ReviewEvent>().unwrap(),
            ReviewEvent::RequestChanges
        );
        assert!("merge".parse::<ReviewEvent>().is_err());
        assert_eq!(
            serde_json::to_string(&ReviewEvent::RequestChanges).unwrap(),
            "\"REQUEST_CHANGES\""
        );
        assert_eq!(serde_json::to_string(&Side::Right).unwrap(), "\"RIGHT\"");
    }

    #[test]
    fn test_org_owned_repo() {
        let json = r#"{"name":"x","full_name":"acme/x","owner":{"login":"acme","type":"Organization"}}"#;
        let repo: Repository = serde_json::from_str(json).unwrap();
        assert!(repo.is_org_owned());
    }
}
