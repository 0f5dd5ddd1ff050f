//! Turns a draft into the GitHub calls that publish it.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::core::comment::FileComment;
use crate::core::draft::ReviewDraft;
use crate::core::line_map::DiffLineMap;
use crate::core::reviewer::FOOTER_SEPARATOR;
use crate::github::types::{NewReview, NewReviewComment, PullFile, ReviewEvent};
use crate::github::GitHubClient;

#[derive(Debug, Clone, PartialEq)]
pub enum PostPlan {
    Review(NewReview),
    IssueComment(String),
}

#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub inline_comments: usize,
    pub body_comments: usize,
    pub html_url: String,
}

/// Decides what to send for `draft`, anchoring comments on the PR's patches.
pub fn plan_post(draft: &ReviewDraft, files: &[PullFile], event: ReviewEvent) -> Result<PostPlan> {
    if event == ReviewEvent::RequestChanges && draft.summary.trim().is_empty() {
        bail!("Requesting changes needs a review body");
    }

    if draft.file_comments.is_empty() {
        if event == ReviewEvent::Comment {
            return Ok(PostPlan::IssueComment(draft.summary.clone()));
        }
        return Ok(PostPlan::Review(NewReview {
            body: draft.summary.clone(),
            event,
            comments: Vec::new(),
        }));
    }

    let maps: HashMap<&str, DiffLineMap> = files
        .iter()
        .filter_map(|f| {
            f.patch
                .as_deref()
                .map(|patch| (f.filename.as_str(), DiffLineMap::from_patch(patch)))
        })
        .collect();

    let mut inline = Vec::new();
    let mut leftovers: Vec<&FileComment> = Vec::new();
    for comment in &draft.file_comments {
        let anchor = comment.line.and_then(|line| {
            maps.get(comment.filename.as_str())
                .and_then(|map| map.anchor_for(line))
        });
        match anchor {
            Some(anchor) => inline.push(NewReviewComment {
                path: comment.filename.clone(),
                line: anchor.line,
                side: anchor.side,
                body: comment.comment.clone(),
            }),
            None => leftovers.push(comment),
        }
    }

    Ok(PostPlan::Review(NewReview {
        body: with_additional_comments(&draft.summary, &leftovers),
        event,
        comments: inline,
    }))
}

fn with_additional_comments(summary: &str, leftovers: &[&FileComment]) -> String {
    if leftovers.is_empty() {
        return summary.to_string();
    }

    let mut section = String::from("\n\n### Additional comments\n");
    for comment in leftovers {
        let location = match comment.line {
            Some(line) => format!("{}:{}", comment.filename, line),
            None => comment.filename.clone(),
        };
        section.push_str(&format!("\n- `{}`: {}", location, comment.comment.trim()));
    }

    // Keep the footer last.
    match summary.rfind(FOOTER_SEPARATOR) {
        Some(at) => format!("{}{}{}", &summary[..at], section, &summary[at..]),
        None => format!("{}{}", summary, section),
    }
}

/// Publishes the draft and saves it back to `draft_path` marked as posted.
pub async fn post_review(
    client: &GitHubClient,
    draft: &mut ReviewDraft,
    event: ReviewEvent,
    draft_path: &Path,
) -> Result<PostOutcome> {
    if draft.posted {
        warn!(id = %draft.id, "Draft was already posted; posting again");
    }

    let files = if draft.file_comments.is_empty() {
        Vec::new()
    } else {
        client
            .list_pull_files(&draft.owner, &draft.repo, draft.pr_number)
            .await
            .context("Failed to fetch pull request files")?
    };

    let plan = plan_post(draft, &files, event)?;
    let outcome = match plan {
        PostPlan::IssueComment(body) => {
            let comment = client
                .create_issue_comment(&draft.owner, &draft.repo, draft.pr_number, &body)
                .await
                .context("Failed to post comment")?;
            PostOutcome {
                inline_comments: 0,
                body_comments: 0,
                html_url: comment.html_url,
            }
        }
        PostPlan::Review(review) => {
            let inline_comments = review.comments.len();
            let body_comments = draft.file_comments.len() - inline_comments;
            let posted = client
                .create_review(&draft.owner, &draft.repo, draft.pr_number, &review)
                .await
                .context("Failed to post review")?;
            PostOutcome {
                inline_comments,
                body_comments,
                html_url: posted.html_url,
            }
        }
    };

    info!(
        repo = %format!("{}/{}", draft.owner, draft.repo),
        pr = draft.pr_number,
        inline = outcome.inline_comments,
        in_body = outcome.body_comments,
        "Review posted"
    );

    draft.mark_posted();
    draft.save(draft_path)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comment::ReviewResult;
    use crate::github::types::Side;
    use mockito::Matcher;
    use tempfile::TempDir;

    const PATCH: &str = "@@ -1,3 +1,4 @@\n fn a() {}\n-fn b() {}\n+fn b() -> u8 { 1 }\n+fn c() {}\n fn d() {}";

    fn pull_file() -> PullFile {
        PullFile {
            filename: "src/lib.rs".into(),
            status: "modified".into(),
            additions: 2,
            deletions: 1,
            changes: 3,
            patch: Some(PATCH.into()),
        }
    }

    fn draft(comments: Vec<FileComment>) -> ReviewDraft {
        ReviewDraft::new(
            "acme",
            "widgets",
            5,
            "t",
            "claude",
            ReviewResult {
                summary: "Summary\n\n---\n*🤖 Generated by [prdesk](https://example.com)*".into(),
                file_comments: comments,
                suggestions: vec![],
            },
        )
    }

    fn fc(file: &str, line: Option<u32>, text: &str) -> FileComment {
        FileComment {
            filename: file.into(),
            line,
            comment: text.into(),
        }
    }

    #[test]
    fn test_plan_without_comments() {
        let d = draft(vec![]);
        assert!(matches!(
            plan_post(&d, &[], ReviewEvent::Comment).unwrap(),
            PostPlan::IssueComment(_)
        ));
        match plan_post(&d, &[], ReviewEvent::Approve).unwrap() {
            PostPlan::Review(review) => {
                assert_eq!(review.event, ReviewEvent::Approve);
                assert!(review.comments.is_empty());
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_request_changes_needs_body() {
        let mut d = draft(vec![]);
        d.summary = "  ".into();
        assert!(plan_post(&d, &[], ReviewEvent::RequestChanges).is_err());
        assert!(plan_post(&d, &[], ReviewEvent::Comment).is_ok());
    }

    #[test]
    fn test_plan_anchors_and_keeps_leftovers_in_body() {
        let d = draft(vec![
            fc("src/lib.rs", Some(2), "returns a magic number"),
            fc("src/lib.rs", Some(2_000), "far away"),
            fc("src/other.rs", Some(1), "not in this PR"),
            fc("src/lib.rs", None, "overall"),
        ]);
        let PostPlan::Review(review) = plan_post(&d, &[pull_file()], ReviewEvent::Comment).unwrap()
        else {
            panic!("expected a review");
        };

        assert_eq!(
            review.comments,
            vec![NewReviewComment {
                path: "src/lib.rs".into(),
                line: 2,
                side: Side::Right,
                body: "returns a magic number".into(),
            }]
        );
        let additional = review.body.find("### Additional comments").unwrap();
        let footer = review.body.find("---\n*🤖").unwrap();
        assert!(additional < footer);
        assert!(review.body.contains("- `src/lib.rs:2000`: far away"));
        assert!(review.body.contains("- `src/other.rs:1`: not in this PR"));
        assert!(review.body.contains("- `src/lib.rs`: overall"));
    }

    #[tokio::test]
    async fn test_post_review_marks_draft_posted() {
        let mut server = mockito::Server::new_async().await;
        let files = server
            .mock("GET", "/repos/acme/widgets/pulls/5/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&serde_json::json!([{
                "filename": "src/lib.rs", "status": "modified",
                "additions": 2, "deletions": 1, "changes": 3, "patch": PATCH
            }])).unwrap())
            .create_async()
            .await;
        let review = server
            .mock("POST", "/repos/acme/widgets/pulls/5/reviews")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "event": "REQUEST_CHANGES",
                "comments": [{"path": "src/lib.rs", "line": 3, "side": "RIGHT"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 9, "user": null, "state": "CHANGES_REQUESTED", "html_url": "https://github.com/r/9"}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("draft.json");
        let mut d = draft(vec![fc("src/lib.rs", Some(3), "add a test")]);
        let client = GitHubClient::new("t", Some(&server.url())).unwrap();

        let outcome = post_review(&client, &mut d, ReviewEvent::RequestChanges, &path)
            .await
            .unwrap();
        assert_eq!(outcome.inline_comments, 1);
        assert_eq!(outcome.body_comments, 0);
        assert!(d.posted);
        assert!(ReviewDraft::load(&path).unwrap().posted);
        files.assert_async().await;
        review.assert_async().await;
    }
}
