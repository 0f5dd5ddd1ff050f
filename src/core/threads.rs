//! Rebuilds inline conversation threads from GitHub's flat review comment list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::github::types::{IssueComment, Review, ReviewComment};

#[derive(Debug, Clone, Serialize)]
pub struct ThreadComment {
    pub id: u64,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewThread {
    pub root_id: u64,
    pub review_id: Option<u64>,
    pub path: String,
    pub line: Option<u32>,
    pub outdated: bool,
    /// Root first, then replies oldest to newest.
    pub comments: Vec<ThreadComment>,
}

impl ReviewThread {
    pub fn replies(&self) -> &[ThreadComment] {
        self.comments.get(1..).unwrap_or_default()
    }
}

fn author_of(user: &Option<crate::github::types::User>) -> String {
    user.as_ref()
        .map(|u| u.login.clone())
        .unwrap_or_else(|| "ghost".to_string())
}

fn to_thread_comment(comment: &ReviewComment) -> ThreadComment {
    ThreadComment {
        id: comment.id,
        author: author_of(&comment.user),
        body: comment.body.clone(),
        created_at: comment.created_at,
        html_url: comment.html_url.clone(),
    }
}

/// Groups comments into threads keyed by their root comment.
///
/// GitHub threads are flat, so a reply to a reply lands in the root's thread.
/// A reply whose parent is missing from `comments` starts its own thread, and
/// a comment caught in a reply cycle is treated as a root.
pub fn build_threads(comments: &[ReviewComment]) -> Vec<ReviewThread> {
    let by_id: HashMap<u64, &ReviewComment> = comments.iter().map(|c| (c.id, c)).collect();

    let root_of = |comment: &ReviewComment| -> u64 {
        let mut current = comment;
        for _ in 0..comments.len() {
            match current.in_reply_to_id.and_then(|parent| by_id.get(&parent)) {
                Some(parent) if parent.id != comment.id => current = parent,
                Some(_) => return comment.id,
                None => return current.id,
            }
        }
        comment.id
    };

    let mut members: HashMap<u64, Vec<&ReviewComment>> = HashMap::new();
    let mut order: Vec<u64> = Vec::new();
    for comment in comments {
        let root = root_of(comment);
        let entry = members.entry(root).or_default();
        if entry.is_empty() {
            order.push(root);
        }
        entry.push(comment);
    }

    let mut threads: Vec<ReviewThread> = order
        .into_iter()
        .filter_map(|root_id| {
            let mut group = members.remove(&root_id)?;
            let root = by_id.get(&root_id).copied()?;
            group.retain(|c| c.id != root_id);
            group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

            let mut thread_comments = Vec::with_capacity(group.len() + 1);
            thread_comments.push(to_thread_comment(root));
            thread_comments.extend(group.into_iter().map(to_thread_comment));

            Some(ReviewThread {
                root_id,
                review_id: root.pull_request_review_id,
                path: root.path.clone(),
                line: root.line.or(root.original_line),
                outdated: root.line.is_none() && root.original_line.is_some(),
                comments: thread_comments,
            })
        })
        .collect();

    threads.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then(a.line.cmp(&b.line))
            .then(a.root_id.cmp(&b.root_id))
    });
    threads
}

/// Inline threads started by each submitted review.
pub fn group_by_review(threads: &[ReviewThread]) -> HashMap<u64, Vec<&ReviewThread>> {
    let mut grouped: HashMap<u64, Vec<&ReviewThread>> = HashMap::new();
    for thread in threads {
        if let Some(review_id) = thread.review_id {
            grouped.entry(review_id).or_default().push(thread);
        }
    }
    grouped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Review,
    Comment,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub id: u64,
    pub kind: EntryKind,
    pub author: String,
    pub state: String,
    pub body: String,
    pub submitted_at: DateTime<Utc>,
    pub html_url: String,
}

/// Merges reviews and conversation comments, newest first.
pub fn build_timeline(reviews: &[Review], comments: &[IssueComment]) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = reviews
        .iter()
        .filter_map(|review| {
            Some(TimelineEntry {
                id: review.id,
                kind: EntryKind::Review,
                author: author_of(&review.user),
                state: review.state.clone(),
                body: review.body.clone().unwrap_or_default(),
                submitted_at: review.submitted_at?,
                html_url: review.html_url.clone(),
            })
        })
        .chain(comments.iter().map(|comment| TimelineEntry {
            id: comment.id,
            kind: EntryKind::Comment,
            author: author_of(&comment.user),
            state: "COMMENTED".to_string(),
            body: comment.body.clone().unwrap_or_default(),
            submitted_at: comment.created_at,
            html_url: comment.html_url.clone(),
        }))
        .collect();

    entries.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    entries
}
