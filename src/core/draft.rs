//! Editable reviews kept on disk until they are posted.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::core::comment::{FileComment, ReviewResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDraft {
    pub id: Uuid,
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
    #[serde(default)]
    pub pr_title: String,
    pub summary: String,
    #[serde(default)]
    pub file_comments: Vec<FileComment>,
    pub provider: String,
    #[serde(default)]
    pub posted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewDraft {
    pub fn new(
        owner: &str,
        repo: &str,
        pr_number: u64,
        pr_title: &str,
        provider: &str,
        result: ReviewResult,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            pr_number,
            pr_title: pr_title.to_string(),
            summary: result.summary,
            file_comments: result.file_comments,
            provider: provider.to_string(),
            posted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read draft {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid draft file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write draft {}", path.display()))
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = summary.into();
        self.touch();
    }

    pub fn add_comment(&mut self, comment: FileComment) -> Result<()> {
        validate(&comment)?;
        self.file_comments.push(comment);
        self.touch();
        Ok(())
    }

    pub fn update_comment(&mut self, index: usize, comment: FileComment) -> Result<()> {
        validate(&comment)?;
        let count = self.file_comments.len();
        let slot = self
            .file_comments
            .get_mut(index)
            .with_context(|| format!("No comment at index {} ({} comments)", index, count))?;
        *slot = comment;
        self.touch();
        Ok(())
    }

    pub fn remove_comment(&mut self, index: usize) -> Result<FileComment> {
        if index >= self.file_comments.len() {
            bail!(
                "No comment at index {} ({} comments)",
                index,
                self.file_comments.len()
            );
        }
        self.touch();
        Ok(self.file_comments.remove(index))
    }

    pub fn mark_posted(&mut self) {
        self.posted = true;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn validate(comment: &FileComment) -> Result<()> {
    if comment.filename.trim().is_empty() {
        bail!("Comment needs a file name");
    }
    if comment.comment.trim().is_empty() {
        bail!("Comment text is empty");
    }
    Ok(())
}

/// Parses `path:line:text` (or `path::text` for a file-level comment).
pub fn parse_comment_spec(spec: &str) -> Result<FileComment> {
    let mut parts = spec.splitn(3, ':');
    let (Some(filename), Some(line), Some(comment)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("Expected path:line:text, got '{}'", spec);
    };

    let line = match line.trim() {
        "" => None,
        value => Some(
            value
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("Invalid line number '{}'", value))?,
        ),
    };

    Ok(FileComment {
        filename: filename.trim().to_string(),
        line,
        comment: comment.to_string(),
    })
}
