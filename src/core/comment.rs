use serde::{Deserialize, Serialize};

use crate::core::context::LLMContextChunk;
use crate::github::types::PullFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileComment {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub summary: String,
    #[serde(default)]
    pub file_comments: Vec<FileComment>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// GitHub's per-file change status. Values GitHub may add later are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
    Other(String),
}

impl FileStatus {
    pub fn from_github(status: &str) -> Self {
        match status {
            "added" => Self::Added,
            "modified" => Self::Modified,
            "removed" => Self::Removed,
            "renamed" => Self::Renamed,
            "copied" => Self::Copied,
            "changed" => Self::Changed,
            "unchanged" => Self::Unchanged,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Other(status) => status,
        }
    }
}

impl From<String> for FileStatus {
    fn from(status: String) -> Self {
        Self::from_github(&status)
    }
}

impl From<FileStatus> for String {
    fn from(status: FileStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    pub status: FileStatus,
    pub additions: u64,
    pub deletions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

impl From<&PullFile> for FileChange {
    fn from(file: &PullFile) -> Self {
        Self {
            filename: file.filename.clone(),
            status: FileStatus::from_github(&file.status),
            additions: file.additions,
            deletions: file.deletions,
            patch: file.patch.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewLanguage {
    #[default]
    Ko,
    En,
}

impl ReviewLanguage {
    /// Anything other than `en` reviews in Korean.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("en") {
            Self::En
        } else {
            Self::Ko
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStyle {
    Brief,
    #[default]
    Detailed,
    Strict,
}

impl ReviewStyle {
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "brief" => Self::Brief,
            "strict" => Self::Strict,
            _ => Self::Detailed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewContext {
    pub pr_title: String,
    pub pr_description: String,
    pub file_changes: Vec<FileChange>,
    pub custom_prompt: Option<String>,
    pub review_language: ReviewLanguage,
    pub review_style: ReviewStyle,
    /// Repository context gathered by pre-analyzers.
    pub context_chunks: Vec<LLMContextChunk>,
}
