use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::github::types::PullFile;

static HUNK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedDiff {
    pub file_path: PathBuf,
    pub hunks: Vec<DiffHunk>,
    pub is_binary: bool,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
    pub context: String,
    pub changes: Vec<DiffLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    pub old_line_no: Option<usize>,
    pub new_line_no: Option<usize>,
    pub change_type: ChangeType,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Removed,
    Context,
}

pub struct DiffParser;

impl DiffParser {
    pub fn parse_unified_diff(diff_content: &str) -> Result<Vec<UnifiedDiff>> {
        let mut diffs = Vec::new();
        let lines: Vec<&str> = diff_content.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            if lines[i].starts_with("diff --git") {
                let diff = Self::parse_single_file_diff(&lines, &mut i)?;
                diffs.push(diff);
            } else if lines[i].starts_with("--- ")
                && i + 1 < lines.len()
                && lines[i + 1].starts_with("+++ ")
            {
                let diff = Self::parse_simple_file_diff(&lines, &mut i)?;
                diffs.push(diff);
            } else {
                i += 1;
            }
        }

        Ok(diffs)
    }

    /// Parses the header-less `patch` field GitHub returns per changed file.
    pub fn parse_patch(file_path: impl Into<PathBuf>, patch: &str) -> UnifiedDiff {
        let lines: Vec<&str> = patch.lines().collect();
        let mut i = 0;
        let mut hunks = Vec::new();

        while i < lines.len() {
            if lines[i].starts_with("@@") {
                match Self::parse_hunk(&lines, &mut i) {
                    Some(hunk) => hunks.push(hunk),
                    None => i += 1,
                }
            } else {
                i += 1;
            }
        }

        UnifiedDiff {
            file_path: file_path.into(),
            hunks,
            is_binary: false,
            is_deleted: false,
        }
    }

    fn parse_single_file_diff(lines: &[&str], i: &mut usize) -> Result<UnifiedDiff> {
        let file_line = lines[*i];
        let file_path = Self::extract_file_path(file_line)?;
        *i += 1;

        let mut is_binary = false;
        let mut is_deleted = false;
        while *i < lines.len()
            && !lines[*i].starts_with("@@")
            && !lines[*i].starts_with("diff --git")
        {
            if lines[*i].starts_with("Binary files") || lines[*i].starts_with("GIT binary patch") {
                is_binary = true;
            }
            if lines[*i].starts_with("deleted file mode") || lines[*i] == "+++ /dev/null" {
                is_deleted = true;
            }
            *i += 1;
        }

        let mut hunks = Vec::new();
        while *i < lines.len() && lines[*i].starts_with("@@") {
            match Self::parse_hunk(lines, i) {
                Some(hunk) => hunks.push(hunk),
                None => *i += 1,
            }
        }

        Ok(UnifiedDiff {
            file_path: PathBuf::from(file_path),
            hunks,
            is_binary,
            is_deleted,
        })
    }

    fn parse_simple_file_diff(lines: &[&str], i: &mut usize) -> Result<UnifiedDiff> {
        let old_line = lines[*i];
        let new_line = lines.get(*i + 1).unwrap_or(&"");

        let old_path = Self::extract_path_from_header(old_line, "--- ")?;
        let new_path = Self::extract_path_from_header(new_line, "+++ ")?;

        let is_deleted = new_path == "/dev/null";
        let file_path = if is_deleted { old_path } else { new_path };

        *i += 2;

        let mut hunks = Vec::new();
        let mut is_binary = false;

        while *i < lines.len()
            && !lines[*i].starts_with("diff --git")
            && !(lines[*i].starts_with("--- ")
                && *i + 1 < lines.len()
                && lines[*i + 1].starts_with("+++ "))
        {
            if lines[*i].starts_with("Binary files") || lines[*i].starts_with("GIT binary patch") {
                is_binary = true;
            }
            if lines[*i].starts_with("@@") {
                match Self::parse_hunk(lines, i) {
                    Some(hunk) => hunks.push(hunk),
                    None => *i += 1,
                }
            } else {
                *i += 1;
            }
        }

        Ok(UnifiedDiff {
            file_path: PathBuf::from(file_path),
            hunks,
            is_binary,
            is_deleted,
        })
    }

    fn extract_file_path(line: &str) -> Result<String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 4 {
            Ok(parts[3].trim_start_matches("b/").to_string())
        } else {
            anyhow::bail!("Invalid diff header: {}", line)
        }
    }

    fn extract_path_from_header(line: &str, prefix: &str) -> Result<String> {
        let raw = line
            .strip_prefix(prefix)
            .ok_or_else(|| anyhow::anyhow!("Invalid file header: {}", line))?
            .trim();
        let path = raw.split_whitespace().next().unwrap_or(raw);
        Ok(path.trim_start_matches("a/").trim_start_matches("b/").to_string())
    }

    /// Returns `None` when the header is malformed; the caller skips the line.
    fn parse_hunk(lines: &[&str], i: &mut usize) -> Option<DiffHunk> {
        let header = lines[*i];
        let (old_start, old_lines, new_start, new_lines) = Self::parse_hunk_header(header)?;
        *i += 1;

        let mut changes = Vec::new();
        let mut old_line = old_start;
        let mut new_line = new_start;

        while *i < lines.len()
            && !lines[*i].starts_with("@@")
            && !lines[*i].starts_with("diff --git")
            && !(lines[*i].starts_with("--- ")
                && *i + 1 < lines.len()
                && lines[*i + 1].starts_with("+++ "))
        {
            let line = lines[*i];
            *i += 1;
            if line.starts_with('\\') {
                // "\ No newline at end of file"
                continue;
            }

            let (change_type, content) = match line.chars().next() {
                Some('+') => (ChangeType::Added, &line[1..]),
                Some('-') => (ChangeType::Removed, &line[1..]),
                Some(' ') => (ChangeType::Context, &line[1..]),
                _ => (ChangeType::Context, line),
            };

            let diff_line = match change_type {
                ChangeType::Added => {
                    let line_no = new_line;
                    new_line += 1;
                    DiffLine {
                        old_line_no: None,
                        new_line_no: Some(line_no),
                        change_type,
                        content: content.to_string(),
                    }
                }
                ChangeType::Removed => {
                    let line_no = old_line;
                    old_line += 1;
                    DiffLine {
                        old_line_no: Some(line_no),
                        new_line_no: None,
                        change_type,
                        content: content.to_string(),
                    }
                }
                ChangeType::Context => {
                    let old_no = old_line;
                    let new_no = new_line;
                    old_line += 1;
                    new_line += 1;
                    DiffLine {
                        old_line_no: Some(old_no),
                        new_line_no: Some(new_no),
                        change_type,
                        content: content.to_string(),
                    }
                }
            };

            changes.push(diff_line);
        }

        Some(DiffHunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
            context: header.to_string(),
            changes,
        })
    }

    pub(crate) fn parse_hunk_header(header: &str) -> Option<(usize, usize, usize, usize)> {
        let caps = HUNK_HEADER.captures(header)?;

        let old_start = caps.get(1)?.as_str().parse().ok()?;
        let old_lines = caps.get(2).map_or(Some(1), |m| m.as_str().parse().ok())?;
        let new_start = caps.get(3)?.as_str().parse().ok()?;
        let new_lines = caps.get(4).map_or(Some(1), |m| m.as_str().parse().ok())?;

        Some((old_start, old_lines, new_start, new_lines))
    }
}

/// Concatenates per-file patches into the diff text handed to reviewers.
pub fn build_review_diff(files: &[PullFile]) -> String {
    files
        .iter()
        .map(|file| {
            format!(
                "--- a/{}\n+++ b/{}\n{}",
                file.filename,
                file.filename,
                file.patch.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
