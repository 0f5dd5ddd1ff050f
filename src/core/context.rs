use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::github::types::{Repository, TreeEntry};

/// Files whose contents describe a project's conventions.
pub const IMPORTANT_FILES: &[&str] = &[
    "README.md",
    "package.json",
    "Cargo.toml",
    "tsconfig.json",
    ".eslintrc",
    ".prettierrc",
];

pub const MAX_TREE_ENTRIES: usize = 100;
pub const MAX_FILE_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMContextChunk {
    pub file_path: PathBuf,
    pub content: String,
    pub context_type: ContextType,
    pub line_range: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextType {
    FileContent,
    Structure,
    Documentation,
}

/// What the codebase analyzer gathered about the repository under review.
#[derive(Debug, Clone, Default)]
pub struct CodebaseSnapshot {
    pub full_name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub tree: Vec<TreeEntry>,
    /// `(path, content)` in [`IMPORTANT_FILES`] order.
    pub files: Vec<(String, String)>,
}

impl CodebaseSnapshot {
    pub fn new(repo: &Repository) -> Self {
        Self {
            full_name: repo.full_name.clone(),
            description: repo.description.clone(),
            language: repo.language.clone(),
            ..Default::default()
        }
    }

    pub fn into_chunk(self) -> LLMContextChunk {
        LLMContextChunk {
            file_path: PathBuf::from(&self.full_name),
            content: self.render(),
            context_type: ContextType::Structure,
            line_range: None,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("## Repository Context\n\n");
        out.push_str(&format!("**Repository:** {}\n", self.full_name));
        out.push_str(&format!(
            "**Description:** {}\n",
            non_empty(self.description.as_deref())
        ));
        out.push_str(&format!(
            "**Primary Language:** {}\n\n",
            non_empty(self.language.as_deref())
        ));

        out.push_str("### Project Structure\n```\n");
        for entry in self.tree.iter().take(MAX_TREE_ENTRIES) {
            let icon = if entry.entry_type == "tree" { "📁" } else { "📄" };
            out.push_str(&format!("{} {}\n", icon, entry.path));
        }
        if self.tree.len() > MAX_TREE_ENTRIES {
            out.push_str(&format!(
                "... and {} more files\n",
                self.tree.len() - MAX_TREE_ENTRIES
            ));
        }
        out.push_str("```\n");

        for (path, content) in &self.files {
            out.push_str(&format!(
                "\n### {}\n```\n{}\n```\n",
                path,
                truncate_chars(content, MAX_FILE_CHARS)
            ));
        }

        out.push_str(
            "\nPlease analyze this PR in the context of the overall codebase structure and coding conventions used in this project.",
        );
        out
    }
}

fn non_empty(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "N/A",
    }
}

/// Cuts `text` to `max` characters, marking the cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}
