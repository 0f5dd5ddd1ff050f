use crate::core::comment::FileComment;
use crate::core::line_map::DiffLineMap;
use crate::github::types::PullFile;
use crate::plugins::PostProcessor;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Moves reviewer line numbers onto lines GitHub accepts inline comments on.
///
/// A line that cannot be placed is cleared, so the comment still reaches
/// the review body when posted.
pub struct LineSnapper;

impl LineSnapper {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PostProcessor for LineSnapper {
    fn id(&self) -> &str {
        "line_anchor"
    }

    async fn run(&self, mut comments: Vec<FileComment>, files: &[PullFile]) -> Result<Vec<FileComment>> {
        let maps: HashMap<&str, DiffLineMap> = files
            .iter()
            .filter_map(|f| Some((f.filename.as_str(), DiffLineMap::from_patch(f.patch.as_deref()?))))
            .collect();

        for comment in &mut comments {
            let Some(line) = comment.line else { continue };
            let snapped = maps
                .get(comment.filename.as_str())
                .and_then(|map| map.nearest_anchor(line))
                .map(|anchor| anchor.line);
            if snapped != Some(line) {
                debug!(file = %comment.filename, from = line, to = ?snapped, "Re-anchored comment");
            }
            comment.line = snapped;
        }

        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, patch: Option<&str>) -> PullFile {
        PullFile {
            filename: name.into(),
            status: "modified".into(),
            additions: 1,
            deletions: 0,
            changes: 1,
            patch: patch.map(str::to_string),
        }
    }

    fn fc(name: &str, line: Option<u32>) -> FileComment {
        FileComment {
            filename: name.into(),
            line,
            comment: "c".into(),
        }
    }

    #[tokio::test]
    async fn test_snaps_or_clears_lines() {
        let files = vec![
            file("a.rs", Some("@@ -10,2 +10,3 @@\n x\n+y\n z")),
            file("image.png", None),
        ];
        let comments = vec![
            fc("a.rs", Some(11)),
            fc("a.rs", Some(14)),
            fc("a.rs", Some(40)),
            fc("a.rs", None),
            fc("image.png", Some(1)),
            fc("missing.rs", Some(3)),
        ];

        let out = LineSnapper::new().run(comments, &files).await.unwrap();
        let lines: Vec<Option<u32>> = out.iter().map(|c| c.line).collect();
        assert_eq!(lines, vec![Some(11), Some(12), None, None, None, None]);
    }
}
