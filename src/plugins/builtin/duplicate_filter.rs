use crate::core::comment::FileComment;
use crate::github::types::PullFile;
use crate::plugins::PostProcessor;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

pub struct DuplicateFilter;

impl DuplicateFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PostProcessor for DuplicateFilter {
    fn id(&self) -> &str {
        "duplicate_filter"
    }

    async fn run(&self, mut comments: Vec<FileComment>, _files: &[PullFile]) -> Result<Vec<FileComment>> {
        let mut seen = HashSet::new();
        comments.retain(|comment| {
            seen.insert((
                comment.filename.clone(),
                comment.line,
                comment.comment.trim().to_string(),
            ))
        });

        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fc(line: Option<u32>, text: &str) -> FileComment {
        FileComment {
            filename: "a.rs".into(),
            line,
            comment: text.into(),
        }
    }

    #[tokio::test]
    async fn test_keeps_first_of_each_duplicate() {
        let comments = vec![
            fc(Some(1), "x"),
            fc(Some(1), "x "),
            fc(Some(2), "x"),
            fc(None, "x"),
        ];
        let kept = DuplicateFilter::new().run(comments, &[]).await.unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[1].line, Some(2));
    }
}
