use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::comment::{FileComment, ReviewContext, ReviewLanguage, ReviewResult, ReviewStyle};
use crate::core::context::LLMContextChunk;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub max_diff_chars: usize,
    pub max_context_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_diff_chars: 120_000,
            max_context_chars: 20_000,
        }
    }
}

pub struct ReviewPromptBuilder {
    config: PromptConfig,
}

struct StyleText {
    style: &'static str,
    file_comments: &'static str,
}

fn style_text(language: ReviewLanguage, style: ReviewStyle) -> StyleText {
    match (language, style) {
        (ReviewLanguage::En, ReviewStyle::Brief) => StyleText {
            style: "Be brief and concise. Focus only on critical issues in the summary.",
            file_comments: "Leave fileComments as an empty array [].",
        },
        (ReviewLanguage::Ko, ReviewStyle::Brief) => StyleText {
            style: "간략하고 핵심만 언급해주세요. summary에 중요한 문제만 집중하세요.",
            file_comments: "fileComments는 빈 배열 []로 남겨주세요.",
        },
        (ReviewLanguage::En, ReviewStyle::Strict) => StyleText {
            style: "Be thorough and strict. Point out all issues including minor ones, coding standards, and best practices.",
            file_comments: "Provide detailed fileComments for all issues found.",
        },
        (ReviewLanguage::Ko, ReviewStyle::Strict) => StyleText {
            style: "엄격하고 철저하게 검토해주세요. 사소한 문제, 코딩 표준, 모범 사례까지 모두 지적해주세요.",
            file_comments: "발견한 모든 문제에 대해 상세한 fileComments를 작성해주세요.",
        },
        (ReviewLanguage::En, ReviewStyle::Detailed) => StyleText {
            style: "Provide detailed and constructive feedback with explanations.",
            file_comments: "Comment only on lines that have serious issues or need improvement.",
        },
        (ReviewLanguage::Ko, ReviewStyle::Detailed) => StyleText {
            style: "상세하고 건설적인 피드백을 설명과 함께 제공해주세요.",
            file_comments: "심각한 문제나 개선이 필요한 라인에만 코멘트를 답니다.",
        },
    }
}

impl ReviewPromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    pub fn system_prompt(language: ReviewLanguage) -> String {
        match language {
            ReviewLanguage::En => {
                "You are a code review expert. Provide detailed and constructive feedback."
            }
            ReviewLanguage::Ko => {
                "당신은 코드 리뷰 전문가입니다. 상세하고 건설적인 피드백을 제공해주세요."
            }
        }
        .to_string()
    }

    /// Returns `(system_prompt, user_prompt)`.
    pub fn build_prompt(&self, diff: &str, context: &ReviewContext) -> (String, String) {
        let language_instruction = match context.review_language {
            ReviewLanguage::En => "Please write your review in English",
            ReviewLanguage::Ko => "한국어로 작성해주세요",
        };
        let text = style_text(context.review_language, context.review_style);

        let description = if context.pr_description.trim().is_empty() {
            "None"
        } else {
            context.pr_description.as_str()
        };
        let files = context
            .file_changes
            .iter()
            .map(|f| format!("- {} ({})", f.filename, f.status.as_str()))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            r#"Please review the following Pull Request.

**PR Title:** {title}
**PR Description:** {description}

**Changed Files:**
{files}

**Full Diff:**
```diff
{diff}
```

Please write your review in the following JSON format:

{{
  "summary": "Overall summary, evaluation, and improvement suggestions for the PR",
  "fileComments": [
    {{
      "filename": "file path",
      "line": line number (based on changed lines, number),
      "comment": "specific comment for this line"
    }}
  ]
}}

**Important Rules:**
1. summary should include overall evaluation and improvement suggestions for the PR
2. fileComments are reviews for specific code lines
3. line should be the line number of the changed line (based on + lines in diff)
4. {file_comments}
5. Each comment should include specific and actionable advice
6. {language}
7. {style}
8. Use line breaks to ensure readability for sentences and lists
9. Respond in valid JSON format"#,
            title = context.pr_title,
            description = description,
            files = files,
            diff = self.truncate_diff(diff),
            file_comments = text.file_comments,
            language = language_instruction,
            style = text.style,
        );

        if let Some(additional) = self.additional_requirements(context) {
            prompt.push_str("\n\n**Additional Requirements:**\n");
            prompt.push_str(&additional);
        }

        (Self::system_prompt(context.review_language), prompt)
    }

    /// Repository context followed by the user's custom prompt.
    pub fn additional_requirements(&self, context: &ReviewContext) -> Option<String> {
        let repo_context = self.format_context(&context.context_chunks);
        let custom = context
            .custom_prompt
            .as_deref()
            .filter(|c| !c.trim().is_empty());
        match (repo_context.is_empty(), custom) {
            (true, None) => None,
            (true, Some(custom)) => Some(custom.to_string()),
            (false, None) => Some(repo_context),
            (false, Some(custom)) => Some(format!("{}\n\n{}", repo_context, custom)),
        }
    }

    fn truncate_diff<'a>(&self, diff: &'a str) -> std::borrow::Cow<'a, str> {
        if self.config.max_diff_chars == 0 || diff.len() <= self.config.max_diff_chars {
            return diff.into();
        }
        let mut cut = self.config.max_diff_chars;
        while !diff.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n... [diff truncated]", &diff[..cut]).into()
    }

    /// Joins context chunks, cutting the one that crosses the budget at a char boundary.
    fn format_context(&self, chunks: &[LLMContextChunk]) -> String {
        let limit = self.config.max_context_chars;
        let mut output = String::new();
        let mut used = 0usize;

        for chunk in chunks {
            let block = format!("{}\n", chunk.content.trim_end());
            let chars = block.chars().count();
            if limit > 0 && used.saturating_add(chars) > limit {
                let kept: String = block.chars().take(limit - used).collect();
                output.push_str(kept.trim_end());
                output.push_str("\n... [context truncated]\n");
                break;
            }
            used += chars;
            output.push_str(&block);
        }

        output.trim_end().to_string()
    }
}

/// Parses a reviewer's reply into a [`ReviewResult`].
///
/// The JSON object is taken from the first `{` to the last `}` so fenced or
/// chatty replies still parse. Anything unparseable becomes the summary.
pub fn parse_review_response(response: &str) -> ReviewResult {
    let fallback = || ReviewResult {
        summary: response.to_string(),
        ..Default::default()
    };

    let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) else {
        return fallback();
    };
    if end < start {
        return fallback();
    }

    let parsed: Value = match serde_json::from_str(&response[start..=end]) {
        Ok(value) => value,
        Err(_) => return fallback(),
    };
    let Some(object) = parsed.as_object() else {
        return fallback();
    };

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let file_comments = object
        .get("fileComments")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_file_comment).collect())
        .unwrap_or_default();

    let suggestions = object
        .get("suggestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    ReviewResult {
        summary,
        file_comments,
        suggestions,
    }
}

fn parse_file_comment(value: &Value) -> Option<FileComment> {
    let filename = value.get("filename")?.as_str()?.to_string();
    let comment = value
        .get("comment")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let line = match value.get("line") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
    .and_then(|n| u32::try_from(n).ok());

    Some(FileComment {
        filename,
        line,
        comment,
    })
}
