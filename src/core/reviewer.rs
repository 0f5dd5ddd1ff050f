//! Review strategies and the pipeline that turns a pull request into a draft.
//!
//! Hosted LLMs and MCP servers sit behind the same [`Reviewer`] contract:
//! both get the combined diff plus a [`ReviewContext`] and both answer with a
//! [`ReviewResult`] produced by [`parse_review_response`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::llm::{create_adapter, LLMAdapter, LLMRequest, ModelConfig, Provider};
use crate::config::{Config, McpServerConfig};
use crate::core::comment::{FileChange, ReviewContext, ReviewResult};
use crate::core::diff_parser::{build_review_diff, DiffParser};
use crate::core::draft::ReviewDraft;
use crate::core::prompt::{parse_review_response, PromptConfig, ReviewPromptBuilder};
use crate::github::GitHubClient;
use crate::mcp::protocol::{PullRequestInfo, ReviewFile, ReviewRequest};
use crate::mcp::McpClient;
use crate::plugins::{PluginManager, ReviewTarget};

/// Start of the attribution appended to every generated summary.
pub const FOOTER_SEPARATOR: &str = "\n\n---\n*🤖 Generated by ";

pub fn append_footer(summary: &str, url: &str) -> String {
    format!("{}{}[prdesk]({})*", summary, FOOTER_SEPARATOR, url)
}

/// A pull request addressed by owner, repository and number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRef {
    /// Parses `owner/name` plus a PR number.
    pub fn parse(repo: &str, number: u64) -> Result<Self> {
        let (owner, name) = repo
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .with_context(|| format!("Expected owner/name, got '{}'", repo))?;
        Ok(Self {
            owner: owner.to_string(),
            repo: name.to_string(),
            number,
        })
    }
}

#[async_trait]
pub trait Reviewer: Send + Sync {
    fn name(&self) -> &str;
    async fn review(&self, diff: &str, context: &ReviewContext) -> Result<ReviewResult>;
}

pub struct LlmReviewer {
    adapter: Box<dyn LLMAdapter>,
    provider: Provider,
    prompts: ReviewPromptBuilder,
}

impl LlmReviewer {
    pub fn new(adapter: Box<dyn LLMAdapter>, provider: Provider) -> Self {
        Self {
            adapter,
            provider,
            prompts: ReviewPromptBuilder::new(PromptConfig::default()),
        }
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    async fn review(&self, diff: &str, context: &ReviewContext) -> Result<ReviewResult> {
        let (system_prompt, user_prompt) = self.prompts.build_prompt(diff, context);
        debug!(
            model = self.adapter.model_name(),
            prompt_chars = user_prompt.len(),
            "Requesting review"
        );

        let response = self
            .adapter
            .complete(LLMRequest {
                system_prompt,
                user_prompt,
                temperature: None,
                max_tokens: None,
            })
            .await?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Review received"
            );
        }
        Ok(parse_review_response(&response.content))
    }
}

pub struct McpReviewer {
    server: McpServerConfig,
    pull: PullRef,
    prompts: ReviewPromptBuilder,
}

impl McpReviewer {
    pub fn new(server: McpServerConfig, pull: PullRef) -> Self {
        Self {
            server,
            pull,
            prompts: ReviewPromptBuilder::new(PromptConfig::default()),
        }
    }

    fn request(&self, context: &ReviewContext) -> ReviewRequest {
        let body = Some(context.pr_description.clone()).filter(|b| !b.is_empty());
        ReviewRequest {
            owner: self.pull.owner.clone(),
            repo: self.pull.repo.clone(),
            pr_number: self.pull.number,
            files: context
                .file_changes
                .iter()
                .map(|f| ReviewFile {
                    filename: f.filename.clone(),
                    status: f.status.as_str().to_string(),
                    additions: f.additions,
                    deletions: f.deletions,
                    patch: f.patch.clone(),
                })
                .collect(),
            pull_request: PullRequestInfo {
                title: context.pr_title.clone(),
                body,
            },
            custom_prompt: self.prompts.additional_requirements(context),
        }
    }
}

#[async_trait]
impl Reviewer for McpReviewer {
    fn name(&self) -> &str {
        "mcp"
    }

    async fn review(&self, _diff: &str, context: &ReviewContext) -> Result<ReviewResult> {
        let mut client = McpClient::connect(&self.server)
            .await
            .context("Failed to connect to MCP server")?;

        let outcome = client.request_review(&self.request(context)).await;
        client.disconnect().await;

        let text = outcome.context("MCP review request failed")?;
        Ok(parse_review_response(&text))
    }
}

/// MCP when enabled, otherwise the configured hosted provider.
pub fn select_reviewer(config: &Config, pull: &PullRef) -> Result<Box<dyn Reviewer>> {
    if config.use_mcp {
        if config
            .mcp
            .command
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
        {
            bail!("MCP is enabled but no server command is configured");
        }
        return Ok(Box::new(McpReviewer::new(config.mcp.clone(), pull.clone())));
    }

    let provider: Provider = config.provider.parse()?;
    let api_key = config
        .provider_api_key()
        .with_context(|| format!("API key not configured for provider '{}'", provider.as_str()))?;

    let mut model = ModelConfig::for_provider(provider);
    if let Some(name) = &config.model {
        model.model_name = name.clone();
    }
    model.api_key = Some(api_key.to_string());
    model.base_url = config.base_url.clone();
    model.temperature = config.temperature;
    model.max_tokens = config.max_tokens;

    let adapter = create_adapter(&model)?;
    Ok(Box::new(LlmReviewer::new(adapter, provider)))
}

/// Fetches the pull request, asks the selected reviewer and returns an unsaved draft.
pub async fn review_pull_request(
    config: &Config,
    client: &GitHubClient,
    pull: &PullRef,
) -> Result<ReviewDraft> {
    let pr = client
        .get_pull(&pull.owner, &pull.repo, pull.number)
        .await
        .context("Failed to fetch pull request")?;
    let mut files = client
        .list_pull_files(&pull.owner, &pull.repo, pull.number)
        .await
        .context("Failed to fetch pull request files")?;

    let total = files.len();
    files.retain(|f| !config.is_excluded(&f.filename));
    if files.is_empty() && total > 0 {
        bail!("All {} changed files match exclude_patterns", total);
    }
    if total != files.len() {
        info!(excluded = total - files.len(), "Skipping excluded files");
    }

    let diff = build_review_diff(&files);
    let parsed = DiffParser::parse_unified_diff(&diff).context("Failed to parse review diff")?;
    let hunks: usize = parsed.iter().map(|d| d.hunks.len()).sum();
    if hunks == 0 {
        bail!(
            "Nothing to review: none of the {} changed files has a textual diff",
            files.len()
        );
    }
    debug!(files = parsed.len(), hunks, diff_chars = diff.len(), "Built review diff");

    let mut plugins = PluginManager::new();
    plugins.load_builtin_plugins(config, client);

    let context_chunks = plugins
        .run_pre_analyzers(&ReviewTarget {
            owner: &pull.owner,
            repo: &pull.repo,
            head_sha: &pr.head.sha,
            files: &files,
        })
        .await;

    let context = ReviewContext {
        pr_title: pr.title.clone(),
        pr_description: pr.body.clone().unwrap_or_default(),
        file_changes: files.iter().map(FileChange::from).collect(),
        custom_prompt: config.custom_prompt.clone(),
        review_language: config.language(),
        review_style: config.style(),
        context_chunks,
    };

    let reviewer = select_reviewer(config, pull)?;
    info!(
        reviewer = reviewer.name(),
        pr = %format!("{}/{}#{}", pull.owner, pull.repo, pull.number),
        files = files.len(),
        "Generating review"
    );

    let mut result = reviewer.review(&diff, &context).await?;
    result.file_comments = plugins
        .run_post_processors(result.file_comments, &files)
        .await?;
    result.summary = append_footer(&result.summary, config.footer_url());

    Ok(ReviewDraft::new(
        &pull.owner,
        &pull.repo,
        pull.number,
        &pr.title,
        reviewer.name(),
        result,
    ))
}
