mod adapters;
mod config;
mod core;
mod github;
mod mcp;
mod plugins;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{CliOverrides, Config};
use crate::core::comment::FileComment;
use crate::core::draft::{parse_comment_spec, ReviewDraft};
use crate::core::line_map::{locate_in_diff, locate_in_file, DiffWindow, FileWindow, RowKind};
use crate::core::listing::{self, OrgFilter, Page, PER_PAGE};
use crate::core::posting::post_review;
use crate::core::reviewer::{review_pull_request, PullRef};
use crate::core::threads::{
    build_threads, build_timeline, group_by_review, EntryKind, ReviewThread, TimelineEntry,
};
use crate::core::{DiffLineMap, DiffParser};
use crate::github::types::{PullFile, PullRequest, Repository, ReviewEvent};
use crate::github::GitHubClient;
use crate::mcp::protocol::ToolInfo;
use crate::mcp::McpClient;

#[derive(Parser)]
#[command(name = "prdesk")]
#[command(about = "Browse pull requests, draft AI code reviews and post them to GitHub", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// AI provider: claude, openai or gemini
    #[arg(long, global = true)]
    provider: Option<String>,

    #[arg(long, global = true)]
    model: Option<String>,

    #[arg(long, global = true)]
    temperature: Option<f32>,

    #[arg(long, global = true)]
    max_tokens: Option<usize>,

    /// Review language: ko or en
    #[arg(long, global = true)]
    language: Option<String>,

    /// Review style: brief, detailed or strict
    #[arg(long, global = true)]
    style: Option<String>,

    /// Review through the configured MCP server
    #[arg(long, global = true)]
    mcp: bool,

    #[arg(long, global = true, default_value = "markdown")]
    output_format: OutputFormat,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List your repositories
    Repos {
        #[arg(long, default_value = "")]
        search: String,

        /// all, personal or an organization login
        #[arg(long, default_value = "all")]
        org: String,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// List organizations that own your repositories
    Orgs,
    /// List pull requests of a repository
    Prs {
        #[arg(long)]
        repo: String,

        #[arg(long, default_value = "open")]
        state: String,

        #[arg(long, default_value = "")]
        filter: String,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Show a pull request with its files, reviews and comments
    Show {
        #[arg(long)]
        repo: String,

        #[arg(long)]
        pr: u64,
    },
    /// Show inline review threads
    Threads {
        #[arg(long)]
        repo: String,

        #[arg(long)]
        pr: u64,
    },
    /// Generate an AI review and save it as a draft
    Review {
        #[arg(long)]
        repo: String,

        #[arg(long)]
        pr: u64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    Draft {
        #[command(subcommand)]
        command: DraftCommands,
    },
    /// Post a draft to GitHub
    Post {
        draft: PathBuf,

        #[arg(long, default_value = "comment")]
        event: ReviewEvent,
    },
    /// Find a line in a pull request's diff and, optionally, in the file at a commit
    Locate {
        #[arg(long)]
        repo: String,

        #[arg(long)]
        pr: u64,

        #[arg(long)]
        file: String,

        #[arg(long)]
        line: u32,

        #[arg(long)]
        commit: Option<String>,

        #[arg(long, default_value_t = 3)]
        context: usize,
    },
    /// List the tools exposed by the configured MCP server
    McpTools,
}

#[derive(Subcommand)]
enum DraftCommands {
    Show {
        file: PathBuf,
    },
    Edit {
        file: PathBuf,

        #[arg(long, conflicts_with = "summary_file")]
        summary: Option<String>,

        #[arg(long)]
        summary_file: Option<PathBuf>,

        /// path:line:text (leave line empty for a file-level comment)
        #[arg(long)]
        add: Vec<String>,

        /// index:path:line:text
        #[arg(long)]
        set: Vec<String>,

        /// Comment index to remove; applied after --set, highest first
        #[arg(long)]
        remove: Vec<usize>,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    config.apply_env();
    config.merge_with_cli(CliOverrides {
        provider: cli.provider.clone(),
        model: cli.model.clone(),
        temperature: cli.temperature,
        max_tokens: cli.max_tokens,
        language: cli.language.clone(),
        style: cli.style.clone(),
        use_mcp: cli.mcp,
    });
    config.normalize();

    let format = cli.output_format;
    match cli.command {
        Commands::Repos { search, org, page } => {
            repos_command(&config, &search, &org, page, format).await?;
        }
        Commands::Orgs => orgs_command(&config, format).await?,
        Commands::Prs {
            repo,
            state,
            filter,
            page,
        } => {
            prs_command(&config, &repo, &state, &filter, page, format).await?;
        }
        Commands::Show { repo, pr } => {
            show_command(&config, PullRef::parse(&repo, pr)?, format).await?;
        }
        Commands::Threads { repo, pr } => {
            threads_command(&config, PullRef::parse(&repo, pr)?, format).await?;
        }
        Commands::Review { repo, pr, output } => {
            review_command(&config, PullRef::parse(&repo, pr)?, output, format).await?;
        }
        Commands::Draft { command } => draft_command(command, format)?,
        Commands::Post { draft, event } => post_command(&config, &draft, event).await?,
        Commands::Locate {
            repo,
            pr,
            file,
            line,
            commit,
            context,
        } => {
            let pull = PullRef::parse(&repo, pr)?;
            locate_command(&config, pull, &file, line, commit, context, format).await?;
        }
        Commands::McpTools => mcp_tools_command(&config, format).await?,
    }

    Ok(())
}

fn github_client(config: &Config) -> Result<GitHubClient> {
    let token = config
        .github_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .context("GitHub token not configured. Set github_token in .prdesk.yml or GITHUB_TOKEN")?;
    GitHubClient::new(token, config.github_api_url.as_deref())
}

fn emit<T: Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    markdown: impl FnOnce(&T) -> String,
) -> Result<()> {
    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Markdown => markdown(value),
    };
    println!("{}", output);
    Ok(())
}

async fn repos_command(
    config: &Config,
    search: &str,
    org: &str,
    page: usize,
    format: OutputFormat,
) -> Result<()> {
    let client = github_client(config)?;
    let viewer = client.authenticated_user().await?;
    let repos = client.list_user_repos().await?;

    let filtered: Vec<Repository> =
        listing::filter_repos(&repos, search, &OrgFilter::parse(org), &viewer.login)
            .into_iter()
            .cloned()
            .collect();
    let page = listing::paginate(&filtered, page, PER_PAGE);

    emit(format, &page, format_repos_markdown)
}

async fn orgs_command(config: &Config, format: OutputFormat) -> Result<()> {
    let client = github_client(config)?;
    let repos = client.list_user_repos().await?;
    let orgs = listing::organizations(&repos);

    emit(format, &orgs, |orgs| {
        if orgs.is_empty() {
            return "No organizations.".to_string();
        }
        orgs.iter().map(|o| format!("- {}", o)).collect::<Vec<_>>().join("\n")
    })
}

async fn prs_command(
    config: &Config,
    repo: &str,
    state: &str,
    filter: &str,
    page: usize,
    format: OutputFormat,
) -> Result<()> {
    if !matches!(state, "open" | "closed" | "all") {
        bail!("State must be open, closed or all");
    }
    let pull = PullRef::parse(repo, 0)?;
    let client = github_client(config)?;
    let pulls = client.list_pulls(&pull.owner, &pull.repo, state).await?;

    let filtered: Vec<PullRequest> = listing::filter_pulls(&pulls, filter)
        .into_iter()
        .cloned()
        .collect();
    let page = listing::paginate(&filtered, page, PER_PAGE);

    emit(format, &page, format_pulls_markdown)
}

#[derive(Serialize)]
struct PullDetails {
    pull_request: PullRequest,
    files: Vec<PullFile>,
    timeline: Vec<TimelineEntry>,
    threads: Vec<ReviewThread>,
}

async fn show_command(config: &Config, pull: PullRef, format: OutputFormat) -> Result<()> {
    let client = github_client(config)?;
    let (owner, repo, number) = (&pull.owner, &pull.repo, pull.number);

    let (pull_request, files, reviews, comments, review_comments) = tokio::try_join!(
        client.get_pull(owner, repo, number),
        client.list_pull_files(owner, repo, number),
        client.list_reviews(owner, repo, number),
        client.list_issue_comments(owner, repo, number),
        client.list_review_comments(owner, repo, number),
    )?;

    let details = PullDetails {
        pull_request,
        files,
        timeline: build_timeline(&reviews, &comments),
        threads: build_threads(&review_comments),
    };

    emit(format, &details, format_pull_markdown)
}

async fn threads_command(config: &Config, pull: PullRef, format: OutputFormat) -> Result<()> {
    let client = github_client(config)?;
    let comments = client
        .list_review_comments(&pull.owner, &pull.repo, pull.number)
        .await?;
    let threads = build_threads(&comments);

    emit(format, &threads, |threads| format_threads_markdown(threads))
}

fn default_draft_path(pull: &PullRef) -> PathBuf {
    PathBuf::from(".prdesk")
        .join("drafts")
        .join(format!("{}-{}-{}.json", pull.owner, pull.repo, pull.number))
}

async fn review_command(
    config: &Config,
    pull: PullRef,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    if !listing::has_valid_config(config) {
        bail!(
            "No reviewer configured. Set an API key for '{}' or enable MCP with a server command",
            config.provider
        );
    }

    let client = github_client(config)?;
    let draft = review_pull_request(config, &client, &pull).await?;

    let path = output.unwrap_or_else(|| default_draft_path(&pull));
    draft.save(&path)?;
    info!(path = %path.display(), comments = draft.file_comments.len(), "Draft saved");

    emit(format, &draft, format_draft_markdown)
}

fn draft_command(command: DraftCommands, format: OutputFormat) -> Result<()> {
    match command {
        DraftCommands::Show { file } => {
            let draft = ReviewDraft::load(&file)?;
            emit(format, &draft, format_draft_markdown)
        }
        DraftCommands::Edit {
            file,
            summary,
            summary_file,
            add,
            set,
            mut remove,
        } => {
            let mut draft = ReviewDraft::load(&file)?;

            if let Some(summary) = summary {
                draft.set_summary(summary);
            }
            if let Some(path) = summary_file {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                draft.set_summary(text);
            }
            for spec in &set {
                let (index, rest) = spec
                    .split_once(':')
                    .with_context(|| format!("Expected index:path:line:text, got '{}'", spec))?;
                let index: usize = index
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid comment index '{}'", index))?;
                draft.update_comment(index, parse_comment_spec(rest)?)?;
            }
            remove.sort_unstable_by(|a, b| b.cmp(a));
            remove.dedup();
            for index in remove {
                draft.remove_comment(index)?;
            }
            for spec in &add {
                draft.add_comment(parse_comment_spec(spec)?)?;
            }

            draft.save(&file)?;
            emit(format, &draft, format_draft_markdown)
        }
    }
}

async fn post_command(config: &Config, path: &Path, event: ReviewEvent) -> Result<()> {
    let mut draft = ReviewDraft::load(path)?;
    let client = github_client(config)?;
    let outcome = post_review(&client, &mut draft, event, path).await?;

    println!(
        "Posted to {}/{}#{} ({} inline, {} in body) {}",
        draft.owner,
        draft.repo,
        draft.pr_number,
        outcome.inline_comments,
        outcome.body_comments,
        outcome.html_url
    );
    Ok(())
}

#[derive(Serialize)]
struct LocateResult {
    file: String,
    line: u32,
    /// Legacy diff position of the line on the new side.
    position: Option<u32>,
    diff: Option<DiffWindow>,
    /// New-side lines that accept inline comments, shown when the line is outside the diff.
    commentable_lines: Vec<u32>,
    source: Option<FileWindow>,
}

async fn locate_command(
    config: &Config,
    pull: PullRef,
    file: &str,
    line: u32,
    commit: Option<String>,
    context: usize,
    format: OutputFormat,
) -> Result<()> {
    let client = github_client(config)?;
    let files = client
        .list_pull_files(&pull.owner, &pull.repo, pull.number)
        .await?;
    let pull_file = files
        .iter()
        .find(|f| f.filename == file)
        .with_context(|| format!("{} is not part of this pull request", file))?;

    let map = pull_file
        .patch
        .as_deref()
        .map(DiffLineMap::from_patch)
        .unwrap_or_default();
    let diff = locate_in_diff(&map, line, context);
    let position = map.position_for(line);
    let commentable_lines = if diff.is_none() {
        map.commentable_lines()
    } else {
        Vec::new()
    };

    let source = match commit {
        Some(sha) => {
            let content = client
                .get_file_content(&pull.owner, &pull.repo, file, Some(&sha))
                .await?;
            locate_in_file(&content, line as usize, context)
        }
        None => None,
    };

    let result = LocateResult {
        file: file.to_string(),
        line,
        position,
        diff,
        commentable_lines,
        source,
    };
    emit(format, &result, format_locate_markdown)
}

async fn mcp_tools_command(config: &Config, format: OutputFormat) -> Result<()> {
    let mut client = McpClient::connect(&config.mcp).await?;
    if let Some(server) = client.server_info() {
        info!(server = %server.name, "Listing MCP tools");
    }
    let tools = client.list_tools().await;
    client.disconnect().await;
    let tools = tools?;

    emit(format, &tools, |tools: &Vec<ToolInfo>| {
        tools
            .iter()
            .map(|t| match &t.description {
                Some(d) => format!("- **{}**: {}", t.name, d),
                None => format!("- **{}**", t.name),
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn page_footer<T>(page: &Page<T>) -> String {
    format!("\n_Page {} of {}_", page.page, page.total_pages)
}

fn format_repos_markdown(page: &Page<Repository>) -> String {
    let mut out = String::from("# Repositories\n\n");
    if page.items.is_empty() {
        out.push_str("No repositories match.\n");
    }
    for repo in &page.items {
        let visibility = if repo.private { " 🔒" } else { "" };
        out.push_str(&format!("- **{}**{}", repo.full_name, visibility));
        if let Some(language) = &repo.language {
            out.push_str(&format!(" `{}`", language));
        }
        if let Some(description) = repo.description.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(&format!(" - {}", description));
        }
        out.push('\n');
    }
    out.push_str(&page_footer(page));
    out
}

fn format_pulls_markdown(page: &Page<PullRequest>) -> String {
    let mut out = String::from("# Pull Requests\n\n");
    if page.items.is_empty() {
        out.push_str("No pull requests match.\n");
    }
    for pr in &page.items {
        let draft = if pr.draft.unwrap_or(false) { " (draft)" } else { "" };
        out.push_str(&format!(
            "- #{} **{}**{} by @{} ({} → {}), updated {}\n",
            pr.number,
            pr.title,
            draft,
            pr.user.login,
            pr.head.ref_name,
            pr.base.ref_name,
            pr.updated_at.format("%Y-%m-%d")
        ));
    }
    out.push_str(&page_footer(page));
    out
}

fn format_pull_markdown(details: &PullDetails) -> String {
    let pr = &details.pull_request;
    let mut out = format!(
        "# #{} {}\n\n@{} wants to merge `{}` into `{}` ({})\n",
        pr.number, pr.title, pr.user.login, pr.head.ref_name, pr.base.ref_name, pr.state
    );
    if let Some(body) = pr.body.as_deref().filter(|b| !b.trim().is_empty()) {
        out.push_str(&format!("\n{}\n", body.trim()));
    }

    out.push_str("\n## Files\n\n");
    for file in &details.files {
        let hunks = match file.patch.as_deref() {
            Some(patch) => {
                let count = DiffParser::parse_patch(&file.filename, patch).hunks.len();
                format!(", {} hunk{}", count, if count == 1 { "" } else { "s" })
            }
            None => ", no textual diff".to_string(),
        };
        out.push_str(&format!(
            "- `{}` {} (+{} -{}{})\n",
            file.filename, file.status, file.additions, file.deletions, hunks
        ));
    }

    out.push_str("\n## Activity\n");
    if details.timeline.is_empty() {
        out.push_str("\nNo reviews or comments yet.\n");
    }
    let by_review = group_by_review(&details.threads);
    for entry in &details.timeline {
        out.push_str(&format!(
            "\n### @{} {} ({})\n",
            entry.author,
            entry.state,
            entry.submitted_at.format("%Y-%m-%d %H:%M")
        ));
        if !entry.body.trim().is_empty() {
            out.push_str(&format!("\n{}\n", entry.body.trim()));
        }
        let inline = match entry.kind {
            EntryKind::Review => by_review.get(&entry.id),
            EntryKind::Comment => None,
        };
        if let Some(inline) = inline {
            out.push('\n');
            for thread in inline {
                out.push_str(&format_thread_markdown(thread));
            }
        }
    }
    out
}

fn format_threads_markdown(threads: &[ReviewThread]) -> String {
    if threads.is_empty() {
        return "No inline comments.".to_string();
    }
    threads.iter().map(format_thread_markdown).collect()
}

fn format_thread_markdown(thread: &ReviewThread) -> String {
    let line = thread
        .line
        .map(|l| format!(":{}", l))
        .unwrap_or_default();
    let outdated = if thread.outdated { " (outdated)" } else { "" };
    let mut out = format!("- `{}{}`{}\n", thread.path, line, outdated);
    if let Some(root) = thread.comments.first() {
        out.push_str(&format!("  @{}: {}\n", root.author, one_line(&root.body)));
    }
    for reply in thread.replies() {
        out.push_str(&format!("    ↳ @{}: {}\n", reply.author, one_line(&reply.body)));
    }
    out
}

fn one_line(text: &str) -> String {
    text.trim().replace('\n', " ")
}

fn format_comment(index: usize, comment: &FileComment) -> String {
    let location = match comment.line {
        Some(line) => format!("{}:{}", comment.filename, line),
        None => comment.filename.clone(),
    };
    format!("{}. `{}` {}", index, location, comment.comment.trim())
}

fn format_draft_markdown(draft: &ReviewDraft) -> String {
    let status = if draft.posted { "posted" } else { "draft" };
    let mut out = format!(
        "# Review of {}/{}#{} ({}, {})\n\n{}\n",
        draft.owner, draft.repo, draft.pr_number, draft.provider, status, draft.summary
    );
    if !draft.file_comments.is_empty() {
        out.push_str("\n## Comments\n\n");
        for (i, comment) in draft.file_comments.iter().enumerate() {
            out.push_str(&format_comment(i, comment));
            out.push('\n');
        }
    }
    out
}

fn format_locate_markdown(result: &LocateResult) -> String {
    let mut out = format!("# {}:{}\n", result.file, result.line);

    match &result.diff {
        Some(window) => {
            out.push_str("\n## Diff\n\n```diff\n");
            for row in &window.rows {
                let marker = if row.index == window.target_row { "▶" } else { " " };
                let (sign, number) = match row.kind {
                    RowKind::HunkHeader => ("", None),
                    RowKind::Added => ("+", row.new_line),
                    RowKind::Removed => ("-", row.old_line),
                    RowKind::Context => (" ", row.new_line),
                };
                let number = number.map(|n| format!("{:>5}", n)).unwrap_or_else(|| " ".repeat(5));
                out.push_str(&format!("{}{} {}{}\n", marker, number, sign, row.text));
            }
            out.push_str("```\n");
        }
        None => {
            out.push_str("\nLine is not part of the diff.\n");
            if let (Some(first), Some(last)) =
                (result.commentable_lines.first(), result.commentable_lines.last())
            {
                out.push_str(&format!(
                    "Commentable lines: {} between {} and {}.\n",
                    result.commentable_lines.len(),
                    first,
                    last
                ));
            }
        }
    }
    if let Some(position) = result.position {
        out.push_str(&format!("\nDiff position: {}\n", position));
    }

    if let Some(window) = &result.source {
        out.push_str("\n## File\n\n```\n");
        for (number, text) in &window.lines {
            let marker = if *number == window.target { "▶" } else { " " };
            out.push_str(&format!("{}{:>5} {}\n", marker, number, text));
        }
        out.push_str("```\n");
        if window.clamped {
            out.push_str(&format!("\nFile has only {} lines.\n", window.target));
        }
    }
    out
}
