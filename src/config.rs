use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::comment::{ReviewLanguage, ReviewStyle};

pub const CONFIG_FILE_NAMES: &[&str] = &[".prdesk.yml", ".prdesk.yaml"];
pub const DEFAULT_FOOTER_URL: &str = "https://github.com/prdesk/prdesk";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub github_token: Option<String>,
    pub github_api_url: Option<String>,

    #[serde(default = "default_provider")]
    pub provider: String,

    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,

    /// Overrides the provider's default model.
    pub model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    pub base_url: Option<String>,

    #[serde(default)]
    pub use_mcp: bool,

    #[serde(default)]
    pub mcp: McpServerConfig,

    pub custom_prompt: Option<String>,

    #[serde(default = "default_review_language")]
    pub review_language: String,

    #[serde(default = "default_review_style")]
    pub review_style: String,

    #[serde(default)]
    pub analyze_codebase: bool,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    pub footer_url: Option<String>,

    #[serde(default)]
    pub plugins: PluginConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: Option<String>,

    #[serde(default)]
    pub args: McpArgs,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

/// Server arguments, either as a YAML list or one shell-quoted string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpArgs {
    List(Vec<String>),
    Line(String),
}

impl Default for McpArgs {
    fn default() -> Self {
        McpArgs::List(Vec::new())
    }
}

impl McpServerConfig {
    pub fn args(&self) -> Result<Vec<String>> {
        match &self.args {
            McpArgs::List(args) => Ok(args.clone()),
            McpArgs::Line(line) => shell_words::split(line)
                .with_context(|| format!("Invalid MCP server arguments: {}", line)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_true")]
    pub empty_filter: bool,

    #[serde(default = "default_true")]
    pub duplicate_filter: bool,

    #[serde(default = "default_true")]
    pub line_anchor: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            empty_filter: true,
            duplicate_filter: true,
            line_anchor: true,
        }
    }
}

/// Global command-line flags that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub language: Option<String>,
    pub style: Option<String>,
    pub use_mcp: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_url: None,
            provider: default_provider(),
            claude_api_key: None,
            openai_api_key: None,
            gemini_api_key: None,
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: None,
            use_mcp: false,
            mcp: McpServerConfig::default(),
            custom_prompt: None,
            review_language: default_review_language(),
            review_style: default_review_style(),
            analyze_codebase: false,
            exclude_patterns: Vec::new(),
            footer_url: None,
            plugins: PluginConfig::default(),
        }
    }
}

impl Config {
    /// Loads `.prdesk.yml` from the working directory, then the home directory.
    pub fn load() -> Result<Self> {
        for name in CONFIG_FILE_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(CONFIG_FILE_NAMES[0]);
            if home_config.exists() {
                return Self::load_from(&home_config);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Fills unset secrets from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |slot: &mut Option<String>, key: &str| {
            if slot.as_deref().map_or(true, |v| v.trim().is_empty()) {
                if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                    *slot = Some(value);
                }
            }
        };
        fill(&mut self.github_token, "GITHUB_TOKEN");
        fill(&mut self.claude_api_key, "ANTHROPIC_API_KEY");
        fill(&mut self.openai_api_key, "OPENAI_API_KEY");
        fill(&mut self.gemini_api_key, "GEMINI_API_KEY");
        fill(&mut self.footer_url, "PRDESK_FOOTER_URL");
    }

    pub fn merge_with_cli(&mut self, cli: CliOverrides) {
        if let Some(provider) = cli.provider {
            self.provider = provider;
        }
        if let Some(model) = cli.model {
            self.model = Some(model);
        }
        if let Some(temperature) = cli.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = cli.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(language) = cli.language {
            self.review_language = language;
        }
        if let Some(style) = cli.style {
            self.review_style = style;
        }
        if cli.use_mcp {
            self.use_mcp = true;
        }
    }

    pub fn normalize(&mut self) {
        self.provider = self.provider.trim().to_ascii_lowercase();
        if self.provider.is_empty() {
            self.provider = default_provider();
        }

        if !self.temperature.is_finite() {
            self.temperature = default_temperature();
        }
        self.temperature = self.temperature.clamp(0.0, 2.0);

        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }

        self.review_language = match self.language() {
            ReviewLanguage::En => "en".to_string(),
            ReviewLanguage::Ko => "ko".to_string(),
        };
        self.review_style = self.style_str().to_string();

        for slot in [
            &mut self.model,
            &mut self.base_url,
            &mut self.custom_prompt,
            &mut self.github_api_url,
        ] {
            if slot.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *slot = None;
            }
        }

        if self.mcp.timeout_secs == 0 {
            self.mcp.timeout_secs = default_mcp_timeout();
        }
    }

    pub fn language(&self) -> ReviewLanguage {
        ReviewLanguage::parse_lenient(&self.review_language)
    }

    pub fn style(&self) -> ReviewStyle {
        ReviewStyle::parse_lenient(&self.review_style)
    }

    fn style_str(&self) -> &'static str {
        match self.style() {
            ReviewStyle::Brief => "brief",
            ReviewStyle::Detailed => "detailed",
            ReviewStyle::Strict => "strict",
        }
    }

    /// API key of the active provider, if one is set.
    pub fn provider_api_key(&self) -> Option<&str> {
        let key = match self.provider.as_str() {
            "claude" | "anthropic" => self.claude_api_key.as_deref(),
            "openai" => self.openai_api_key.as_deref(),
            "gemini" => self.gemini_api_key.as_deref(),
            _ => None,
        };
        key.filter(|k| !k.trim().is_empty())
    }

    pub fn footer_url(&self) -> &str {
        self.footer_url.as_deref().unwrap_or(DEFAULT_FOOTER_URL)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_patterns.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(path))
                .unwrap_or(false)
        })
    }
}

fn default_provider() -> String {
    "claude".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> usize {
    4000
}

fn default_review_language() -> String {
    "ko".to_string()
}

fn default_review_style() -> String {
    "detailed".to_string()
}

fn default_mcp_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}
