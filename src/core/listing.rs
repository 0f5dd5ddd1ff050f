use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::Config;
use crate::github::types::{PullRequest, Repository};

pub const PER_PAGE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgFilter {
    All,
    Personal,
    Org(String),
}

impl OrgFilter {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "all" => Self::All,
            "personal" => Self::Personal,
            org => Self::Org(org.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
}

/// Sorted logins of the organizations owning any of `repos`.
pub fn organizations(repos: &[Repository]) -> Vec<String> {
    repos
        .iter()
        .filter(|repo| repo.is_org_owned())
        .map(|repo| repo.owner.login.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn filter_repos<'a>(
    repos: &'a [Repository],
    search: &str,
    org: &OrgFilter,
    viewer_login: &str,
) -> Vec<&'a Repository> {
    let needle = search.trim().to_lowercase();
    repos
        .iter()
        .filter(|repo| {
            needle.is_empty()
                || repo.name.to_lowercase().contains(&needle)
                || repo
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
        })
        .filter(|repo| match org {
            OrgFilter::All => true,
            OrgFilter::Personal => repo.owner.login.eq_ignore_ascii_case(viewer_login),
            OrgFilter::Org(login) => &repo.owner.login == login,
        })
        .collect()
}

pub fn filter_pulls<'a>(pulls: &'a [PullRequest], filter: &str) -> Vec<&'a PullRequest> {
    let needle = filter.trim().to_lowercase();
    pulls
        .iter()
        .filter(|pr| {
            needle.is_empty()
                || pr.title.to_lowercase().contains(&needle)
                || pr.user.login.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Slices out a 1-based page; out-of-range pages are clamped.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total_pages = items.len().div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;

    Page {
        items: items.iter().skip(start).take(per_page).cloned().collect(),
        page,
        total_pages,
    }
}

/// Whether a review can be requested with this configuration.
pub fn has_valid_config(config: &Config) -> bool {
    if config.use_mcp {
        return config
            .mcp
            .command
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
    }
    config.provider_api_key().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::types::{GitRef, User};
    use chrono::Utc;

    fn user(login: &str, kind: &str) -> User {
        User {
            login: login.to_string(),
            id: 1,
            avatar_url: None,
            name: None,
            account_type: Some(kind.to_string()),
        }
    }

    fn repo(owner: &str, kind: &str, name: &str, description: Option<&str>) -> Repository {
        Repository {
            name: name.to_string(),
            full_name: format!("{}/{}", owner, name),
            owner: user(owner, kind),
            description: description.map(str::to_string),
            language: None,
            private: false,
            html_url: String::new(),
            updated_at: None,
            default_branch: None,
        }
    }

    fn pull(number: u64, title: &str, author: &str) -> PullRequest {
        let git_ref = GitRef {
            ref_name: "main".into(),
            sha: "abc".into(),
        };
        PullRequest {
            number,
            title: title.to_string(),
            body: None,
            user: user(author, "User"),
            state: "open".into(),
            html_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            head: git_ref.clone(),
            base: git_ref,
            additions: None,
            deletions: None,
            changed_files: None,
            draft: None,
        }
    }

    fn sample() -> Vec<Repository> {
        vec![
            repo("zeta-org", "Organization", "api", Some("Public API")),
            repo("Alice", "User", "dotfiles", None),
            repo("acme", "Organization", "web", Some("Storefront")),
            repo("acme", "Organization", "infra", None),
        ]
    }

    #[test]
    fn test_organizations_sorted_unique() {
        assert_eq!(organizations(&sample()), vec!["acme", "zeta-org"]);
    }

    #[test]
    fn test_filter_repos() {
        let repos = sample();
        let names = |found: Vec<&Repository>| found.iter().map(|r| r.name.clone()).collect::<Vec<_>>();

        assert_eq!(names(filter_repos(&repos, "API", &OrgFilter::All, "alice")), vec!["api"]);
        assert_eq!(names(filter_repos(&repos, "store", &OrgFilter::All, "alice")), vec!["web"]);
        assert_eq!(
            names(filter_repos(&repos, "", &OrgFilter::Personal, "alice")),
            vec!["dotfiles"]
        );
        assert_eq!(
            names(filter_repos(&repos, "", &OrgFilter::parse("acme"), "alice")),
            vec!["web", "infra"]
        );
        assert_eq!(OrgFilter::parse("all"), OrgFilter::All);
    }

    #[test]
    fn test_filter_pulls_by_title_or_author() {
        let pulls = vec![pull(1, "Fix login", "bob"), pull(2, "Add cache", "carol")];
        assert_eq!(filter_pulls(&pulls, "LOGIN")[0].number, 1);
        assert_eq!(filter_pulls(&pulls, "car")[0].number, 2);
        assert_eq!(filter_pulls(&pulls, "").len(), 2);
        assert!(filter_pulls(&pulls, "nobody").is_empty());
    }

    #[test]
    fn test_paginate_clamps() {
        let items: Vec<u32> = (1..=23).collect();
        let page = paginate(&items, 3, PER_PAGE);
        assert_eq!(page.items, vec![21, 22, 23]);
        assert_eq!(page.total_pages, 3);

        assert_eq!(paginate(&items, 99, PER_PAGE).page, 3);
        assert_eq!(paginate(&items, 0, PER_PAGE).items[0], 1);

        let empty: Page<u32> = paginate(&[], 2, PER_PAGE);
        assert_eq!((empty.page, empty.total_pages), (1, 1));
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_has_valid_config() {
        let mut config = Config::default();
        assert!(!has_valid_config(&config));
        config.claude_api_key = Some("k".into());
        assert!(has_valid_config(&config));

        config.use_mcp = true;
        assert!(!has_valid_config(&config));
        config.mcp.command = Some("node".into());
        assert!(has_valid_config(&config));
    }
}
