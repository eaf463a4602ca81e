//! Portal-specific link extraction.
//!
//! The portal is navigated by scraping anchors out of HTML. Each pattern is
//! held as a named [`Matcher`]; [`Portal`] bundles the matchers together
//! with the endpoints and the tool denylist for one portal flavour.

use std::collections::HashSet;
use std::hash::Hash;

use regex::Regex;
use tracing::debug;

use crate::credentials::Credentials;
use crate::engine::FormParams;
use crate::error::LoadError;

/// Either a dashed UUID or 32 bare hex digits.
const UUID: &str = r"[a-f0-9]+-[a-f0-9]+-[a-f0-9]+-[a-f0-9]+-[a-f0-9]+|[a-f0-9]{32}";

#[derive(Debug, Clone)]
pub struct Matcher {
    name: String,
    regex: Regex,
}

impl Matcher {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, LoadError> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|source| LoadError::InvalidPattern {
            name: name.clone(),
            source,
        })?;
        Ok(Self { name, regex })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every match in `text`, in order, as its capture groups (group 0
    /// excluded). Groups that did not participate come back empty.
    pub fn scan(&self, text: &str) -> Vec<Vec<String>> {
        let found: Vec<Vec<String>> = self
            .regex
            .captures_iter(text)
            .map(|caps| {
                caps.iter()
                    .skip(1)
                    .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                    .collect()
            })
            .collect();

        debug!("{} pattern matched {} times", self.name, found.len());
        found
    }

    /// First capture group of the first match.
    pub fn first(&self, text: &str) -> Option<String> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Drops repeats while keeping first-seen order.
pub fn dedup<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Site {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tool {
    pub url: String,
    pub title: String,
}

impl Tool {
    /// Older portals link to a page wrapping the tool in an iframe.
    pub fn is_legacy_page(&self) -> bool {
        self.url.contains("/page/")
    }
}

#[derive(Debug, Clone)]
pub struct Portal {
    pub login_path: String,
    pub logout_path: String,
    pub site_prefix: String,
    sites: Matcher,
    tools: Matcher,
    iframe: Matcher,
    workspace: Matcher,
    skip_tools: Vec<String>,
}

impl Portal {
    /// Sakai 10 (`/page/` links) and Sakai 11 (`/tool/` links) portals.
    pub fn sakai(skip_tools: Vec<String>) -> Result<Self, LoadError> {
        Ok(Self {
            login_path: "/portal/relogin".to_string(),
            logout_path: "/portal/logout".to_string(),
            site_prefix: "/portal/site/".to_string(),
            sites: Matcher::new(
                "site listing",
                &format!(r#"/portal/site/({UUID})" title="(.*?)""#),
            )?,
            tools: Matcher::new(
                "tool listing",
                &format!(r#"(/portal/site/(?:{UUID})/(?:tool|page)/(?:{UUID}))" title="(.*?)""#),
            )?,
            iframe: Matcher::new(
                "tool iframe",
                &format!(r#"src=.*(/portal/tool/(?:{UUID}).*?)""#),
            )?,
            workspace: Matcher::new(
                "workspace link",
                r#"(/portal/site/%7E.*?)" title="(Home|My Workspace)""#,
            )?,
            skip_tools,
        })
    }

    pub fn login_form(&self, credentials: &Credentials) -> FormParams {
        vec![
            ("eid".to_string(), credentials.username.clone()),
            ("pw".to_string(), credentials.password.clone()),
            ("submit".to_string(), "Login".to_string()),
        ]
    }

    pub fn site_path(&self, site_id: &str) -> String {
        format!("{}{}", self.site_prefix, site_id)
    }

    pub fn sites(&self, body: &str) -> Vec<Site> {
        let found = self
            .sites
            .scan(body)
            .into_iter()
            .filter_map(|fields| match <[String; 2]>::try_from(fields) {
                Ok([id, title]) => Some(Site { id, title }),
                Err(_) => None,
            })
            .collect();
        dedup(found)
    }

    /// Tools linked from `body`, minus any whose title mentions a skipped name.
    pub fn tools(&self, body: &str) -> Vec<Tool> {
        let found = self
            .tools
            .scan(body)
            .into_iter()
            .filter_map(|fields| match <[String; 2]>::try_from(fields) {
                Ok([url, title]) => Some(Tool { url, title }),
                Err(_) => None,
            })
            .filter(|tool| !self.is_skipped(&tool.title))
            .collect();
        dedup(found)
    }

    pub fn iframe_tool(&self, body: &str) -> Option<String> {
        self.iframe.first(body)
    }

    pub fn workspace(&self, body: &str) -> Option<String> {
        self.workspace.first(body)
    }

    fn is_skipped(&self, title: &str) -> bool {
        self.skip_tools
            .iter()
            .any(|skip| !skip.is_empty() && title.contains(skip.as_str()))
    }
}
