use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::error::{AppError, AppResult};

/// How a configured prefix is compared against a request path.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrefixMatch {
    /// Plain string prefix: `/adopt` also covers `/adoptme`.
    #[default]
    Literal,
    /// Prefix must end on a path segment boundary: `/adopt` and `/adopt/...` only.
    Segment,
}

impl PrefixMatch {
    pub fn matches(self, path: &str, prefix: &str) -> bool {
        match self {
            PrefixMatch::Literal => path.starts_with(prefix),
            PrefixMatch::Segment => {
                let Some(rest) = path.strip_prefix(prefix) else { return false; };
                rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/')
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Protected,
    AuthPage,
    Public,
}

impl RouteClass {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteClass::Protected => "protected",
            RouteClass::AuthPage => "auth_page",
            RouteClass::Public => "public",
        }
    }
}

/// Compiled route policy shared by every request.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    protected: Vec<String>,
    auth_prefix: String,
    redirect_param: String,
    home_path: String,
    prefix_match: PrefixMatch,
    exclusions: RegexSet,
}

impl RoutePolicy {
    pub fn from_config(cfg: &GateConfig) -> AppResult<Self> {
        let exclusions = RegexSet::new(&cfg.excluded_patterns)
            .map_err(|e| AppError::config("invalid_exclusion_pattern", e.to_string()))?;
        Ok(Self {
            protected: cfg.protected_prefixes.clone(),
            auth_prefix: cfg.auth_prefix.clone(),
            redirect_param: cfg.redirect_param.clone(),
            home_path: cfg.home_path.clone(),
            prefix_match: cfg.prefix_match,
            exclusions,
        })
    }

    /// Excluded paths never reach session resolution or classification.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclusions.is_match(path)
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|p| self.prefix_match.matches(path, p))
    }

    /// The sign-in page is always matched as a literal prefix.
    pub fn is_auth_page(&self, path: &str) -> bool {
        path.starts_with(&self.auth_prefix)
    }

    /// Protected takes precedence over the sign-in page when both match.
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.is_protected(path) {
            RouteClass::Protected
        } else if self.is_auth_page(path) {
            RouteClass::AuthPage
        } else {
            RouteClass::Public
        }
    }

    pub fn auth_prefix(&self) -> &str { &self.auth_prefix }
    pub fn redirect_param(&self) -> &str { &self.redirect_param }
    pub fn home_path(&self) -> &str { &self.home_path }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod route_tests;
