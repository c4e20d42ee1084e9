use std::collections::BTreeMap;

use axum::http::HeaderValue;

use super::route::RoutePolicy;

/// Decoded query parameters of the incoming request.
pub type QueryParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Pass,
    RedirectTo { target: String, query: Vec<(String, String)> },
}

impl Decision {
    /// `Location` header value for a redirect; `None` for `Pass`.
    pub fn location(&self) -> Option<String> {
        let Decision::RedirectTo { target, query } = self else { return None; };
        if query.is_empty() {
            return Some(target.clone());
        }
        let qs = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        Some(format!("{}?{}", target, qs))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Pass => "pass",
            Decision::RedirectTo { .. } => "redirect",
        }
    }
}

/// Decide what happens to one request. Pure: same inputs, same decision.
///
/// - protected path without a session: send to the sign-in page, carrying the
///   path in the redirect parameter;
/// - sign-in page with a session: send to the carried redirect target (or home)
///   with no query string. A target that cannot be sent as a `Location` header
///   (control characters) also goes home;
/// - anything else passes.
pub fn evaluate(policy: &RoutePolicy, path: &str, has_session: bool, query: &QueryParams) -> Decision {
    if policy.is_protected(path) && !has_session {
        return Decision::RedirectTo {
            target: policy.auth_prefix().to_string(),
            query: vec![(policy.redirect_param().to_string(), path.to_string())],
        };
    }
    if policy.is_auth_page(path) && has_session {
        let target = query
            .get(policy.redirect_param())
            .filter(|v| !v.is_empty() && HeaderValue::from_str(v).is_ok())
            .cloned()
            .unwrap_or_else(|| policy.home_path().to_string());
        return Decision::RedirectTo { target, query: Vec::new() };
    }
    Decision::Pass
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod decision_tests;
