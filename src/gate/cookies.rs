use std::collections::BTreeMap;

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("cookie '{0}' written after the response was finalized")]
    Finalized(String),
    #[error("cookie '{name}' cannot be carried in a header: {reason}")]
    Invalid { name: String, reason: String },
}

impl From<CookieError> for AppError {
    fn from(err: CookieError) -> Self {
        let code = match &err {
            CookieError::Finalized(_) => "cookie_finalized",
            CookieError::Invalid { .. } => "cookie_invalid",
        };
        AppError::cookie(code, err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    /// Seconds; `Some(0)` deletes the cookie.
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
            max_age: None,
            expires: None,
        }
    }
}

impl CookieOptions {
    /// Options that make the browser drop the cookie immediately.
    pub fn removal(&self) -> Self {
        Self {
            max_age: Some(0),
            expires: DateTime::from_timestamp(0, 0),
            ..self.clone()
        }
    }

    pub fn is_removal(&self) -> bool {
        self.max_age == Some(0)
    }

    /// Render a `Set-Cookie` header value.
    pub fn render(&self, name: &str, value: &str) -> String {
        let mut out = format!("{}={}; Path={}", name, value, self.path);
        if let Some(age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", age));
        }
        if let Some(at) = self.expires {
            out.push_str(&format!("; Expires={}", at.format("%a, %d %b %Y %H:%M:%S GMT")));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out.push_str("; SameSite=");
        out.push_str(self.same_site.as_str());
        out
    }
}

/// Read/write capability pair handed to the identity provider.
pub trait CookieAccess: Send {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&mut self, name: &str, value: &str, options: &CookieOptions) -> Result<(), CookieError>;
}

/// Collect all `Cookie` request headers into a name -> value map.
/// The first occurrence of a name wins.
pub fn parse_cookie_header(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for raw in headers.get_all(header::COOKIE) {
        let Ok(s) = raw.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                let k = k.trim();
                if k.is_empty() { continue; }
                out.entry(k.to_string()).or_insert_with(|| v.trim().to_string());
            }
        }
    }
    out
}

fn check_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty name".to_string());
    }
    if let Some(c) = name.chars().find(|c| c.is_control() || c.is_whitespace() || "()<>@,;:\\\"/[]?={}".contains(*c) || !c.is_ascii()) {
        return Err(format!("illegal character {:?} in name", c));
    }
    Ok(())
}

fn check_value(value: &str) -> Result<(), String> {
    if let Some(c) = value.chars().find(|c| c.is_control() || c.is_whitespace() || matches!(c, '"' | ',' | ';' | '\\') || !c.is_ascii()) {
        return Err(format!("illegal character {:?} in value", c));
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct PendingCookie {
    name: String,
    value: String,
    removal: bool,
    header: HeaderValue,
}

/// Request cookies plus the writes produced while handling the request.
///
/// Writes are held until [`CookieBridge::apply`] copies them onto the response;
/// after that the bridge is finalized and rejects further writes.
#[derive(Debug, Default)]
pub struct CookieBridge {
    incoming: BTreeMap<String, String>,
    pending: Vec<PendingCookie>,
    finalized: bool,
}

impl CookieBridge {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self { incoming: parse_cookie_header(headers), pending: Vec::new(), finalized: false }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Append pending writes as `Set-Cookie` headers and finalize.
    pub fn apply(&mut self, headers: &mut HeaderMap) {
        if self.finalized { return; }
        for p in std::mem::take(&mut self.pending) {
            headers.append(header::SET_COOKIE, p.header);
        }
        self.finalized = true;
    }

    /// Rewrite the request `Cookie` header so inner handlers see the refreshed jar.
    pub fn forward_to_request(&self, headers: &mut HeaderMap) {
        if self.pending.is_empty() { return; }
        let mut merged = self.incoming.clone();
        for p in &self.pending {
            if p.removal {
                merged.remove(&p.name);
            } else {
                merged.insert(p.name.clone(), p.value.clone());
            }
        }
        headers.remove(header::COOKIE);
        if merged.is_empty() { return; }
        let joined = merged.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join("; ");
        match HeaderValue::from_str(&joined) {
            Ok(v) => { headers.insert(header::COOKIE, v); }
            Err(e) => tracing::warn!(target: "pethaven::gate", "could not forward refreshed cookies: {}", e),
        }
    }
}

impl CookieAccess for CookieBridge {
    fn get(&self, name: &str) -> Option<String> {
        if let Some(p) = self.pending.iter().rev().find(|p| p.name == name) {
            return if p.removal { None } else { Some(p.value.clone()) };
        }
        self.incoming.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &str, options: &CookieOptions) -> Result<(), CookieError> {
        if self.finalized {
            return Err(CookieError::Finalized(name.to_string()));
        }
        let invalid = |reason: String| CookieError::Invalid { name: name.to_string(), reason };
        check_name(name).map_err(invalid)?;
        check_value(value).map_err(invalid)?;
        let header = HeaderValue::from_str(&options.render(name, value)).map_err(|e| invalid(e.to_string()))?;
        self.pending.retain(|p| p.name != name);
        self.pending.push(PendingCookie {
            name: name.to_string(),
            value: value.to_string(),
            removal: options.is_removal(),
            header,
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "cookies_tests.rs"]
mod cookies_tests;
