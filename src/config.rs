//! Server and access-gate configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file
//! (`--config PATH` or `PETHAVEN_CONFIG`), then `PETHAVEN_*` environment
//! variables, then command-line flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::gate::PrefixMatch;

/// Paths never seen by the gate: API routes, bundler output, image optimizer, favicon.
pub const DEFAULT_EXCLUDED_PATTERNS: &[&str] = &[
    r"^/api",
    r"^/_next/static",
    r"^/_next/image",
    r"^/favicon\.ico$",
];

/// Longest accepted session lifetime: one year.
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub const USAGE: &str = "pethaven\n\nUSAGE:\n  pethaven [--config PATH] [--host ADDR] [--http-port N] [--users PATH]\n           [--protected /a,/b] [--segment-match] [--session-ttl SECS]\n           [--refresh-window SECS] [--rotation-grace SECS] [--insecure-cookies]\n           [--seed-demo-user]\n\nOPTIONS:\n  --config PATH          JSON config file (env: PETHAVEN_CONFIG)\n  --host ADDR            Bind address (env: PETHAVEN_HOST, default 0.0.0.0)\n  --http-port N          HTTP port (env: PETHAVEN_HTTP_PORT, default 3000)\n  --users PATH           JSON user file (env: PETHAVEN_USERS_FILE)\n  --protected LIST       Comma separated protected prefixes (env: PETHAVEN_PROTECTED_PREFIXES)\n  --segment-match        Match protected prefixes on path segments (env: PETHAVEN_SEGMENT_MATCH)\n  --session-ttl SECS     Session lifetime (env: PETHAVEN_SESSION_TTL_SECS, default 3600)\n  --refresh-window SECS  Rotate sessions this close to expiry (env: PETHAVEN_REFRESH_WINDOW_SECS, default 300)\n  --rotation-grace SECS  Keep a replaced session token working this long (env: PETHAVEN_ROTATION_GRACE_SECS, default 30)\n  --insecure-cookies     Drop the Secure cookie attribute for plain-HTTP development (env: PETHAVEN_COOKIE_SECURE=false)\n  --seed-demo-user       Create a demo/demo account when no users exist (env: PETHAVEN_SEED_DEMO_USER)\n";

/// Route policy for the access gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Paths starting with any of these require a session.
    pub protected_prefixes: Vec<String>,
    /// Sign-in page prefix; also the redirect target for anonymous callers.
    pub auth_prefix: String,
    /// Query parameter carrying the originally requested path.
    pub redirect_param: String,
    /// Where signed-in callers land when the sign-in page has no redirect.
    pub home_path: String,
    pub prefix_match: PrefixMatch,
    /// Regular expressions; a matching path bypasses the gate entirely.
    pub excluded_patterns: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            protected_prefixes: vec!["/profile".to_string(), "/adopt".to_string()],
            auth_prefix: "/auth".to_string(),
            redirect_param: "redirect".to_string(),
            home_path: "/".to_string(),
            prefix_match: PrefixMatch::Literal,
            excluded_patterns: DEFAULT_EXCLUDED_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    pub session_ttl_secs: u64,
    pub refresh_window_secs: u64,
    pub rotation_grace_secs: u64,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub users_file: Option<PathBuf>,
    /// Development only: create `demo/demo` when the credential store is empty.
    pub seed_demo_user: bool,
    pub gate: GateConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 3000,
            session_ttl_secs: 60 * 60,
            refresh_window_secs: 5 * 60,
            rotation_grace_secs: 30,
            cookie_name: "pethaven_session".to_string(),
            cookie_secure: true,
            users_file: None,
            seed_demo_user: false,
            gate: GateConfig::default(),
        }
    }
}

fn parse_u16(name: &str, raw: &str) -> AppResult<u16> {
    raw.trim().parse::<u16>().map_err(|_| AppError::config("invalid_number", &format!("{}: expected a port number, got '{}'", name, raw)))
}

fn parse_u64(name: &str, raw: &str) -> AppResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| AppError::config("invalid_number", &format!("{}: expected an integer, got '{}'", name, raw)))
}

fn parse_bool(name: &str, raw: &str) -> AppResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::config("invalid_bool", &format!("{}: expected a boolean, got '{}'", name, raw))),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).map(|s| s.to_string()).collect()
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// True when `--help`/`-h` was passed.
pub fn wants_help(args: &[String]) -> bool {
    has_flag(args, "--help") || has_flag(args, "-h")
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::config("config_unreadable", &format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| AppError::config("config_invalid", &format!("{}: {}", path.display(), e)))
    }

    /// Load from the process environment and the given command-line arguments.
    pub fn load(args: &[String]) -> AppResult<Self> {
        Self::load_from(args, |name| std::env::var(name).ok())
    }

    /// Load with an explicit environment lookup.
    pub fn load_from<F>(args: &[String], env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = arg_value(args, "--config").map(|s| s.to_string()).or_else(|| env("PETHAVEN_CONFIG"));
        let mut cfg = match file {
            Some(p) => Self::from_file(Path::new(&p))?,
            None => Self::default(),
        };
        cfg.apply_env(&env)?;
        cfg.apply_args(args)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env<F>(&mut self, env: &F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("PETHAVEN_HOST") { self.host = v; }
        if let Some(v) = env("PETHAVEN_HTTP_PORT") { self.http_port = parse_u16("PETHAVEN_HTTP_PORT", &v)?; }
        if let Some(v) = env("PETHAVEN_SESSION_TTL_SECS") { self.session_ttl_secs = parse_u64("PETHAVEN_SESSION_TTL_SECS", &v)?; }
        if let Some(v) = env("PETHAVEN_REFRESH_WINDOW_SECS") { self.refresh_window_secs = parse_u64("PETHAVEN_REFRESH_WINDOW_SECS", &v)?; }
        if let Some(v) = env("PETHAVEN_ROTATION_GRACE_SECS") { self.rotation_grace_secs = parse_u64("PETHAVEN_ROTATION_GRACE_SECS", &v)?; }
        if let Some(v) = env("PETHAVEN_COOKIE_SECURE") { self.cookie_secure = parse_bool("PETHAVEN_COOKIE_SECURE", &v)?; }
        if let Some(v) = env("PETHAVEN_USERS_FILE") { self.users_file = Some(PathBuf::from(v)); }
        if let Some(v) = env("PETHAVEN_SEED_DEMO_USER") { self.seed_demo_user = parse_bool("PETHAVEN_SEED_DEMO_USER", &v)?; }
        if let Some(v) = env("PETHAVEN_PROTECTED_PREFIXES") { self.gate.protected_prefixes = parse_list(&v); }
        if let Some(v) = env("PETHAVEN_SEGMENT_MATCH") {
            if parse_bool("PETHAVEN_SEGMENT_MATCH", &v)? { self.gate.prefix_match = PrefixMatch::Segment; }
        }
        Ok(())
    }

    fn apply_args(&mut self, args: &[String]) -> AppResult<()> {
        if let Some(v) = arg_value(args, "--host") { self.host = v.to_string(); }
        if let Some(v) = arg_value(args, "--http-port") { self.http_port = parse_u16("--http-port", v)?; }
        if let Some(v) = arg_value(args, "--session-ttl") { self.session_ttl_secs = parse_u64("--session-ttl", v)?; }
        if let Some(v) = arg_value(args, "--refresh-window") { self.refresh_window_secs = parse_u64("--refresh-window", v)?; }
        if let Some(v) = arg_value(args, "--rotation-grace") { self.rotation_grace_secs = parse_u64("--rotation-grace", v)?; }
        if let Some(v) = arg_value(args, "--users") { self.users_file = Some(PathBuf::from(v)); }
        if let Some(v) = arg_value(args, "--protected") { self.gate.protected_prefixes = parse_list(v); }
        if has_flag(args, "--segment-match") { self.gate.prefix_match = PrefixMatch::Segment; }
        if has_flag(args, "--insecure-cookies") { self.cookie_secure = false; }
        if has_flag(args, "--seed-demo-user") { self.seed_demo_user = true; }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.session_ttl_secs == 0 || self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(AppError::config(
                "invalid_ttl",
                &format!("session ttl must be between 1 and {} seconds, got {}", MAX_SESSION_TTL_SECS, self.session_ttl_secs),
            ));
        }
        if self.refresh_window_secs >= self.session_ttl_secs {
            return Err(AppError::config(
                "invalid_refresh_window",
                &format!("refresh window ({}s) must be shorter than the session ttl ({}s)", self.refresh_window_secs, self.session_ttl_secs),
            ));
        }
        if self.rotation_grace_secs > self.session_ttl_secs {
            return Err(AppError::config("invalid_rotation_grace", "rotation grace must not exceed the session ttl"));
        }
        if self.cookie_name.is_empty() || self.cookie_name.contains(|c: char| c == '=' || c == ';' || c.is_whitespace()) {
            return Err(AppError::config("invalid_cookie_name", &format!("unusable cookie name '{}'", self.cookie_name)));
        }
        for p in self.gate.protected_prefixes.iter().chain(std::iter::once(&self.gate.auth_prefix)) {
            if !p.starts_with('/') {
                return Err(AppError::config("invalid_prefix", &format!("route prefix '{}' must start with '/'", p)));
            }
        }
        if !self.gate.home_path.starts_with('/') {
            return Err(AppError::config("invalid_prefix", &format!("home path '{}' must start with '/'", self.gate.home_path)));
        }
        if self.gate.redirect_param.is_empty() {
            return Err(AppError::config("invalid_redirect_param", "redirect parameter name is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
