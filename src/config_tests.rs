use super::*;
use std::collections::HashMap;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |name: &str| map.get(name).cloned()
}

#[test]
fn defaults_match_current_policy() {
    let cfg = ServerConfig::load_from(&[], env_of(&[])).unwrap();
    assert_eq!(cfg.gate.protected_prefixes, vec!["/profile", "/adopt"]);
    assert_eq!(cfg.gate.auth_prefix, "/auth");
    assert_eq!(cfg.gate.redirect_param, "redirect");
    assert_eq!(cfg.gate.home_path, "/");
    assert_eq!(cfg.gate.prefix_match, PrefixMatch::Literal);
    assert_eq!(cfg.gate.excluded_patterns.len(), 4);
    assert_eq!(cfg.http_port, 3000);
    assert!(cfg.cookie_secure);
    assert_eq!(cfg.rotation_grace_secs, 30);
    assert!(!cfg.seed_demo_user);
}

#[test]
fn precedence_file_env_args() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pethaven.json");
    std::fs::write(&path, r#"{"http_port": 4000, "session_ttl_secs": 120, "gate": {"protected_prefixes": ["/mine"]}}"#).unwrap();
    let path_s = path.to_string_lossy().to_string();

    let env = env_of(&[("PETHAVEN_CONFIG", path_s.as_str()), ("PETHAVEN_HTTP_PORT", "5000")]);
    let cfg = ServerConfig::load_from(&args(&["--session-ttl", "90", "--refresh-window", "30"]), env).unwrap();
    // port from env beats file, ttl from args beats file, prefixes from file
    assert_eq!(cfg.http_port, 5000);
    assert_eq!(cfg.session_ttl_secs, 90);
    assert_eq!(cfg.gate.protected_prefixes, vec!["/mine"]);
    // untouched nested fields keep defaults
    assert_eq!(cfg.gate.auth_prefix, "/auth");
}

#[test]
fn protected_list_and_flags() {
    let env = env_of(&[("PETHAVEN_PROTECTED_PREFIXES", "/a, /b,,")]);
    let cfg = ServerConfig::load_from(&args(&["--segment-match", "--insecure-cookies"]), env).unwrap();
    assert_eq!(cfg.gate.protected_prefixes, vec!["/a", "/b"]);
    assert_eq!(cfg.gate.prefix_match, PrefixMatch::Segment);
    assert!(!cfg.cookie_secure);
}

#[test]
fn demo_user_seeding_is_opt_in() {
    let cfg = ServerConfig::load_from(&args(&["--seed-demo-user"]), env_of(&[])).unwrap();
    assert!(cfg.seed_demo_user);
    let cfg = ServerConfig::load_from(&[], env_of(&[("PETHAVEN_SEED_DEMO_USER", "true")])).unwrap();
    assert!(cfg.seed_demo_user);
    let cfg = ServerConfig::load_from(&args(&["--users", "/srv/users.json"]), env_of(&[])).unwrap();
    assert!(!cfg.seed_demo_user);
}

#[test]
fn session_lifetimes_are_bounded() {
    let huge = u64::MAX.to_string();
    let err = ServerConfig::load_from(&args(&["--session-ttl", &huge]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_ttl");

    let just_over = (MAX_SESSION_TTL_SECS + 1).to_string();
    let err = ServerConfig::load_from(&args(&["--session-ttl", &just_over]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_ttl");

    let cap = MAX_SESSION_TTL_SECS.to_string();
    assert!(ServerConfig::load_from(&args(&["--session-ttl", &cap]), env_of(&[])).is_ok());

    // a window as long as the ttl would rotate on every read
    let err = ServerConfig::load_from(&args(&["--session-ttl", "300"]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_refresh_window");
    let err = ServerConfig::load_from(&args(&["--session-ttl", "60", "--refresh-window", "120"]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_refresh_window");

    let err = ServerConfig::load_from(&args(&["--session-ttl", "60", "--refresh-window", "10", "--rotation-grace", "61"]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_rotation_grace");
}

#[test]
fn bad_values_are_config_errors() {
    let err = ServerConfig::load_from(&args(&["--http-port", "eighty"]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_number");

    let err = ServerConfig::load_from(&[], env_of(&[("PETHAVEN_COOKIE_SECURE", "maybe")])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_bool");

    let err = ServerConfig::load_from(&args(&["--protected", "profile"]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_prefix");

    let err = ServerConfig::load_from(&args(&["--session-ttl", "0"]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "invalid_ttl");
}

#[test]
fn missing_file_is_reported() {
    let err = ServerConfig::load_from(&args(&["--config", "/nonexistent/pethaven.json"]), env_of(&[])).unwrap_err();
    assert_eq!(err.code_str(), "config_unreadable");
}

#[test]
fn help_flag() {
    assert!(wants_help(&args(&["-h"])));
    assert!(!wants_help(&args(&["--http-port", "1"])));
}
