use super::*;

fn policy() -> RoutePolicy {
    RoutePolicy::from_config(&GateConfig::default()).unwrap()
}

fn segment_policy() -> RoutePolicy {
    let mut cfg = GateConfig::default();
    cfg.prefix_match = PrefixMatch::Segment;
    RoutePolicy::from_config(&cfg).unwrap()
}

#[test]
fn exclusions_follow_matcher() {
    let p = policy();
    assert!(p.is_excluded("/api"));
    assert!(p.is_excluded("/api/pets"));
    assert!(p.is_excluded("/_next/static/chunks/app.js"));
    assert!(p.is_excluded("/_next/image?url=%2Fdog.png"));
    assert!(p.is_excluded("/favicon.ico"));

    assert!(!p.is_excluded("/favicon.ico.bak"));
    assert!(!p.is_excluded("/pets"));
    assert!(!p.is_excluded("/profile"));
    assert!(!p.is_excluded("/_next/data"));
    assert!(!p.is_excluded("/"));
}

#[test]
fn classification() {
    let p = policy();
    assert_eq!(p.classify("/profile"), RouteClass::Protected);
    assert_eq!(p.classify("/profile/settings"), RouteClass::Protected);
    assert_eq!(p.classify("/adopt"), RouteClass::Protected);
    assert_eq!(p.classify("/adopt/42"), RouteClass::Protected);
    assert_eq!(p.classify("/auth"), RouteClass::AuthPage);
    assert_eq!(p.classify("/auth/callback"), RouteClass::AuthPage);
    assert_eq!(p.classify("/"), RouteClass::Public);
    assert_eq!(p.classify("/pets"), RouteClass::Public);
    assert_eq!(p.classify("/pets/7"), RouteClass::Public);
}

#[test]
fn literal_prefix_collides() {
    let p = policy();
    assert!(p.is_protected("/adoptme"));
    assert!(p.is_protected("/profileX"));
    assert!(p.is_auth_page("/authors"));
}

#[test]
fn segment_prefix_respects_boundaries() {
    let p = segment_policy();
    assert!(p.is_protected("/adopt"));
    assert!(p.is_protected("/adopt/42"));
    assert!(!p.is_protected("/adoptme"));
    assert!(!p.is_protected("/profileX"));
    // sign-in page matching is unaffected
    assert!(p.is_auth_page("/authors"));
}

#[test]
fn protected_wins_over_auth_page() {
    let mut cfg = GateConfig::default();
    cfg.protected_prefixes.push("/auth/admin".to_string());
    let p = RoutePolicy::from_config(&cfg).unwrap();
    assert_eq!(p.classify("/auth/admin"), RouteClass::Protected);
    assert!(p.is_auth_page("/auth/admin"));
}

#[test]
fn invalid_exclusion_pattern_is_rejected() {
    let mut cfg = GateConfig::default();
    cfg.excluded_patterns.push("^/(unclosed".to_string());
    let err = RoutePolicy::from_config(&cfg).unwrap_err();
    assert_eq!(err.code_str(), "invalid_exclusion_pattern");
}

#[test]
fn empty_protected_set_makes_everything_public() {
    let mut cfg = GateConfig::default();
    cfg.protected_prefixes.clear();
    let p = RoutePolicy::from_config(&cfg).unwrap();
    assert_eq!(p.classify("/profile"), RouteClass::Public);
}
