use std::collections::BTreeMap;
use std::time::Duration;

use super::*;
use crate::gate::CookieError;
use crate::identity::Principal;

const COOKIE: &str = "pethaven_session";

/// Map-backed jar; optionally refuses every write.
#[derive(Default)]
struct TestJar {
    values: BTreeMap<String, String>,
    writes: Vec<(String, String, CookieOptions)>,
    read_only: bool,
}

impl TestJar {
    fn with_token(token: &str) -> Self {
        let mut jar = Self::default();
        jar.values.insert(COOKIE.to_string(), token.to_string());
        jar
    }
}

impl CookieAccess for TestJar {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &str, options: &CookieOptions) -> Result<(), CookieError> {
        if self.read_only {
            return Err(CookieError::Finalized(name.to_string()));
        }
        self.writes.push((name.to_string(), value.to_string(), options.clone()));
        self.values.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

fn provider(ttl_secs: u64, window_secs: u64) -> LocalIdentityProvider {
    let sessions = SessionManager::new(Duration::from_secs(ttl_secs), Duration::from_secs(window_secs));
    LocalIdentityProvider::new(UserStore::new(), sessions, COOKIE, true)
}

fn ada() -> Principal {
    Principal { user_id: "ada".to_string(), ..Default::default() }
}

#[tokio::test]
async fn no_cookie_no_session_no_writes() {
    let p = provider(3600, 60);
    let mut jar = TestJar::default();
    assert!(p.get_session(&mut jar).await.unwrap().is_none());
    assert!(jar.writes.is_empty());
}

#[tokio::test]
async fn valid_session_outside_window_is_untouched() {
    let p = provider(3600, 60);
    let s = p.sessions.issue(ada()).unwrap();
    let mut jar = TestJar::with_token(&s.token);
    let got = p.get_session(&mut jar).await.unwrap().unwrap();
    assert_eq!(got.token, s.token);
    assert!(jar.writes.is_empty());
}

#[tokio::test]
async fn stale_token_is_cleared() {
    let p = provider(3600, 60);
    let mut jar = TestJar::with_token("forged");
    assert!(p.get_session(&mut jar).await.unwrap().is_none());
    assert_eq!(jar.writes.len(), 1);
    let (name, value, opts) = &jar.writes[0];
    assert_eq!(name, COOKIE);
    assert_eq!(value, "");
    assert!(opts.is_removal());
}

#[tokio::test]
async fn session_in_window_is_rotated_and_written() {
    let p = provider(60, 120);
    let s = p.sessions.issue(ada()).unwrap();
    let mut jar = TestJar::with_token(&s.token);

    let got = p.get_session(&mut jar).await.unwrap().unwrap();
    assert_ne!(got.token, s.token);
    assert_eq!(got.session_id, s.session_id);
    assert_eq!(jar.writes.len(), 1);
    assert_eq!(jar.writes[0].1, got.token);
    assert_eq!(jar.writes[0].2.max_age, Some(60));
    // old token retired but still inside its grace period
    let old = p.sessions.lookup(&s.token).unwrap();
    assert!(old.superseded);
    assert!(old.remaining() <= SessionManager::DEFAULT_ROTATION_GRACE);
    assert!(!p.sessions.lookup(&got.token).unwrap().superseded);
    assert_eq!(p.sessions.active_count(), 2);
}

#[tokio::test]
async fn in_flight_old_token_is_served_without_writes() {
    let p = provider(60, 120);
    let s = p.sessions.issue(ada()).unwrap();
    let mut first = TestJar::with_token(&s.token);
    let refreshed = p.get_session(&mut first).await.unwrap().unwrap();

    // a second tab still sends the token that was just replaced
    let mut second = TestJar::with_token(&s.token);
    let got = p.get_session(&mut second).await.unwrap().unwrap();
    assert_eq!(got.token, s.token);
    assert_eq!(got.session_id, refreshed.session_id);
    assert!(second.writes.is_empty());
}

#[tokio::test]
async fn rotated_token_past_grace_is_not_cleared() {
    let sessions = SessionManager::new(Duration::from_secs(60), Duration::from_secs(120)).with_rotation_grace(Duration::ZERO);
    let p = LocalIdentityProvider::new(UserStore::new(), sessions, COOKIE, true);
    let s = p.sessions.issue(ada()).unwrap();
    let mut first = TestJar::with_token(&s.token);
    p.get_session(&mut first).await.unwrap().unwrap();

    let mut late = TestJar::with_token(&s.token);
    assert!(p.get_session(&mut late).await.unwrap().is_none());
    assert!(late.writes.is_empty());
}

#[test]
fn huge_ttl_saturates_max_age() {
    let cookie = SessionCookie::new(COOKIE, true, u64::MAX);
    assert_eq!(cookie.options.max_age, Some(i64::MAX));
}

#[tokio::test]
async fn failed_refresh_write_keeps_current_session() {
    let p = provider(60, 120);
    let s = p.sessions.issue(ada()).unwrap();
    let mut jar = TestJar::with_token(&s.token);
    jar.read_only = true;

    let got = p.get_session(&mut jar).await.unwrap().unwrap();
    assert_eq!(got.token, s.token);
    assert!(p.sessions.lookup(&s.token).is_some());
    assert_eq!(p.sessions.active_count(), 1);
}

#[tokio::test]
async fn sign_in_sets_cookie_and_sign_out_clears_it() {
    let p = provider(3600, 60);
    p.users.add_user("ada", "lovelace", None).unwrap();
    let mut jar = TestJar::default();
    let req = LoginRequest { username: "ada".into(), password: "lovelace".into(), ip: Some("10.0.0.1".into()), user_agent: None };

    let s = p.sign_in(&req, &mut jar).await.unwrap();
    assert_eq!(s.principal.attrs.ip.as_deref(), Some("10.0.0.1"));
    assert_eq!(jar.get(COOKIE).as_deref(), Some(s.token.as_str()));
    assert!(p.get_session(&mut jar).await.unwrap().is_some());

    assert!(p.sign_out(&mut jar).await.unwrap());
    assert_eq!(jar.get(COOKIE).as_deref(), Some(""));
    assert!(p.sessions.lookup(&s.token).is_none());
    assert!(!p.sign_out(&mut jar).await.unwrap());
}

#[tokio::test]
async fn sign_in_rejects_bad_credentials() {
    let p = provider(3600, 60);
    p.users.add_user("ada", "lovelace", None).unwrap();
    let mut jar = TestJar::default();
    let req = LoginRequest { username: "ada".into(), password: "babbage".into(), ip: None, user_agent: None };
    let err = p.sign_in(&req, &mut jar).await.unwrap_err();
    assert_eq!(err.code_str(), "invalid_credentials");
    assert!(jar.writes.is_empty());
    assert_eq!(p.sessions.active_count(), 0);
}

#[tokio::test]
async fn sign_in_without_writable_jar_leaves_no_session() {
    let p = provider(3600, 60);
    p.users.add_user("ada", "lovelace", None).unwrap();
    let mut jar = TestJar { read_only: true, ..Default::default() };
    let req = LoginRequest { username: "ada".into(), password: "lovelace".into(), ip: None, user_agent: None };
    let err = p.sign_in(&req, &mut jar).await.unwrap_err();
    assert_eq!(err.code_str(), "cookie_finalized");
    assert_eq!(p.sessions.active_count(), 0);
}
