use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;

use crate::error::{AppError, AppResult};
use crate::tprintln;

use super::principal::Principal;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    /// Stable across refreshes of the same sign-in.
    pub session_id: String,
    pub token: SessionToken,
    pub principal: Principal,
    pub issued_at: Instant,
    pub expires_at: Instant,
    /// Set once a newer token was issued for this sign-in; such a session
    /// lives out its grace period and is never rotated again.
    pub superseded: bool,
}

impl Session {
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// What a presented token resolves to.
#[derive(Debug, Clone)]
pub enum TokenState {
    Live(Session),
    /// Replaced by a refresh and past its grace period. The client most
    /// likely already holds the successor cookie.
    Rotated,
    Unknown,
}

#[derive(Debug, Default)]
struct SessionTables {
    by_token: HashMap<SessionToken, Session>,
    /// Retired tokens, kept until the cookie that carried them would have expired.
    rotated: HashMap<SessionToken, Instant>,
}

impl SessionTables {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.by_token.len() + self.rotated.len();
        self.by_token.retain(|_, s| s.expires_at > now);
        self.rotated.retain(|_, until| *until > now);
        before - self.by_token.len() - self.rotated.len()
    }
}

fn gen_id() -> AppResult<String> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::internal("rng_unavailable", e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// In-memory session store. Clones share the same tables.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    /// Sessions with less than this left are rotated on the next read.
    pub refresh_window: Duration,
    /// How long a replaced token keeps working, for requests already in flight.
    pub rotation_grace: Duration,
    tables: Arc<RwLock<SessionTables>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60), Duration::from_secs(5 * 60)) }
}

impl SessionManager {
    pub const DEFAULT_ROTATION_GRACE: Duration = Duration::from_secs(30);

    pub fn new(ttl: Duration, refresh_window: Duration) -> Self {
        Self {
            ttl,
            refresh_window,
            rotation_grace: Self::DEFAULT_ROTATION_GRACE,
            tables: Arc::new(RwLock::new(SessionTables::default())),
        }
    }

    pub fn with_rotation_grace(mut self, grace: Duration) -> Self {
        self.rotation_grace = grace;
        self
    }

    pub fn issue(&self, principal: Principal) -> AppResult<Session> {
        let sid = gen_id()?;
        self.insert_new(sid, principal)
    }

    /// Issue a fresh token for the same sign-in. The old token is untouched
    /// until [`retire`](Self::retire) is called, so a refresh that cannot be
    /// persisted loses nothing.
    pub fn rotate(&self, old: &Session) -> AppResult<Session> {
        self.insert_new(old.session_id.clone(), old.principal.clone())
    }

    fn insert_new(&self, session_id: String, principal: Principal) -> AppResult<Session> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(self.ttl)
            .ok_or_else(|| AppError::config("invalid_ttl", format!("session ttl of {}s is out of range", self.ttl.as_secs())))?;
        let token = gen_id()?;
        let sess = Session {
            session_id,
            token: token.clone(),
            principal,
            issued_at: now,
            expires_at,
            superseded: false,
        };
        let swept = {
            let mut t = self.tables.write();
            let swept = t.sweep(now);
            t.by_token.insert(token, sess.clone());
            swept
        };
        tprintln!("session.issue user={} sid={} ttl_secs={} swept={}", sess.principal.user_id, sess.session_id, self.ttl.as_secs(), swept);
        Ok(sess)
    }

    /// Mark a token as replaced. It stays usable for `rotation_grace` (never
    /// longer than it had left), then resolves as [`TokenState::Rotated`].
    pub fn retire(&self, token: &str) {
        let now = Instant::now();
        let mut t = self.tables.write();
        let Some(sess) = t.by_token.get_mut(token) else { return };
        let original_expiry = sess.expires_at;
        if let Some(grace_end) = now.checked_add(self.rotation_grace) {
            sess.expires_at = sess.expires_at.min(grace_end);
        }
        sess.superseded = true;
        t.rotated.insert(token.to_string(), original_expiry);
    }

    pub fn resolve(&self, token: &str) -> TokenState {
        let now = Instant::now();
        let t = self.tables.read();
        match t.by_token.get(token) {
            Some(s) if s.expires_at > now => return TokenState::Live(s.clone()),
            _ => {}
        }
        match t.rotated.get(token) {
            Some(until) if *until > now => TokenState::Rotated,
            _ => TokenState::Unknown,
        }
    }

    /// Current session for a token, if it is live.
    pub fn lookup(&self, token: &str) -> Option<Session> {
        match self.resolve(token) {
            TokenState::Live(s) => Some(s),
            _ => None,
        }
    }

    pub fn needs_refresh(&self, session: &Session) -> bool {
        session.remaining() <= self.refresh_window
    }

    pub fn revoke(&self, token: &str) -> bool {
        let mut t = self.tables.write();
        t.rotated.remove(token);
        t.by_token.remove(token).is_some()
    }

    /// Drop expired sessions and retired tokens; returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let swept = self.tables.write().sweep(Instant::now());
        if swept > 0 {
            tprintln!("session.sweep removed={}", swept);
        }
        swept
    }

    pub fn active_count(&self) -> usize {
        self.tables.read().by_token.len()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
