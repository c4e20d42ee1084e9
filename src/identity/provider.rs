use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::gate::{CookieAccess, CookieOptions, SameSite};

use super::principal::Attrs;
use super::session::{Session, SessionManager, TokenState};
use super::users::UserStore;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Session lookup and sign-in/out over a cookie read/write capability.
///
/// `get_session` may write cookies (refreshing or clearing the session token);
/// the caller is responsible for carrying those writes onto the response.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_session(&self, cookies: &mut dyn CookieAccess) -> AppResult<Option<Session>>;

    async fn sign_in(&self, _req: &LoginRequest, _cookies: &mut dyn CookieAccess) -> AppResult<Session> {
        Err(AppError::auth("sign_in_unsupported", "this identity provider does not accept credentials"))
    }

    /// Returns true when a live session was ended.
    async fn sign_out(&self, _cookies: &mut dyn CookieAccess) -> AppResult<bool> {
        Ok(false)
    }
}

/// Name and attributes of the session token cookie.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub options: CookieOptions,
}

impl SessionCookie {
    pub fn new(name: &str, secure: bool, max_age_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            options: CookieOptions {
                secure,
                same_site: SameSite::Lax,
                max_age: Some(i64::try_from(max_age_secs).unwrap_or(i64::MAX)),
                ..Default::default()
            },
        }
    }
}

/// In-process provider: users from a [`UserStore`], sessions in a [`SessionManager`].
pub struct LocalIdentityProvider {
    pub users: UserStore,
    pub sessions: SessionManager,
    pub cookie: SessionCookie,
}

impl LocalIdentityProvider {
    pub fn new(users: UserStore, sessions: SessionManager, cookie_name: &str, secure: bool) -> Self {
        let cookie = SessionCookie::new(cookie_name, secure, sessions.ttl.as_secs());
        Self { users, sessions, cookie }
    }

    fn clear_cookie(&self, cookies: &mut dyn CookieAccess) {
        if let Err(e) = cookies.set(&self.cookie.name, "", &self.cookie.options.removal()) {
            warn!(target: "pethaven::identity", "could not clear session cookie: {}", e);
        }
    }

    fn refresh(&self, cookies: &mut dyn CookieAccess, current: Session) -> AppResult<Session> {
        let refreshed = self.sessions.rotate(&current)?;
        match cookies.set(&self.cookie.name, &refreshed.token, &self.cookie.options) {
            Ok(()) => {
                // Requests already in flight with the old token keep working for a while.
                self.sessions.retire(&current.token);
                debug!(target: "pethaven::identity", user = %current.principal.user_id, sid = %current.session_id, "session refreshed");
                Ok(refreshed)
            }
            Err(e) => {
                // Keep serving the current token; the refresh is retried on the next read.
                warn!(target: "pethaven::identity", user = %current.principal.user_id, "session refresh not persisted: {}", e);
                self.sessions.revoke(&refreshed.token);
                Ok(current)
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn get_session(&self, cookies: &mut dyn CookieAccess) -> AppResult<Option<Session>> {
        let Some(token) = cookies.get(&self.cookie.name).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let session = match self.sessions.resolve(&token) {
            TokenState::Live(session) => session,
            TokenState::Rotated => {
                // The client already holds the successor cookie; never clear it here.
                debug!(target: "pethaven::identity", "session token was rotated; leaving cookie alone");
                return Ok(None);
            }
            TokenState::Unknown => {
                debug!(target: "pethaven::identity", "unknown or expired session token; clearing cookie");
                self.clear_cookie(cookies);
                return Ok(None);
            }
        };
        if session.superseded || !self.sessions.needs_refresh(&session) {
            return Ok(Some(session));
        }
        self.refresh(cookies, session).map(Some)
    }

    async fn sign_in(&self, req: &LoginRequest, cookies: &mut dyn CookieAccess) -> AppResult<Session> {
        let Some(mut principal) = self.users.authenticate(&req.username, &req.password) else {
            return Err(AppError::auth("invalid_credentials", "unknown user or wrong password"));
        };
        principal.attrs = Attrs { ip: req.ip.clone(), user_agent: req.user_agent.clone() };
        let session = self.sessions.issue(principal)?;
        if let Err(e) = cookies.set(&self.cookie.name, &session.token, &self.cookie.options) {
            self.sessions.revoke(&session.token);
            return Err(e.into());
        }
        info!(target: "pethaven::identity", user = %session.principal.user_id, sid = %session.session_id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self, cookies: &mut dyn CookieAccess) -> AppResult<bool> {
        let ended = match cookies.get(&self.cookie.name) {
            Some(token) if !token.is_empty() => self.sessions.revoke(&token),
            _ => false,
        };
        self.clear_cookie(cookies);
        if ended {
            info!(target: "pethaven::identity", "signed out");
        }
        Ok(ended)
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
