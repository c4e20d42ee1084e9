//! Identity provider client: credentials, sessions and the cookie-bridged
//! session lookup used by the access gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod users;
mod provider;
mod request_context;

pub use principal::{Principal, Attrs};
pub use session::{Session, SessionToken, SessionManager, TokenState};
pub use users::{UserStore, UserRecord, hash_password, verify_password};
pub use provider::{IdentityProvider, LocalIdentityProvider, LoginRequest, SessionCookie};
pub use request_context::RequestContext;
