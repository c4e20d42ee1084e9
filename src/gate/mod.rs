//! Per-request access gate.
//!
//! Every request that is not excluded by the route matcher has its session
//! resolved through the identity provider (cookie-bridged, refresh-on-read) and
//! receives exactly one decision: pass through, redirect an anonymous caller to
//! the sign-in page, or redirect a signed-in caller away from it.

mod route;
mod decision;
mod cookies;
mod middleware;

pub use route::{PrefixMatch, RouteClass, RoutePolicy};
pub use decision::{evaluate, Decision, QueryParams};
pub use cookies::{parse_cookie_header, CookieAccess, CookieBridge, CookieError, CookieOptions, SameSite};
pub use middleware::{access_gate, AccessGate};
