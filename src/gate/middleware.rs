use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{debug, warn, Instrument};

use crate::identity::{IdentityProvider, RequestContext, Session};

use super::cookies::CookieBridge;
use super::decision::{evaluate, QueryParams};
use super::route::RoutePolicy;

/// State of the gate layer: the compiled route policy and the identity provider.
#[derive(Clone)]
pub struct AccessGate {
    policy: Arc<RoutePolicy>,
    provider: Arc<dyn IdentityProvider>,
}

impl AccessGate {
    pub fn new(policy: RoutePolicy, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { policy: Arc::new(policy), provider }
    }

    /// Provider failures are indistinguishable from "signed out" to the caller.
    pub async fn resolve_session(&self, cookies: &mut CookieBridge) -> Option<Session> {
        match self.provider.get_session(cookies).await {
            Ok(session) => session,
            Err(e) => {
                warn!(target: "pethaven::gate", code = e.code_str(), "session resolution failed, treating caller as signed out: {}", e);
                None
            }
        }
    }
}

fn query_params(request: &Request) -> QueryParams {
    match Query::<QueryParams>::try_from_uri(request.uri()) {
        Ok(Query(params)) => params,
        Err(e) => {
            warn!(target: "pethaven::gate", "ignoring unparseable query string: {}", e);
            QueryParams::new()
        }
    }
}

/// Middleware entry point; mount with `axum::middleware::from_fn_with_state`.
pub async fn access_gate(State(gate): State<AccessGate>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if gate.policy.is_excluded(&path) {
        return next.run(request).await;
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "gate",
        request_id = %request_id,
        path = %path,
        route = gate.policy.classify(&path).as_str(),
    );

    async move {
        let mut cookies = CookieBridge::from_headers(request.headers());
        let session = gate.resolve_session(&mut cookies).await;
        let query = query_params(&request);
        let decision = evaluate(&gate.policy, &path, session.is_some(), &query);
        debug!(
            target: "pethaven::gate",
            decision = decision.label(),
            signed_in = session.is_some(),
            cookie_writes = cookies.pending_count(),
            "gate decision"
        );

        let mut response = match decision.location() {
            Some(location) => Redirect::temporary(&location).into_response(),
            None => {
                cookies.forward_to_request(request.headers_mut());
                request.extensions_mut().insert(RequestContext {
                    request_id,
                    principal: session.map(|s| s.principal),
                });
                next.run(request).await
            }
        };
        // Refresh-on-read: session cookie writes ride along on every outcome.
        cookies.apply(response.headers_mut());
        response
    }
    .instrument(span)
    .await
}
