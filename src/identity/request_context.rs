use super::Principal;

/// Attached by the access gate to every request it lets through.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub principal: Option<Principal>,
}

impl RequestContext {
    pub fn is_signed_in(&self) -> bool {
        self.principal.is_some()
    }
}
