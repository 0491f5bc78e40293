/// Supplies the bearer credential attached to every REST call. Injected into
/// the REST client instead of being read from ambient global state, so tests
/// and concurrent sessions can each carry their own credentials. Token
/// refresh is the auth collaborator's problem; this trait only reports the
/// current value.
pub trait SessionProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

pub struct StaticSessionProvider {
    token: String,
}

impl StaticSessionProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl SessionProvider for StaticSessionProvider {
    fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// No credential; requests go out unauthenticated.
pub struct AnonymousSession;

impl SessionProvider for AnonymousSession {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}
