use parking_lot::RwLock;

use crate::api::TokenProvider;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not logged in")]
    LoggedOut,
}

/// Holds the bearer token for the signed-in user. The feed never touches it
/// directly: it reports `AuthExpired`, and the app invalidates the session in
/// response to the resulting event.
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn new(token: Option<String>) -> Self {
        let token = token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.read().is_some()
    }

    pub fn require(&self) -> Result<String, SessionError> {
        self.token.read().clone().ok_or(SessionError::LoggedOut)
    }

    pub fn invalidate(&self) {
        if self.token.write().take().is_some() {
            tracing::info!("session invalidated");
        }
    }
}

impl TokenProvider for Session {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_means_logged_out() {
        let session = Session::new(Some("   ".into()));
        assert!(!session.is_logged_in());
        assert!(session.require().is_err());
    }

    #[test]
    fn invalidate_clears_token() {
        let session = Session::new(Some("abc".into()));
        assert_eq!(session.token().as_deref(), Some("abc"));
        session.invalidate();
        assert!(session.token().is_none());
        assert!(!session.is_logged_in());
    }
}
