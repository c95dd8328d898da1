use std::sync::Arc;

use tracing::{info, warn};

use crate::identity::{
    IdentityError, IdentityProvider, Metadata, Session, SessionChange, SignUpOutcome,
    Subscription,
};
use crate::state::CurrentUser;

pub const CONFIRMATION_MESSAGE: &str = "Check your email to confirm your account, then log in.";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Email and password are required.")]
    MissingCredentials,
    #[error("{0}")]
    Identity(#[from] IdentityError),
}

/// Result of a sign-up attempt as the UI needs to present it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpResult {
    SignedIn(CurrentUser),
    ConfirmationRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutResult {
    SignedOut,
    /// Local state was cleared but the provider reported a failure.
    RemoteFailed(String),
}

/// Owns the identity provider and translates its sessions into the
/// application's notion of a current user.
#[derive(Clone)]
pub struct Manager {
    provider: Arc<dyn IdentityProvider>,
}

impl Manager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Session left over from a previous run, if any.
    pub fn restore(&self) -> Option<CurrentUser> {
        let user = self
            .provider
            .current_session()
            .map(|session| CurrentUser::from_session(&session));
        if let Some(user) = user.as_ref() {
            info!(username = %user.username, "session restored");
        }
        user
    }

    /// The provider session behind the current user, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.provider.current_session()
    }

    pub fn subscribe(&self) -> Subscription {
        self.provider.subscribe()
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<CurrentUser, SessionError> {
        validate_credentials(email, password)?;
        let session = self.provider.sign_in_with_password(email, password)?;
        let user = CurrentUser::from_session(&session);
        info!(username = %user.username, "signed in");
        Ok(user)
    }

    /// A non-empty `username` is forwarded as metadata so later sessions can
    /// recover it.
    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SignUpResult, SessionError> {
        validate_credentials(email, password)?;
        let mut metadata = Metadata::new();
        let username = username.trim();
        if !username.is_empty() {
            metadata.insert("username".into(), username.to_string());
        }
        match self.provider.sign_up(email, password, metadata)? {
            SignUpOutcome::SignedIn(session) => {
                let user = CurrentUser::from_session(&session);
                info!(username = %user.username, "signed up");
                Ok(SignUpResult::SignedIn(user))
            }
            SignUpOutcome::ConfirmationRequired => {
                info!("sign-up awaiting email confirmation");
                Ok(SignUpResult::ConfirmationRequired)
            }
        }
    }

    /// Ends `ending`. If another sign-in replaced it in the meantime the
    /// newer session survives.
    pub fn sign_out(&self, ending: &Session) -> SignOutResult {
        match self.provider.sign_out(ending) {
            Ok(()) => SignOutResult::SignedOut,
            Err(err) => {
                warn!(error = %err, "provider sign-out failed; local session cleared");
                SignOutResult::RemoteFailed(err.to_string())
            }
        }
    }
}

/// Maps a pushed session change onto the current user it implies.
pub fn user_from_change(change: &SessionChange) -> Option<CurrentUser> {
    change.session.as_ref().map(CurrentUser::from_session)
}

fn validate_credentials(email: &str, password: &str) -> Result<(), SessionError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(SessionError::MissingCredentials);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{LocalIdentity, SessionHub};
    use crate::storage::MemoryStore;

    struct FailingSignOut {
        hub: SessionHub,
    }

    impl IdentityProvider for FailingSignOut {
        fn current_session(&self) -> Option<Session> {
            None
        }

        fn subscribe(&self) -> Subscription {
            self.hub.subscribe()
        }

        fn sign_up(
            &self,
            _email: &str,
            _password: &str,
            _metadata: Metadata,
        ) -> Result<SignUpOutcome, IdentityError> {
            Err(IdentityError::Rejected("Signups not allowed".into()))
        }

        fn sign_in_with_password(
            &self,
            _email: &str,
            _password: &str,
        ) -> Result<Session, IdentityError> {
            Err(IdentityError::Transport("connection refused".into()))
        }

        fn sign_out(&self, _session: &Session) -> Result<(), IdentityError> {
            Err(IdentityError::Transport("connection refused".into()))
        }
    }

    fn sign_out_current(manager: &Manager) -> SignOutResult {
        let session = manager.current_session().expect("signed in");
        manager.sign_out(&session)
    }

    fn local(require_confirmation: bool) -> Manager {
        let store = Arc::new(MemoryStore::new());
        Manager::new(Arc::new(LocalIdentity::new(store, require_confirmation)))
    }

    #[test]
    fn empty_credentials_never_reach_provider() {
        let manager = local(false);
        assert_eq!(
            manager.sign_in("  ", "pw"),
            Err(SessionError::MissingCredentials)
        );
        assert_eq!(
            manager.sign_up("a@b.c", "", "alice"),
            Err(SessionError::MissingCredentials)
        );
        assert!(manager.restore().is_none());
    }

    #[test]
    fn sign_up_carries_username() {
        let manager = local(false);
        let result = manager.sign_up("alice@example.com", "pw", " ally ").unwrap();
        let SignUpResult::SignedIn(user) = result else {
            panic!("expected immediate sign-in");
        };
        assert_eq!(user.username, "ally");

        sign_out_current(&manager);
        let again = manager.sign_in("alice@example.com", "pw").unwrap();
        assert_eq!(again.username, "ally");
        assert_eq!(manager.restore(), Some(again));
    }

    #[test]
    fn sign_up_without_username_uses_email() {
        let manager = local(false);
        let SignUpResult::SignedIn(user) = manager.sign_up("bob@example.com", "pw", "").unwrap()
        else {
            panic!("expected immediate sign-in");
        };
        assert_eq!(user.username, "bob");
    }

    #[test]
    fn confirmation_flow_reports_distinct_result() {
        let manager = local(true);
        assert_eq!(
            manager.sign_up("c@example.com", "pw", "").unwrap(),
            SignUpResult::ConfirmationRequired
        );
        assert!(manager.restore().is_none());
    }

    #[test]
    fn provider_errors_surface_verbatim() {
        let manager = Manager::new(Arc::new(FailingSignOut {
            hub: SessionHub::new(),
        }));
        let err = manager.sign_up("a@b.c", "pw", "").unwrap_err();
        assert_eq!(err.to_string(), "Signups not allowed");
        let err = manager.sign_in("a@b.c", "pw").unwrap_err();
        assert_eq!(
            err.to_string(),
            "identity service unreachable: connection refused"
        );
    }

    #[test]
    fn sign_out_failure_is_reported() {
        let manager = Manager::new(Arc::new(FailingSignOut {
            hub: SessionHub::new(),
        }));
        let session = Session {
            user_id: "u-1".into(),
            email: None,
            metadata: Metadata::new(),
            access_token: None,
        };
        assert_eq!(
            manager.sign_out(&session),
            SignOutResult::RemoteFailed("identity service unreachable: connection refused".into())
        );

        let local = local(false);
        local.sign_up("e@example.com", "pw", "").unwrap();
        assert_eq!(sign_out_current(&local), SignOutResult::SignedOut);
    }

    #[test]
    fn changes_map_to_users() {
        let manager = local(false);
        let subscription = manager.subscribe();
        manager.sign_up("dee@example.com", "pw", "").unwrap();
        sign_out_current(&manager);
        let users: Vec<Option<CurrentUser>> =
            subscription.drain().iter().map(user_from_change).collect();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].as_ref().map(|u| u.username.as_str()), Some("dee"));
        assert!(users[1].is_none());
    }

    #[test]
    fn late_sign_out_keeps_newer_login() {
        let manager = local(false);
        manager.sign_up("fay@example.com", "pw", "").unwrap();
        let ending = manager.current_session().unwrap();
        sign_out_current(&manager);
        let user = manager.sign_in("fay@example.com", "pw").unwrap();

        assert_eq!(manager.sign_out(&ending), SignOutResult::SignedOut);
        assert_eq!(manager.restore(), Some(user));
    }
}
