use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::{self, KeyValueStore};

pub const SESSION_KEY: &str = "identity.session";
const ACCOUNTS_KEY: &str = "identity.accounts";

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

pub type Metadata = BTreeMap<String, String>;

/// Authenticated identity handle handed out by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(Session),
    ConfirmationRequired,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The provider refused the request; the message is shown as-is.
    #[error("{0}")]
    Rejected(String),
    #[error("identity service unreachable: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub event: SessionEvent,
    pub session: Option<Session>,
}

impl SessionChange {
    pub fn signed_in(session: Session) -> Self {
        Self {
            event: SessionEvent::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            event: SessionEvent::SignedOut,
            session: None,
        }
    }
}

pub trait IdentityProvider: Send + Sync {
    fn current_session(&self) -> Option<Session>;
    fn subscribe(&self) -> Subscription;
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Metadata,
    ) -> Result<SignUpOutcome, IdentityError>;
    fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, IdentityError>;
    /// Ends `session` if it is still the active one. A session that has
    /// already been replaced by a newer sign-in is left alone.
    fn sign_out(&self, session: &Session) -> Result<(), IdentityError>;
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: HashMap<u64, Sender<SessionChange>>,
}

/// Fan-out point for session changes. Each subscriber owns a channel; the
/// UI loop drains it between frames.
#[derive(Default, Clone)]
pub struct SessionHub {
    inner: Arc<Mutex<HubInner>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.insert(id, tx);
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn publish(&self, change: SessionChange) {
        let mut inner = self.inner.lock();
        inner
            .subscribers
            .retain(|_, tx| tx.send(change.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// Live registration on a [`SessionHub`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: Receiver<SessionChange>,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn try_recv(&self) -> Option<SessionChange> {
        self.rx.try_recv().ok()
    }

    pub fn drain(&self) -> Vec<SessionChange> {
        self.rx.try_iter().collect()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner.lock().subscribers.remove(&self.id);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalAccount {
    id: String,
    email: String,
    password_hash: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    confirmed: bool,
    created_at: DateTime<Utc>,
}

impl LocalAccount {
    /// Every sign-in gets a fresh token so two logins of the same account
    /// are distinct sessions.
    fn session(&self) -> Session {
        Session {
            user_id: self.id.clone(),
            email: Some(self.email.clone()),
            metadata: self.metadata.clone(),
            access_token: Some(random_hex(16)),
        }
    }

    fn verify(&self, password: &str) -> bool {
        match bcrypt::verify(password, &self.password_hash) {
            Ok(matches) => matches,
            Err(err) => {
                warn!(email = %self.email, error = %err, "stored password hash unreadable");
                false
            }
        }
    }
}

/// Account registry kept in the same key-value store as the rest of the
/// application state.
pub struct LocalIdentity {
    store: Arc<dyn KeyValueStore>,
    require_confirmation: bool,
    hash_cost: u32,
    hub: SessionHub,
    current: Mutex<Option<Session>>,
}

impl LocalIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>, require_confirmation: bool) -> Self {
        let restored: Option<Session> = storage::load_json(store.as_ref(), SESSION_KEY);
        if let Some(session) = restored.as_ref() {
            debug!(user_id = %session.user_id, "restored local session");
        }
        Self {
            store,
            require_confirmation,
            hash_cost: HASH_COST,
            hub: SessionHub::new(),
            current: Mutex::new(restored),
        }
    }

    /// Overrides the bcrypt work factor for new passwords.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Marks a pending account as confirmed so it can sign in.
    pub fn confirm(&self, email: &str) -> Result<(), IdentityError> {
        let mut accounts = self.accounts();
        let key = normalize_email(email);
        let account = accounts
            .get_mut(&key)
            .ok_or_else(|| IdentityError::Rejected("User not found".into()))?;
        account.confirmed = true;
        storage::save_json(self.store.as_ref(), ACCOUNTS_KEY, &accounts);
        info!(email = %key, "local account confirmed");
        Ok(())
    }

    fn accounts(&self) -> BTreeMap<String, LocalAccount> {
        storage::load_json(self.store.as_ref(), ACCOUNTS_KEY)
    }

    fn establish(&self, session: Session) -> Session {
        storage::save_json(self.store.as_ref(), SESSION_KEY, &Some(&session));
        *self.current.lock() = Some(session.clone());
        self.hub.publish(SessionChange::signed_in(session.clone()));
        session
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_session(&self) -> Option<Session> {
        self.current.lock().clone()
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Metadata,
    ) -> Result<SignUpOutcome, IdentityError> {
        let key = normalize_email(email);
        let mut accounts = self.accounts();
        if accounts.contains_key(&key) {
            return Err(IdentityError::Rejected("User already registered".into()));
        }

        let password_hash = bcrypt::hash(password, self.hash_cost)
            .map_err(|err| IdentityError::Rejected(format!("Could not store password: {err}")))?;
        let account = LocalAccount {
            id: random_hex(16),
            email: key.clone(),
            password_hash,
            metadata,
            confirmed: !self.require_confirmation,
            created_at: Utc::now(),
        };
        accounts.insert(key.clone(), account.clone());
        storage::save_json(self.store.as_ref(), ACCOUNTS_KEY, &accounts);
        info!(email = %key, confirmed = account.confirmed, "local account created");

        if self.require_confirmation {
            return Ok(SignUpOutcome::ConfirmationRequired);
        }
        Ok(SignUpOutcome::SignedIn(self.establish(account.session())))
    }

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        let accounts = self.accounts();
        let account = accounts
            .get(&normalize_email(email))
            .filter(|account| account.verify(password))
            .ok_or_else(|| IdentityError::Rejected("Invalid login credentials".into()))?;
        if !account.confirmed {
            return Err(IdentityError::Rejected("Email not confirmed".into()));
        }
        Ok(self.establish(account.session()))
    }

    fn sign_out(&self, session: &Session) -> Result<(), IdentityError> {
        let mut current = self.current.lock();
        if current.as_ref() != Some(session) {
            debug!(user_id = %session.user_id, "sign-out skipped; session already replaced");
            return Ok(());
        }
        *current = None;
        storage::save_json(self.store.as_ref(), SESSION_KEY, &None::<Session>);
        self.hub.publish(SessionChange::signed_out());
        Ok(())
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn provider(require_confirmation: bool) -> (Arc<MemoryStore>, LocalIdentity) {
        let store = Arc::new(MemoryStore::new());
        let identity = LocalIdentity::new(store.clone(), require_confirmation);
        (store, identity)
    }

    fn sign_out_current(identity: &LocalIdentity) {
        let session = identity.current_session().expect("signed in");
        identity.sign_out(&session).unwrap();
    }

    fn username(name: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("username".into(), name.into());
        metadata
    }

    #[test]
    fn sign_up_without_confirmation_returns_session() {
        let (_store, identity) = provider(false);
        let outcome = identity
            .sign_up("Alice@Example.com", "hunter22", username("alice"))
            .unwrap();
        let SignUpOutcome::SignedIn(session) = outcome else {
            panic!("expected a session");
        };
        assert_eq!(session.email.as_deref(), Some("alice@example.com"));
        assert_eq!(session.metadata.get("username").map(String::as_str), Some("alice"));
        assert_eq!(identity.current_session(), Some(session));
    }

    #[test]
    fn sign_up_with_confirmation_returns_no_session() {
        let (_store, identity) = provider(true);
        let outcome = identity
            .sign_up("bob@example.com", "pw", Metadata::new())
            .unwrap();
        assert_eq!(outcome, SignUpOutcome::ConfirmationRequired);
        assert!(identity.current_session().is_none());

        let err = identity
            .sign_in_with_password("bob@example.com", "pw")
            .unwrap_err();
        assert_eq!(err.to_string(), "Email not confirmed");

        identity.confirm("bob@example.com").unwrap();
        assert!(identity.sign_in_with_password("bob@example.com", "pw").is_ok());
    }

    #[test]
    fn duplicate_sign_up_is_rejected() {
        let (_store, identity) = provider(false);
        identity.sign_up("a@b.c", "pw", Metadata::new()).unwrap();
        let err = identity.sign_up("A@B.C", "pw", Metadata::new()).unwrap_err();
        assert_eq!(err, IdentityError::Rejected("User already registered".into()));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let (_store, identity) = provider(false);
        identity.sign_up("a@b.c", "right", Metadata::new()).unwrap();
        sign_out_current(&identity);
        let err = identity.sign_in_with_password("a@b.c", "wrong").unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(identity.current_session().is_none());
    }

    #[test]
    fn session_is_restored_from_store() {
        let (store, identity) = provider(false);
        identity.sign_up("a@b.c", "pw", Metadata::new()).unwrap();
        let restored = LocalIdentity::new(store.clone(), false);
        assert_eq!(restored.current_session(), identity.current_session());

        sign_out_current(&identity);
        let after_sign_out = LocalIdentity::new(store, false);
        assert!(after_sign_out.current_session().is_none());
    }

    #[test]
    fn subscribers_see_changes_until_dropped() {
        let (_store, identity) = provider(false);
        let subscription = identity.subscribe();
        identity.sign_up("a@b.c", "pw", Metadata::new()).unwrap();
        sign_out_current(&identity);

        let events: Vec<SessionEvent> = subscription
            .drain()
            .into_iter()
            .map(|change| change.event)
            .collect();
        assert_eq!(events, vec![SessionEvent::SignedIn, SessionEvent::SignedOut]);

        assert_eq!(identity.hub.subscriber_count(), 1);
        subscription.unsubscribe();
        assert_eq!(identity.hub.subscriber_count(), 0);
    }

    #[test]
    fn passwords_are_stored_as_bcrypt_hashes() {
        let (store, identity) = provider(false);
        identity.sign_up("a@b.c", "hunter22", Metadata::new()).unwrap();
        let raw = store.get(ACCOUNTS_KEY).expect("accounts saved");
        assert!(!raw.contains("hunter22"));

        let accounts = identity.accounts();
        let account = &accounts["a@b.c"];
        assert!(account.password_hash.starts_with("$2"));
        assert!(account.verify("hunter22"));
        assert!(!account.verify("hunter23"));
        assert!(!raw.contains("\"salt\""));
    }

    #[test]
    fn unreadable_hash_fails_sign_in() {
        let (store, identity) = provider(false);
        identity.sign_up("a@b.c", "pw", Metadata::new()).unwrap();
        sign_out_current(&identity);

        let mut accounts = identity.accounts();
        if let Some(account) = accounts.get_mut("a@b.c") {
            account.password_hash = "not-a-hash".into();
        }
        storage::save_json(store.as_ref(), ACCOUNTS_KEY, &accounts);

        let err = identity.sign_in_with_password("a@b.c", "pw").unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[test]
    fn each_sign_in_is_a_distinct_session() {
        let (_store, identity) = provider(false);
        let SignUpOutcome::SignedIn(first) =
            identity.sign_up("a@b.c", "pw", Metadata::new()).unwrap()
        else {
            panic!("expected a session");
        };
        identity.sign_out(&first).unwrap();
        let second = identity.sign_in_with_password("a@b.c", "pw").unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert_ne!(first, second);
        assert_eq!(first.user_id.len(), 32);
        assert!(first.user_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn stale_sign_out_leaves_newer_session() {
        let (store, identity) = provider(false);
        let subscription = identity.subscribe();
        let SignUpOutcome::SignedIn(old) =
            identity.sign_up("a@b.c", "pw", Metadata::new()).unwrap()
        else {
            panic!("expected a session");
        };
        identity.sign_out(&old).unwrap();
        let newer = identity.sign_in_with_password("a@b.c", "pw").unwrap();
        subscription.drain();

        identity.sign_out(&old).unwrap();
        assert_eq!(identity.current_session(), Some(newer.clone()));
        assert!(subscription.drain().is_empty());
        let restored = LocalIdentity::new(store, false);
        assert_eq!(restored.current_session(), Some(newer));
    }
}
