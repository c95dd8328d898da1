use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::identity::{
    IdentityError, IdentityProvider, Metadata, Session, SessionChange, SessionHub, SignUpOutcome,
    Subscription, SESSION_KEY,
};
use crate::storage::{self, KeyValueStore};

#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub anon_key: String,
    pub timeout: Duration,
}

/// Identity provider backed by a GoTrue-compatible auth server.
pub struct RemoteIdentity {
    cfg: Config,
    client: Client,
    store: Arc<dyn KeyValueStore>,
    hub: SessionHub,
    current: Mutex<Option<Session>>,
}

impl RemoteIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>, cfg: Config) -> Result<Self> {
        if cfg.url.trim().is_empty() {
            bail!("identity: remote url is required");
        }
        Url::parse(cfg.url.trim()).context("identity: parse remote url")?;
        let client = Client::builder()
            .timeout(cfg.timeout)
            .user_agent(format!("reel-tui/{}", crate::VERSION))
            .build()
            .context("identity: build http client")?;
        let restored: Option<Session> = storage::load_json(store.as_ref(), SESSION_KEY);

        Ok(Self {
            cfg,
            client,
            store,
            hub: SessionHub::new(),
            current: Mutex::new(restored),
        })
    }

    fn post(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<Value, IdentityError> {
        let url = endpoint_url(&self.cfg.url, endpoint, query)
            .map_err(|err| IdentityError::Transport(err.to_string()))?;
        let mut req = self
            .client
            .post(url)
            .header("apikey", self.cfg.anon_key.as_str())
            .json(body);
        if let Some(token) = bearer {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = req
            .send()
            .map_err(|err| IdentityError::Transport(err.to_string()))?;
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        if !status.is_success() {
            debug!(%status, endpoint, "identity request rejected");
            return Err(IdentityError::Rejected(error_message(&text, status.as_u16())));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|err| IdentityError::Transport(format!("decode response: {err}")))
    }

    fn establish(&self, session: Session) -> Session {
        storage::save_json(self.store.as_ref(), SESSION_KEY, &Some(&session));
        *self.current.lock() = Some(session.clone());
        self.hub.publish(SessionChange::signed_in(session.clone()));
        session
    }
}

impl IdentityProvider for RemoteIdentity {
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
        let body = json!({
            "email": email.trim(),
            "password": password,
            "data": metadata,
        });
        let payload = self.post("signup", &[], &body, None)?;
        match session_from_payload(payload)? {
            Some(session) => Ok(SignUpOutcome::SignedIn(self.establish(session))),
            None => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        let body = json!({ "email": email.trim(), "password": password });
        let payload = self.post("token", &[("grant_type", "password")], &body, None)?;
        let session = session_from_payload(payload)?
            .ok_or_else(|| IdentityError::Rejected("No session returned".into()))?;
        Ok(self.establish(session))
    }

    fn sign_out(&self, session: &Session) -> Result<(), IdentityError> {
        {
            let mut current = self.current.lock();
            if current.as_ref() == Some(session) {
                *current = None;
                storage::save_json(self.store.as_ref(), SESSION_KEY, &None::<Session>);
                self.hub.publish(SessionChange::signed_out());
            } else {
                debug!(user_id = %session.user_id, "session already replaced; revoking token only");
            }
        }

        let Some(token) = session.access_token.as_deref() else {
            return Ok(());
        };
        if let Err(err) = self.post("logout", &[], &json!({}), Some(token)) {
            warn!(error = %err, "remote sign-out failed");
            return Err(err);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    user: Option<RemoteUser>,
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A sign-up that still needs confirmation answers with the bare user
/// object and no access token.
fn session_from_payload(payload: Value) -> Result<Option<Session>, IdentityError> {
    let token: TokenResponse = serde_json::from_value(payload)
        .map_err(|err| IdentityError::Transport(format!("decode session: {err}")))?;
    if token.access_token.is_empty() {
        return Ok(None);
    }
    let user = token
        .user
        .ok_or_else(|| IdentityError::Transport("session missing user".into()))?;
    let metadata = user
        .user_metadata
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key, text)),
            _ => None,
        })
        .collect();
    Ok(Some(Session {
        user_id: user.id,
        email: user.email.filter(|email| !email.trim().is_empty()),
        metadata,
        access_token: Some(token.access_token),
    }))
}

fn error_message(body: &str, status: u16) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    [
        parsed.msg,
        parsed.error_description,
        parsed.message,
        parsed.error,
    ]
    .into_iter()
    .flatten()
    .find(|text| !text.trim().is_empty())
    .unwrap_or_else(|| format!("request failed with status {status}"))
}

fn endpoint_url(base: &str, endpoint: &str, query: &[(&str, &str)]) -> Result<Url> {
    let mut url = Url::parse(base.trim()).context("identity: parse remote url")?;
    let path = format!("{}/auth/v1/{}", url.path().trim_end_matches('/'), endpoint);
    url.set_path(&path);
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}
