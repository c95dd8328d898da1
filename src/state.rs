use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::identity::Session;
use crate::storage::{self, KeyValueStore};

pub const LIKES_KEY: &str = "likes";
pub const USER_LIKES_KEY: &str = "user_likes";
pub const COMMENTS_KEY: &str = "comments";
pub const USER_AVATARS_KEY: &str = "user_avatars";

const PLACEHOLDER_USERNAME: &str = "user";

pub type LikesState = BTreeMap<String, u32>;
pub type UserLikesState = BTreeMap<String, BTreeSet<String>>;
pub type UserAvatarState = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: Option<String>,
    pub username: String,
}

impl CurrentUser {
    /// Username comes from the `username` metadata field, then the email's
    /// local part, then a fixed placeholder.
    pub fn from_session(session: &Session) -> Self {
        let explicit = session
            .metadata
            .get("username")
            .map(|name| name.trim())
            .filter(|name| !name.is_empty());
        let from_email = session
            .email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .map(str::trim)
            .filter(|local| !local.is_empty());
        let username = explicit
            .or(from_email)
            .unwrap_or(PLACEHOLDER_USERNAME)
            .to_string();
        Self {
            id: session.user_id.clone(),
            email: session.email.clone(),
            username,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub video_id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("You must be logged in to do that.")]
    NotLoggedIn,
    #[error("unknown video {0}")]
    UnknownVideo(String),
    #[error("A different user is logged in now.")]
    UserChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOutcome {
    pub liked: bool,
    pub count: u32,
}

/// Likes, comments and avatars for the catalog, mirrored to the store after
/// every mutation.
pub struct AppState {
    catalog: Arc<Catalog>,
    store: Arc<dyn KeyValueStore>,
    current_user: Option<CurrentUser>,
    likes: LikesState,
    user_likes: UserLikesState,
    comments: Vec<Comment>,
    avatars: UserAvatarState,
}

impl AppState {
    /// Rebuilds state from the store. Missing or malformed documents load as
    /// empty; memberships outside the catalog are dropped and counts are
    /// recomputed from the remaining memberships.
    pub fn hydrate(catalog: Arc<Catalog>, store: Arc<dyn KeyValueStore>) -> Self {
        let stored_likes: LikesState = storage::load_json(store.as_ref(), LIKES_KEY);
        let mut user_likes: UserLikesState = storage::load_json(store.as_ref(), USER_LIKES_KEY);
        let mut comments: Vec<Comment> = storage::load_json(store.as_ref(), COMMENTS_KEY);
        let avatars: UserAvatarState = storage::load_json(store.as_ref(), USER_AVATARS_KEY);

        for set in user_likes.values_mut() {
            set.retain(|id| catalog.contains(id));
        }
        user_likes.retain(|_, set| !set.is_empty());
        comments.retain(|comment| catalog.contains(&comment.video_id));

        let likes = count_memberships(&user_likes);
        if likes != stored_likes {
            debug!("stored like counts disagree with memberships; recomputed");
        }
        info!(
            likes = likes.len(),
            comments = comments.len(),
            avatars = avatars.len(),
            "state hydrated"
        );

        Self {
            catalog,
            store,
            current_user: None,
            likes,
            user_likes,
            comments,
            avatars,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.current_user.as_ref()
    }

    pub fn set_current_user(&mut self, user: Option<CurrentUser>) {
        self.current_user = user;
    }

    pub fn like_count(&self, video_id: &str) -> u32 {
        self.likes.get(video_id).copied().unwrap_or(0)
    }

    pub fn is_liked(&self, video_id: &str) -> bool {
        self.current_user
            .as_ref()
            .and_then(|user| self.user_likes.get(&user.username))
            .is_some_and(|set| set.contains(video_id))
    }

    pub fn likes(&self) -> &LikesState {
        &self.likes
    }

    pub fn user_likes(&self) -> &UserLikesState {
        &self.user_likes
    }

    pub fn avatars(&self) -> &UserAvatarState {
        &self.avatars
    }

    pub fn avatar_for(&self, user_id: &str) -> Option<&str> {
        self.avatars.get(user_id).map(String::as_str)
    }

    pub fn all_comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Comments on `video_id`, oldest first; equal timestamps keep insertion
    /// order.
    pub fn comments_for(&self, video_id: &str) -> Vec<&Comment> {
        let mut list: Vec<&Comment> = self
            .comments
            .iter()
            .filter(|comment| comment.video_id == video_id)
            .collect();
        list.sort_by_key(|comment| comment.created_at);
        list
    }

    pub fn comment_count(&self, video_id: &str) -> usize {
        self.comments
            .iter()
            .filter(|comment| comment.video_id == video_id)
            .count()
    }

    pub fn toggle_like(&mut self, video_id: &str) -> Result<LikeOutcome, StateError> {
        let username = self.require_user()?.username.clone();
        if !self.catalog.contains(video_id) {
            return Err(StateError::UnknownVideo(video_id.to_string()));
        }

        let set = self.user_likes.entry(username.clone()).or_default();
        let liked = if set.remove(video_id) {
            false
        } else {
            set.insert(video_id.to_string());
            true
        };
        if set.is_empty() {
            self.user_likes.remove(&username);
        }

        let count = self.likes.entry(video_id.to_string()).or_insert(0);
        *count = if liked {
            count.saturating_add(1)
        } else {
            count.saturating_sub(1)
        };
        let count = *count;
        if count == 0 {
            self.likes.remove(video_id);
        }

        storage::save_json(self.store.as_ref(), USER_LIKES_KEY, &self.user_likes);
        storage::save_json(self.store.as_ref(), LIKES_KEY, &self.likes);
        debug!(video_id, %username, liked, count, "like toggled");
        Ok(LikeOutcome { liked, count })
    }

    /// Returns `Ok(None)` when the trimmed text is empty.
    pub fn add_comment(
        &mut self,
        video_id: &str,
        text: &str,
    ) -> Result<Option<Comment>, StateError> {
        self.add_comment_at(video_id, text, Utc::now())
    }

    pub(crate) fn add_comment_at(
        &mut self,
        video_id: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Comment>, StateError> {
        let author = self.require_user()?.username.clone();
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if !self.catalog.contains(video_id) {
            return Err(StateError::UnknownVideo(video_id.to_string()));
        }

        let comment = Comment {
            id: self.comment_id(video_id, at),
            video_id: video_id.to_string(),
            author,
            text: text.to_string(),
            created_at: at,
        };
        self.comments.push(comment.clone());
        storage::save_json(self.store.as_ref(), COMMENTS_KEY, &self.comments);
        debug!(video_id, id = %comment.id, "comment added");
        Ok(Some(comment))
    }

    /// Stores `bytes` as the current user's avatar, replacing any previous one.
    pub fn set_avatar(&mut self, bytes: &[u8]) -> Result<String, StateError> {
        let user_id = self.require_user()?.id.clone();
        self.set_avatar_for(&user_id, bytes)
    }

    /// Like [`AppState::set_avatar`], for a request made by `user_id`. Fails
    /// when that user is no longer the one logged in.
    pub fn set_avatar_for(&mut self, user_id: &str, bytes: &[u8]) -> Result<String, StateError> {
        if self.require_user()?.id != user_id {
            return Err(StateError::UserChanged);
        }
        let user_id = user_id.to_string();
        let data_url = avatar_data_url(bytes);
        self.avatars.insert(user_id.clone(), data_url.clone());
        storage::save_json(self.store.as_ref(), USER_AVATARS_KEY, &self.avatars);
        info!(%user_id, bytes = bytes.len(), "avatar updated");
        Ok(data_url)
    }

    fn require_user(&self) -> Result<&CurrentUser, StateError> {
        self.current_user.as_ref().ok_or(StateError::NotLoggedIn)
    }

    fn comment_id(&self, video_id: &str, at: DateTime<Utc>) -> String {
        let base = format!("{video_id}-{}", at.timestamp_millis());
        let taken = |id: &str| self.comments.iter().any(|comment| comment.id == id);
        let mut id = base.clone();
        let mut rng = rand::thread_rng();
        while taken(&id) {
            let suffix: u16 = rng.gen();
            id = format!("{base}-{suffix:04x}");
        }
        id
    }
}

fn count_memberships(user_likes: &UserLikesState) -> LikesState {
    let mut counts = LikesState::new();
    for id in user_likes.values().flatten() {
        *counts.entry(id.clone()).or_insert(0) += 1;
    }
    counts
}

pub fn avatar_data_url(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or_else(|_| tree_magic_mini::from_u8(bytes));
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Splits a `data:` URL back into its MIME type and raw bytes.
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn user(name: &str) -> CurrentUser {
        CurrentUser {
            id: format!("id-{name}"),
            email: Some(format!("{name}@example.com")),
            username: name.to_string(),
        }
    }

    fn fresh() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::hydrate(Arc::new(Catalog::builtin()), store.clone());
        (store, state)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn session(metadata: &[(&str, &str)], email: Option<&str>) -> Session {
        Session {
            user_id: "u-1".into(),
            email: email.map(str::to_string),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            access_token: None,
        }
    }

    #[test]
    fn username_prefers_metadata_then_email_then_placeholder() {
        let explicit = session(&[("username", "neo")], Some("thomas@matrix.io"));
        assert_eq!(CurrentUser::from_session(&explicit).username, "neo");

        let blank = session(&[("username", "  ")], Some("thomas@matrix.io"));
        assert_eq!(CurrentUser::from_session(&blank).username, "thomas");

        let none = session(&[], None);
        let current = CurrentUser::from_session(&none);
        assert_eq!(current.username, "user");
        assert_eq!(current.id, "u-1");
    }

    #[test]
    fn mutations_require_login() {
        let (store, mut state) = fresh();
        assert_eq!(
            state.toggle_like("wowfinalfinal1"),
            Err(StateError::NotLoggedIn)
        );
        assert_eq!(
            state.add_comment("wowfinalfinal1", "hi"),
            Err(StateError::NotLoggedIn)
        );
        assert_eq!(state.set_avatar(b"img"), Err(StateError::NotLoggedIn));
        assert_eq!(state.like_count("wowfinalfinal1"), 0);
        assert!(state.all_comments().is_empty());
        assert!(store.get(LIKES_KEY).is_none());
    }

    #[test]
    fn toggle_like_is_its_own_inverse() {
        let (_store, mut state) = fresh();
        state.set_current_user(Some(user("alice")));

        let first = state.toggle_like("wowfinalfinal2").unwrap();
        assert_eq!(first, LikeOutcome { liked: true, count: 1 });
        assert!(state.is_liked("wowfinalfinal2"));

        let second = state.toggle_like("wowfinalfinal2").unwrap();
        assert_eq!(second, LikeOutcome { liked: false, count: 0 });
        assert!(!state.is_liked("wowfinalfinal2"));
        assert!(state.likes().is_empty());
        assert!(state.user_likes().is_empty());
    }

    #[test]
    fn counts_track_memberships_across_users() {
        let (_store, mut state) = fresh();
        let sequence = [
            ("alice", "wowfinalfinal1"),
            ("bob", "wowfinalfinal1"),
            ("alice", "wowfinalfinal3"),
            ("bob", "wowfinalfinal1"),
            ("carol", "wowfinalfinal1"),
            ("alice", "wowfinalfinal1"),
            ("alice", "wowfinalfinal1"),
        ];
        for (name, video) in sequence {
            state.set_current_user(Some(user(name)));
            state.toggle_like(video).unwrap();
            for video in state.catalog().clone().videos() {
                let members = state
                    .user_likes()
                    .values()
                    .filter(|set| set.contains(&video.id))
                    .count() as u32;
                assert_eq!(state.like_count(&video.id), members);
            }
        }
        assert_eq!(state.like_count("wowfinalfinal1"), 2);
        assert_eq!(state.like_count("wowfinalfinal3"), 1);
    }

    #[test]
    fn toggle_like_rejects_unknown_video() {
        let (_store, mut state) = fresh();
        state.set_current_user(Some(user("alice")));
        assert_eq!(
            state.toggle_like("nope"),
            Err(StateError::UnknownVideo("nope".into()))
        );
        assert!(state.user_likes().is_empty());
    }

    #[test]
    fn empty_comment_is_ignored() {
        let (_store, mut state) = fresh();
        state.set_current_user(Some(user("alice")));
        assert_eq!(state.add_comment("wowfinalfinal1", "   \n\t"), Ok(None));
        assert_eq!(state.comment_count("wowfinalfinal1"), 0);
    }

    #[test]
    fn comments_sort_by_time_with_stable_ties() {
        let (_store, mut state) = fresh();
        state.set_current_user(Some(user("alice")));
        state.add_comment_at("wowfinalfinal1", "late", at(30)).unwrap();
        state.add_comment_at("wowfinalfinal1", "early", at(10)).unwrap();
        state.add_comment_at("wowfinalfinal2", "other", at(5)).unwrap();
        state.add_comment_at("wowfinalfinal1", "tie", at(30)).unwrap();

        let texts: Vec<&str> = state
            .comments_for("wowfinalfinal1")
            .iter()
            .map(|comment| comment.text.as_str())
            .collect();
        assert_eq!(texts, vec!["early", "late", "tie"]);
        assert_eq!(state.comment_count("wowfinalfinal1"), 3);
    }

    #[test]
    fn comment_ids_stay_unique_within_a_millisecond() {
        let (_store, mut state) = fresh();
        state.set_current_user(Some(user("alice")));
        let a = state.add_comment_at("wowfinalfinal1", "a", at(1)).unwrap().unwrap();
        let b = state.add_comment_at("wowfinalfinal1", "b", at(1)).unwrap().unwrap();
        assert_eq!(a.id, "wowfinalfinal1-1000");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn suffixed_comment_ids_never_repeat() {
        let (_store, mut state) = fresh();
        state.set_current_user(Some(user("alice")));
        for n in 0..600 {
            state
                .add_comment_at("wowfinalfinal1", &format!("burst {n}"), at(1))
                .unwrap();
        }
        let ids: std::collections::HashSet<&str> = state
            .all_comments()
            .iter()
            .map(|comment| comment.id.as_str())
            .collect();
        assert_eq!(ids.len(), 600);
    }

    #[test]
    fn avatar_for_requires_the_requesting_user() {
        let (_store, mut state) = fresh();
        assert_eq!(
            state.set_avatar_for("id-alice", b"img"),
            Err(StateError::NotLoggedIn)
        );
        state.set_current_user(Some(user("bob")));
        assert_eq!(
            state.set_avatar_for("id-alice", b"img"),
            Err(StateError::UserChanged)
        );
        assert!(state.avatars().is_empty());

        state.set_avatar_for("id-bob", b"img").unwrap();
        assert!(state.avatar_for("id-bob").is_some());
    }

    #[test]
    fn state_round_trips_through_store() {
        let (store, mut state) = fresh();
        state.set_current_user(Some(user("alice")));
        state.toggle_like("wowfinalfinal1").unwrap();
        state.toggle_like("wowfinalfinal4").unwrap();
        state.add_comment("wowfinalfinal1", " nice ").unwrap();
        state.set_avatar(b"\x89PNG\r\n\x1a\n").unwrap();

        let reloaded = AppState::hydrate(Arc::new(Catalog::builtin()), store);
        assert_eq!(reloaded.likes(), state.likes());
        assert_eq!(reloaded.user_likes(), state.user_likes());
        assert_eq!(reloaded.all_comments(), state.all_comments());
        assert_eq!(reloaded.avatars(), state.avatars());
        assert_eq!(reloaded.all_comments()[0].text, "nice");
        assert!(reloaded.current_user().is_none());
    }

    #[test]
    fn corrupt_store_hydrates_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(LIKES_KEY, "not json");
        store.set(USER_LIKES_KEY, "[1,2,3]");
        store.set(COMMENTS_KEY, r#"{"oops":true}"#);
        store.set(USER_AVATARS_KEY, "42");
        let state = AppState::hydrate(Arc::new(Catalog::builtin()), store);
        assert!(state.likes().is_empty());
        assert!(state.user_likes().is_empty());
        assert!(state.all_comments().is_empty());
        assert!(state.avatars().is_empty());
    }

    #[test]
    fn hydrate_reconciles_counts_and_drops_unknown_videos() {
        let store = Arc::new(MemoryStore::new());
        store.set(LIKES_KEY, r#"{"wowfinalfinal1":7,"ghost":3}"#);
        store.set(
            USER_LIKES_KEY,
            r#"{"alice":["wowfinalfinal1","ghost"],"bob":["ghost"]}"#,
        );
        let state = AppState::hydrate(Arc::new(Catalog::builtin()), store);
        assert_eq!(state.like_count("wowfinalfinal1"), 1);
        assert_eq!(state.like_count("ghost"), 0);
        assert!(!state.user_likes().contains_key("bob"));
    }

    #[test]
    fn avatar_replaces_previous_and_encodes_mime() {
        let (_store, mut state) = fresh();
        state.set_current_user(Some(user("alice")));
        state.set_avatar(b"first").unwrap();
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        let url = state.set_avatar(png).unwrap();
        assert_eq!(state.avatars().len(), 1);
        assert_eq!(state.avatar_for("id-alice"), Some(url.as_str()));

        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, png.to_vec());
    }

    #[test]
    fn alice_scenario() {
        let (_store, mut state) = fresh();
        let alice = CurrentUser::from_session(&session(&[], Some("alice@example.com")));
        state.set_current_user(Some(alice));

        assert_eq!(state.like_count("wowfinalfinal1"), 0);
        state.toggle_like("wowfinalfinal1").unwrap();
        assert_eq!(state.like_count("wowfinalfinal1"), 1);
        assert!(state.user_likes()["alice"].contains("wowfinalfinal1"));

        let comment = state.add_comment("wowfinalfinal1", "nice").unwrap().unwrap();
        assert_eq!(comment.author, "alice");
        assert_eq!(state.comment_count("wowfinalfinal1"), 1);

        state.set_current_user(None);
        for video in state.catalog().clone().videos() {
            assert_eq!(state.toggle_like(&video.id), Err(StateError::NotLoggedIn));
        }
        assert_eq!(state.like_count("wowfinalfinal1"), 1);
    }
}
