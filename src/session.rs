use async_trait::async_trait;
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{auth::Identity, models::Role};

// --- Cookie Contract ---

/// Names the server-side session.
pub const SESSION_COOKIE: &str = "sessionId";
/// Identity cookies mirroring the session's identity.
pub const USER_ID_COOKIE: &str = "usuario_id";
pub const USER_NAME_COOKIE: &str = "usuario_nombre";
pub const USER_ROLE_COOKIE: &str = "usuario_rol";

/// Identity cookies expire after one hour regardless of the server session.
pub const IDENTITY_COOKIE_MAX_AGE: time::Duration = time::Duration::hours(1);

const IDENTITY_COOKIES: [&str; 3] = [USER_ID_COOKIE, USER_NAME_COOKIE, USER_ROLE_COOKIE];

/// SessionId
///
/// Opaque key of a server-side session, carried in the `sessionId` cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(SessionId)
    }
}

/// RequestSession
///
/// The session as seen by one request: which server-side session it belongs to
/// (if any) and the identity resolved for it. Built by `auth::load_session` and
/// passed down the handler chain through request extensions.
#[derive(Debug, Clone, Default)]
pub struct RequestSession {
    pub id: Option<SessionId>,
    pub identity: Option<Identity>,
}

// --- Materialization ---

/// materialize
///
/// Produces the effective identity of a request. A session that already holds an
/// identity is returned untouched and cookies are not read. Otherwise the
/// identity is rebuilt from the identity cookies and stored in `session` for the
/// rest of the request. Neither the session store nor the cookies are written.
pub fn materialize<'a>(session: &'a mut RequestSession, jar: &CookieJar) -> Option<&'a Identity> {
    if session.identity.is_none() {
        session.identity = identity_from_cookies(jar);
    }
    session.identity.as_ref()
}

/// Rebuilds an identity from the three identity cookies, trusting their values.
/// Requires `usuario_id`; a missing name reads as empty and a missing or unknown
/// role as no role.
pub fn identity_from_cookies(jar: &CookieJar) -> Option<Identity> {
    let raw_id = jar.get(USER_ID_COOKIE)?.value();
    let id = match Uuid::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!(cookie = USER_ID_COOKIE, "ignoring malformed identity cookie");
            return None;
        }
    };

    Some(Identity {
        id,
        display_name: jar
            .get(USER_NAME_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .unwrap_or_default(),
        role: jar
            .get(USER_ROLE_COOKIE)
            .and_then(|cookie| cookie.value().parse::<Role>().ok()),
    })
}

// --- Cookie Issuing ---

/// Adds the three identity cookies (HttpOnly, one hour).
pub fn issue_identity_cookies(jar: CookieJar, identity: &Identity, secure: bool) -> CookieJar {
    let role = identity.role.map(|role| role.as_str()).unwrap_or_default();
    jar.add(identity_cookie(USER_ID_COOKIE, identity.id.to_string(), secure))
        .add(identity_cookie(USER_NAME_COOKIE, identity.display_name.clone(), secure))
        .add(identity_cookie(USER_ROLE_COOKIE, role.to_string(), secure))
}

/// Re-issues only `usuario_nombre`, used when the holder renames themselves.
pub fn issue_name_cookie(jar: CookieJar, display_name: &str, secure: bool) -> CookieJar {
    jar.add(identity_cookie(USER_NAME_COOKIE, display_name.to_string(), secure))
}

/// Adds the browser-session `sessionId` cookie.
pub fn issue_session_cookie(jar: CookieJar, id: SessionId, secure: bool) -> CookieJar {
    jar.add(
        Cookie::build((SESSION_COOKIE, id.to_string()))
            .http_only(true)
            .path("/")
            .same_site(SameSite::Lax)
            .secure(secure)
            .build(),
    )
}

/// Removes the identity cookies and the session cookie.
pub fn clear_cookies(jar: CookieJar) -> CookieJar {
    IDENTITY_COOKIES
        .into_iter()
        .chain([SESSION_COOKIE])
        .fold(jar, |jar, name| jar.remove(Cookie::build(name).path("/")))
}

fn identity_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .path("/")
        .max_age(IDENTITY_COOKIE_MAX_AGE)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

// --- Session Store ---

/// SessionStore
///
/// Server-side session storage. Scoped to one process: identities that are not
/// found here are recovered from the identity cookies instead.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Opens a new session holding `identity`.
    async fn create(&self, identity: Identity) -> SessionId;
    /// Returns the session's identity and renews its idle timer.
    async fn get(&self, id: &SessionId) -> Option<Identity>;
    /// Replaces the identity of an existing session. Unknown ids are ignored.
    async fn set(&self, id: &SessionId, identity: Identity);
    async fn destroy(&self, id: &SessionId);
}

/// SessionState
///
/// The concrete type used to share the session store across the application state.
pub type SessionState = Arc<dyn SessionStore>;

struct SessionEntry {
    identity: Identity,
    last_seen: Instant,
}

/// MemorySessionStore
///
/// In-process session store with an idle timeout. Expired entries are dropped
/// when touched and swept whenever a new session is created.
pub struct MemorySessionStore {
    ttl: Duration,
    entries: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn expired(&self, entry: &SessionEntry) -> bool {
        entry.last_seen.elapsed() >= self.ttl
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, identity: Identity) -> SessionId {
        let id = SessionId::new();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.last_seen.elapsed() < self.ttl);
        entries.insert(
            id,
            SessionEntry {
                identity,
                last_seen: Instant::now(),
            },
        );
        id
    }

    async fn get(&self, id: &SessionId) -> Option<Identity> {
        let mut entries = self.entries.write().await;
        let expired = self.expired(entries.get(id)?);
        if expired {
            entries.remove(id);
            tracing::debug!(session = %id, "server session expired");
            return None;
        }
        let entry = entries.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.identity.clone())
    }

    async fn set(&self, id: &SessionId, identity: Identity) {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.identity = identity;
            entry.last_seen = Instant::now();
        }
    }

    async fn destroy(&self, id: &SessionId) {
        self.entries.write().await.remove(id);
    }
}
