//! Session store: the single owner of the bearer token.
//!
//! Consumers hold a `SessionStore` value and register observers with
//! [`SessionStore::subscribe`]; every state transition is broadcast as a
//! [`SessionEvent`].

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::datastore::{KeyValueStore, TOKEN_KEY};
use crate::error::{TodoError, TodoResult};
use crate::gateway::{AuthGrant, CredentialService, Credentials};
use crate::todo::OwnerId;
use crate::token::decode_claims;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The token's `sub` claim.
    pub subject: String,
    pub user_id: Option<OwnerId>,
    pub email: Option<String>,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.subject)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub authenticated: bool,
}

/// Where the caller should send the user next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Dashboard,
    Login,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub snapshot: SessionSnapshot,
    pub navigation: Option<Navigation>,
}

/// Transient user-facing message produced by a recoverable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn Fn(&SessionEvent) + Send>;

pub struct SessionStore<S> {
    storage: S,
    token: Option<String>,
    identity: Option<Identity>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            token: None,
            identity: None,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            identity: self.identity.clone(),
            authenticated: self.token.is_some(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn require_token(&self) -> TodoResult<&str> {
        self.token().ok_or(TodoError::NotAuthenticated)
    }

    /// Restores the session from storage.
    ///
    /// Never fails: an unreadable, malformed or expired token is discarded
    /// and reported as a [`Notice`]; the session then stays empty.
    #[instrument(skip(self, now))]
    pub fn bootstrap(&mut self, now: DateTime<Utc>) -> Option<Notice> {
        let stored = match self.storage.get(TOKEN_KEY) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "failed reading stored token");
                self.discard_local();
                self.notify(None);
                return Some(Notice::new(format!(
                    "Could not read the saved session: {err}"
                )));
            }
        };

        let Some(token) = stored else {
            debug!("no stored token; starting unauthenticated");
            self.token = None;
            self.identity = None;
            self.notify(None);
            return None;
        };

        let notice = match decode_claims(&token) {
            Ok(claims) if claims.is_expired(now) => {
                info!(subject = %claims.sub, "stored token expired");
                self.discard_local();
                Some(Notice::new("Your session has expired. Please log in again."))
            }
            Ok(claims) => {
                info!(subject = %claims.sub, "restored session");
                self.identity = Some(Identity {
                    subject: claims.sub,
                    user_id: None,
                    email: None,
                });
                self.token = Some(token);
                None
            }
            Err(err) => {
                warn!(error = %err, "discarding stored token");
                self.discard_local();
                Some(Notice::new(format!(
                    "The saved session was invalid and has been cleared ({err})."
                )))
            }
        };

        self.notify(None);
        notice
    }

    #[instrument(skip(self, service, credentials), fields(email = %credentials.email))]
    pub async fn login<C>(
        &mut self,
        service: &C,
        credentials: &Credentials,
    ) -> TodoResult<Navigation>
    where
        C: CredentialService + ?Sized,
    {
        validate_credentials(credentials, false)?;
        let grant = service.login(credentials).await?;
        self.establish(grant)
    }

    /// Registers, then logs in with the same credentials when the server
    /// answers without a token.
    #[instrument(skip(self, service, credentials), fields(email = %credentials.email))]
    pub async fn register<C>(
        &mut self,
        service: &C,
        credentials: &Credentials,
    ) -> TodoResult<Navigation>
    where
        C: CredentialService + ?Sized,
    {
        validate_credentials(credentials, true)?;
        let registered = service.register(credentials).await?;
        let grant = if registered.access_token.is_some() {
            registered
        } else {
            info!("registration returned no token; logging in");
            let mut grant = service.login(credentials).await?;
            if grant.user.is_none() {
                grant.user = registered.user;
            }
            grant
        };
        self.establish(grant)
    }

    /// Best-effort remote logout followed by an unconditional local clear.
    #[instrument(skip(self, service))]
    pub async fn logout<C>(&mut self, service: &C) -> Navigation
    where
        C: CredentialService + ?Sized,
    {
        if let Err(err) = service.logout(self.token.as_deref()).await {
            warn!(error = %err, "remote logout failed; clearing local session anyway");
        }
        self.discard_local();
        self.notify(Some(Navigation::Login));
        Navigation::Login
    }

    fn establish(&mut self, grant: AuthGrant) -> TodoResult<Navigation> {
        let token = grant.access_token.ok_or_else(|| {
            TodoError::Decode("auth response carried no access_token".to_string())
        })?;
        let claims = decode_claims(&token)?;
        self.storage.set(TOKEN_KEY, &token)?;

        let (user_id, email) = match grant.user {
            Some(user) => (Some(user.id), Some(user.email)),
            None => (None, None),
        };
        info!(subject = %claims.sub, "session established");
        self.identity = Some(Identity {
            subject: claims.sub,
            user_id,
            email,
        });
        self.token = Some(token);
        self.notify(Some(Navigation::Dashboard));
        Ok(Navigation::Dashboard)
    }

    fn discard_local(&mut self) {
        self.token = None;
        self.identity = None;
        if let Err(err) = self.storage.remove(TOKEN_KEY) {
            warn!(error = %err, "failed removing stored token");
        }
    }

    fn notify(&self, navigation: Option<Navigation>) {
        let event = SessionEvent {
            snapshot: self.snapshot(),
            navigation,
        };
        for (_, observer) in &self.observers {
            observer(&event);
        }
    }
}

fn validate_credentials(credentials: &Credentials, registering: bool) -> TodoResult<()> {
    let email = credentials.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(TodoError::ValidationFailed(
            "a valid email address is required".to_string(),
        ));
    }
    if credentials.password.is_empty() {
        return Err(TodoError::ValidationFailed(
            "password cannot be empty".to_string(),
        ));
    }
    if registering && credentials.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(TodoError::ValidationFailed(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{Navigation, SessionEvent, SessionStore};
    use crate::datastore::{KeyValueStore, MemoryStore, TOKEN_KEY};
    use crate::error::{TodoError, TodoResult};
    use crate::gateway::{AuthGrant, CredentialService, Credentials, UserRecord};
    use crate::todo::OpaqueId;
    use crate::token::tests::make_token;

    #[derive(Default)]
    struct FakeCredentials {
        register_returns_token: bool,
        reject_login: bool,
        fail_logout: bool,
        calls: AtomicUsize,
    }

    impl FakeCredentials {
        fn grant(&self, email: &str) -> AuthGrant {
            AuthGrant {
                access_token: Some(make_token(json!({ "sub": email, "exp": 4_000_000_000_i64 }))),
                user: Some(UserRecord {
                    id: OpaqueId::new("7"),
                    email: email.to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl CredentialService for FakeCredentials {
        async fn register(&self, credentials: &Credentials) -> TodoResult<AuthGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.register_returns_token {
                Ok(self.grant(&credentials.email))
            } else {
                Ok(AuthGrant {
                    access_token: None,
                    user: Some(UserRecord {
                        id: OpaqueId::new("7"),
                        email: credentials.email.clone(),
                    }),
                })
            }
        }

        async fn login(&self, credentials: &Credentials) -> TodoResult<AuthGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_login {
                return Err(TodoError::RequestFailed {
                    status: 401,
                    message: "Incorrect email or password".to_string(),
                });
            }
            Ok(self.grant(&credentials.email))
        }

        async fn logout(&self, _token: Option<&str>) -> TodoResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_logout {
                return Err(TodoError::Transport("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn recorder<S: KeyValueStore>(store: &mut SessionStore<S>) -> Arc<Mutex<Vec<SessionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(move |event| {
            sink.lock().expect("lock").push(event.clone());
        });
        events
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("now")
    }

    #[test]
    fn bootstrap_without_token_is_unauthenticated() {
        let mut session = SessionStore::new(MemoryStore::new());
        let events = recorder(&mut session);

        assert_eq!(session.bootstrap(now()), None);
        assert!(!session.is_authenticated());
        assert_eq!(events.lock().expect("lock").len(), 1);
    }

    #[test]
    fn bootstrap_with_two_segment_token_clears_it() {
        let storage = MemoryStore::new();
        storage.set(TOKEN_KEY, "header.payload").expect("seed");
        let mut session = SessionStore::new(storage);

        let notice = session.bootstrap(now()).expect("notice");
        assert!(notice.message.contains("invalid"));
        assert!(!session.is_authenticated());
        assert_eq!(session.storage().get(TOKEN_KEY).expect("get"), None);
    }

    #[test]
    fn bootstrap_restores_identity_from_claims() {
        let storage = MemoryStore::new();
        let token = make_token(json!({ "sub": "ada@example.com", "exp": 4_000_000_000_i64 }));
        storage.set(TOKEN_KEY, &token).expect("seed");
        let mut session = SessionStore::new(storage);

        assert_eq!(session.bootstrap(now()), None);
        let snapshot = session.snapshot();
        assert!(snapshot.authenticated);
        assert_eq!(
            snapshot.identity.expect("identity").display_name(),
            "ada@example.com"
        );
        assert_eq!(session.token(), Some(token.as_str()));
    }

    #[test]
    fn bootstrap_discards_expired_token() {
        let storage = MemoryStore::new();
        let token = make_token(json!({ "sub": "ada@example.com", "exp": 1_000 }));
        storage.set(TOKEN_KEY, &token).expect("seed");
        let mut session = SessionStore::new(storage);

        let notice = session.bootstrap(now()).expect("notice");
        assert!(notice.message.contains("expired"));
        assert!(session.require_token().is_err());
        assert_eq!(session.storage().get(TOKEN_KEY).expect("get"), None);
    }

    #[tokio::test]
    async fn login_stores_token_and_signals_dashboard() {
        let service = FakeCredentials::default();
        let mut session = SessionStore::new(MemoryStore::new());
        let events = recorder(&mut session);

        let nav = session
            .login(&service, &Credentials::new("ada@example.com", "hunter22"))
            .await
            .expect("login");

        assert_eq!(nav, Navigation::Dashboard);
        assert!(session.storage().get(TOKEN_KEY).expect("get").is_some());
        let identity = session.snapshot().identity.expect("identity");
        assert_eq!(identity.user_id, Some(OpaqueId::new("7")));

        let events = events.lock().expect("lock");
        let last = events.last().expect("event");
        assert!(last.snapshot.authenticated);
        assert_eq!(last.navigation, Some(Navigation::Dashboard));
    }

    #[tokio::test]
    async fn failed_login_leaves_session_empty() {
        let service = FakeCredentials {
            reject_login: true,
            ..FakeCredentials::default()
        };
        let mut session = SessionStore::new(MemoryStore::new());

        let err = session
            .login(&service, &Credentials::new("ada@example.com", "wrong-pass"))
            .await
            .expect_err("must fail");

        assert_eq!(err.user_message(), "Incorrect email or password");
        assert!(!session.is_authenticated());
        assert_eq!(session.storage().get(TOKEN_KEY).expect("get"), None);
    }

    #[tokio::test]
    async fn register_without_token_falls_back_to_login() {
        let service = FakeCredentials::default();
        let mut session = SessionStore::new(MemoryStore::new());

        session
            .register(&service, &Credentials::new("ada@example.com", "long-enough"))
            .await
            .expect("register");

        assert!(session.is_authenticated());
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_network() {
        let service = FakeCredentials {
            register_returns_token: true,
            ..FakeCredentials::default()
        };
        let mut session = SessionStore::new(MemoryStore::new());

        let err = session
            .register(&service, &Credentials::new("ada@example.com", "short"))
            .await
            .expect_err("must fail");

        assert!(matches!(err, TodoError::ValidationFailed(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logout_clears_even_when_remote_fails() {
        let service = FakeCredentials {
            fail_logout: true,
            ..FakeCredentials::default()
        };
        let mut session = SessionStore::new(MemoryStore::new());
        session
            .login(&service, &Credentials::new("ada@example.com", "hunter22"))
            .await
            .expect("login");
        let events = recorder(&mut session);

        let nav = session.logout(&service).await;

        assert_eq!(nav, Navigation::Login);
        assert!(!session.is_authenticated());
        assert_eq!(session.storage().get(TOKEN_KEY).expect("get"), None);
        let events = events.lock().expect("lock");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].navigation, Some(Navigation::Login));
        assert!(!events[0].snapshot.authenticated);
    }

    #[test]
    fn unsubscribed_observers_stop_hearing_events() {
        let mut session = SessionStore::new(MemoryStore::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = session.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.bootstrap(now());
        assert!(session.unsubscribe(id));
        session.bootstrap(now());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!session.unsubscribe(id));
    }
}
