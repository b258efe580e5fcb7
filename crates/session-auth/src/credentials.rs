//! Process-wide session credential store
//!
//! Holds the `{access, refresh}` token pair behind a tokio Mutex. Every
//! mutation is written to the backing store first and published to memory
//! only once the write succeeded, so memory never holds a session the
//! backend doesn't know about.
//!
//! The store is an explicit object: the CLI builds one at startup from its
//! credential file, and each test builds a fresh one over `MemoryStore`.

use std::sync::Arc;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{KeyValueStore, MemoryStore, StoreChange};
use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::Result;

/// Snapshot of the session tokens.
///
/// Absence of both tokens means logged out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
    state: Mutex<Credentials>,
}

impl CredentialStore {
    /// Initialize from whatever the backend persisted.
    pub async fn load(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let access_token = backend
            .get(ACCESS_TOKEN_KEY)
            .await?
            .and_then(Secret::non_empty);
        let refresh_token = backend
            .get(REFRESH_TOKEN_KEY)
            .await?
            .and_then(Secret::non_empty);

        if refresh_token.is_some() && access_token.is_none() {
            warn!("persisted session has a refresh token but no access token");
        }
        info!(
            logged_in = access_token.is_some(),
            has_refresh_token = refresh_token.is_some(),
            "credential store initialized"
        );

        Ok(Self {
            backend,
            state: Mutex::new(Credentials {
                access_token,
                refresh_token,
            }),
        })
    }

    /// Empty store over a fresh `MemoryStore`.
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryStore::new()),
            state: Mutex::new(Credentials::default()),
        }
    }

    pub async fn get(&self) -> Credentials {
        self.state.lock().await.clone()
    }

    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.state.lock().await.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.state.lock().await.refresh_token.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.state.lock().await.access_token.is_some()
    }

    /// Store a full session (login).
    pub async fn set(&self, access: Secret<String>, refresh: Secret<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        self.backend
            .apply(vec![
                StoreChange::set(ACCESS_TOKEN_KEY, access.as_str()),
                StoreChange::set(REFRESH_TOKEN_KEY, refresh.as_str()),
            ])
            .await?;
        state.access_token = Some(access);
        state.refresh_token = Some(refresh);
        debug!("stored session tokens");
        Ok(())
    }

    /// Replace only the access token (after a refresh).
    pub async fn set_access(&self, access: Secret<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        self.backend
            .apply(vec![StoreChange::set(ACCESS_TOKEN_KEY, access.as_str())])
            .await?;
        state.access_token = Some(access);
        debug!("stored renewed access token");
        Ok(())
    }

    /// Replace the access token only while the session is still the one
    /// holding `expected_refresh`.
    ///
    /// Returns `Ok(false)` without touching the backend when the session was
    /// cleared or replaced in the meantime.
    pub async fn set_access_if(
        &self,
        expected_refresh: &Secret<String>,
        access: Secret<String>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.refresh_token.as_ref() != Some(expected_refresh) {
            debug!("session changed, discarding renewed access token");
            return Ok(false);
        }
        self.backend
            .apply(vec![StoreChange::set(ACCESS_TOKEN_KEY, access.as_str())])
            .await?;
        state.access_token = Some(access);
        debug!("stored renewed access token");
        Ok(true)
    }

    /// Clear the session only while its refresh token is still
    /// `expected_refresh` (`None` meaning a session without one).
    ///
    /// Returns `Ok(false)` and leaves everything untouched when a different
    /// session is now stored.
    pub async fn clear_if(&self, expected_refresh: Option<&Secret<String>>) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.refresh_token.as_ref() != expected_refresh {
            debug!("session changed, keeping it");
            return Ok(false);
        }
        self.clear_locked(&mut state).await.map(|()| true)
    }

    /// Remove both tokens. Safe to call repeatedly.
    ///
    /// Memory is cleared even when the backend write fails: the session must
    /// stop being used in this process regardless. The backend error is still
    /// returned so the caller can report it.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.clear_locked(&mut state).await
    }

    async fn clear_locked(&self, state: &mut Credentials) -> Result<()> {
        let result = self
            .backend
            .apply(vec![
                StoreChange::remove(ACCESS_TOKEN_KEY),
                StoreChange::remove(REFRESH_TOKEN_KEY),
            ])
            .await;
        *state = Credentials::default();
        if let Err(ref e) = result {
            warn!(error = %e, "failed to persist credential removal");
        } else {
            debug!("cleared session tokens");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileStore;
    use crate::error::Error;
    use std::future::Future;
    use std::pin::Pin;

    /// Backend whose writes always fail.
    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get<'a>(
            &'a self,
            key: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
            self.0.get(key)
        }

        fn apply(
            &self,
            _changes: Vec<StoreChange>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Err(Error::Io("read-only medium".into())) })
        }
    }

    #[tokio::test]
    async fn load_reads_persisted_tokens() {
        let backend = Arc::new(MemoryStore::with_entries([
            ("token", "at_1"),
            ("refreshToken", "rt_1"),
        ]));
        let store = CredentialStore::load(backend).await.unwrap();

        let creds = store.get().await;
        assert_eq!(creds.access_token.unwrap().as_str(), "at_1");
        assert_eq!(creds.refresh_token.unwrap().as_str(), "rt_1");
        assert!(store.is_logged_in().await);
    }

    #[tokio::test]
    async fn load_treats_empty_values_as_absent() {
        let backend = Arc::new(MemoryStore::with_entries([("token", ""), ("refreshToken", "")]));
        let store = CredentialStore::load(backend).await.unwrap();

        assert!(store.get().await.is_empty());
        assert!(!store.is_logged_in().await);
    }

    #[tokio::test]
    async fn set_persists_both_tokens() {
        let backend = Arc::new(MemoryStore::new());
        let store = CredentialStore::load(backend.clone()).await.unwrap();

        store.set("at_1".into(), "rt_1".into()).await.unwrap();

        let persisted = backend.snapshot().await;
        assert_eq!(persisted["token"], "at_1");
        assert_eq!(persisted["refreshToken"], "rt_1");
    }

    #[tokio::test]
    async fn set_access_keeps_refresh_token() {
        let store = CredentialStore::in_memory();
        store.set("at_1".into(), "rt_1".into()).await.unwrap();

        store.set_access("at_2".into()).await.unwrap();

        let creds = store.get().await;
        assert_eq!(creds.access_token.unwrap().as_str(), "at_2");
        assert_eq!(creds.refresh_token.unwrap().as_str(), "rt_1");
    }

    #[tokio::test]
    async fn set_access_if_applies_to_the_same_session() {
        let backend = Arc::new(MemoryStore::new());
        let store = CredentialStore::load(backend.clone()).await.unwrap();
        store.set("at_1".into(), "rt_1".into()).await.unwrap();

        assert!(store.set_access_if(&"rt_1".into(), "at_2".into()).await.unwrap());
        assert_eq!(store.access_token().await.unwrap().as_str(), "at_2");
        assert_eq!(backend.snapshot().await["token"], "at_2");
    }

    #[tokio::test]
    async fn set_access_if_skips_a_cleared_session() {
        let backend = Arc::new(MemoryStore::new());
        let store = CredentialStore::load(backend.clone()).await.unwrap();
        store.set("at_1".into(), "rt_1".into()).await.unwrap();
        store.clear().await.unwrap();

        assert!(!store.set_access_if(&"rt_1".into(), "at_2".into()).await.unwrap());
        assert!(store.get().await.is_empty());
        assert!(backend.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn set_access_if_skips_a_replaced_session() {
        let store = CredentialStore::in_memory();
        store.set("at_1".into(), "rt_1".into()).await.unwrap();
        store.set("at_9".into(), "rt_9".into()).await.unwrap();

        assert!(!store.set_access_if(&"rt_1".into(), "at_2".into()).await.unwrap());
        assert_eq!(store.access_token().await.unwrap().as_str(), "at_9");
    }

    #[tokio::test]
    async fn clear_if_only_removes_the_expected_session() {
        let backend = Arc::new(MemoryStore::new());
        let store = CredentialStore::load(backend.clone()).await.unwrap();
        store.set("at_9".into(), "rt_9".into()).await.unwrap();

        assert!(!store.clear_if(Some(&"rt_1".into())).await.unwrap());
        assert!(!store.clear_if(None).await.unwrap());
        assert_eq!(store.refresh_token().await.unwrap().as_str(), "rt_9");
        assert_eq!(backend.snapshot().await["refreshToken"], "rt_9");

        assert!(store.clear_if(Some(&"rt_9".into())).await.unwrap());
        assert!(store.get().await.is_empty());
        assert!(backend.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn clear_twice_leaves_store_empty() {
        let backend = Arc::new(MemoryStore::new());
        let store = CredentialStore::load(backend.clone()).await.unwrap();
        store.set("at_1".into(), "rt_1".into()).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.get().await.is_empty());
        assert!(backend.snapshot().await.is_empty());

        store.clear().await.unwrap();
        assert!(store.get().await.is_empty());
        assert!(backend.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn failed_persist_does_not_publish() {
        let backend = Arc::new(ReadOnlyStore(MemoryStore::with_entries([
            ("token", "at_1"),
            ("refreshToken", "rt_1"),
        ])));
        let store = CredentialStore::load(backend).await.unwrap();

        assert!(store.set_access("at_2".into()).await.is_err());
        assert_eq!(store.access_token().await.unwrap().as_str(), "at_1");

        assert!(store.set("at_3".into(), "rt_3".into()).await.is_err());
        assert_eq!(store.refresh_token().await.unwrap().as_str(), "rt_1");
    }

    #[tokio::test]
    async fn failed_clear_still_drops_memory() {
        let backend = Arc::new(ReadOnlyStore(MemoryStore::with_entries([("token", "at_1")])));
        let store = CredentialStore::load(backend).await.unwrap();

        assert!(store.clear().await.is_err());
        assert!(store.get().await.is_empty());
    }

    #[tokio::test]
    async fn file_backed_session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(Arc::new(FileStore::load(path.clone()).await.unwrap()))
            .await
            .unwrap();
        store.set("at_1".into(), "rt_1".into()).await.unwrap();
        store.set_access("at_2".into()).await.unwrap();
        drop(store);

        let restarted = CredentialStore::load(Arc::new(FileStore::load(path).await.unwrap()))
            .await
            .unwrap();
        let creds = restarted.get().await;
        assert_eq!(creds.access_token.unwrap().as_str(), "at_2");
        assert_eq!(creds.refresh_token.unwrap().as_str(), "rt_1");
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials {
            access_token: Some("at_secret".into()),
            refresh_token: Some("rt_secret".into()),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("at_secret"), "got: {debug}");
        assert!(!debug.contains("rt_secret"), "got: {debug}");
    }
}
