//! Process-wide bearer token provider.
//!
//! [`CredentialProvider`] is constructed once at startup and shared by every
//! session through [`crate::state::AppState`]. It owns the only state shared
//! across sessions: the cached credential.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use google_cloud_auth::credentials::Credentials;
use tokio::sync::Mutex;

use super::error::{AuthError, AuthResult};

/// Tokens closer than this to expiry are treated as already expired.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Where a credential was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// gcloud user credentials (`authorized_user`)
    AuthorizedUser,
    /// Service account key file (`service_account`)
    ServiceAccount,
    /// GCE / Cloud Run metadata server
    MetadataServer,
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: Option<String>,
    /// `None` when the source tracks expiry itself
    pub expires_at: Option<Instant>,
    /// Scopes reported alongside the token, if any
    pub scopes: Option<Vec<String>>,
}

/// Cached credential state.
pub struct Credential {
    pub kind: CredentialKind,
    /// Token minter for sources backed by `google-cloud-auth`
    pub handle: Option<Credentials>,
    pub token: Option<String>,
    pub expires_at: Option<Instant>,
    /// Scope set the credential is known to carry; `None` when unknown
    pub scopes: Option<Vec<String>>,
}

impl Credential {
    /// A credential that has not minted a token yet.
    pub fn new(kind: CredentialKind, handle: Option<Credentials>, scopes: Option<Vec<String>>) -> Self {
        Self {
            kind,
            handle,
            token: None,
            expires_at: None,
            scopes,
        }
    }

    /// True when the token is present and known to outlive [`EXPIRY_SKEW`].
    ///
    /// A token without a known expiry is never reused; the source is asked
    /// again on every call.
    pub fn is_valid(&self) -> bool {
        let has_token = self.token.as_deref().is_some_and(|t| !t.is_empty());
        let fresh = self
            .expires_at
            .is_some_and(|at| at.saturating_duration_since(Instant::now()) > EXPIRY_SKEW);
        has_token && fresh
    }

    /// True unless a known, non-empty scope set excludes `scope`.
    pub fn has_scope(&self, scope: &str) -> bool {
        match &self.scopes {
            Some(scopes) if !scopes.is_empty() => scopes.iter().any(|s| s == scope),
            _ => true,
        }
    }

    fn apply(&mut self, refreshed: AccessToken) {
        self.token = refreshed.token;
        self.expires_at = refreshed.expires_at;
        if let Some(scopes) = refreshed.scopes.filter(|s| !s.is_empty()) {
            self.scopes = Some(scopes);
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("has_token", &self.token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Discovers and refreshes credentials.
///
/// `load` performs discovery only (no token request); `refresh` is the
/// network call that mints a token.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn load(&self, scope: &str) -> AuthResult<Credential>;

    async fn refresh(&self, credential: &Credential, scope: &str) -> AuthResult<AccessToken>;
}

/// Token selection settings, read once from [`crate::config::ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub oauth_scope: String,
    pub access_token: Option<String>,
    pub api_key_configured: bool,
}

/// Obtains, caches and refreshes the bearer token used for upstream connections.
pub struct CredentialProvider {
    settings: AuthSettings,
    source: Arc<dyn CredentialSource>,
    /// Held across load and refresh so concurrent callers share one in-flight request
    cached: Mutex<Option<Credential>>,
}

impl CredentialProvider {
    pub fn new(settings: AuthSettings, source: Arc<dyn CredentialSource>) -> Self {
        Self {
            settings,
            source,
            cached: Mutex::new(None),
        }
    }

    /// Return a bearer token for the upstream connection.
    ///
    /// Precedence: explicit override token, then the forbidden API-key check,
    /// then the cached (and refreshed when stale) Application Default Credential.
    /// A failed load or refresh leaves the cache as it was, so the next caller retries.
    pub async fn get_token(&self) -> AuthResult<String> {
        if let Some(token) = self.settings.access_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }

        if self.settings.api_key_configured {
            return Err(AuthError::UnsupportedCredential);
        }

        let scope = self.settings.oauth_scope.as_str();
        let mut cached = self.cached.lock().await;

        if cached.is_none() {
            let loaded = self.source.load(scope).await?;
            tracing::debug!("Loaded application default credentials");
            *cached = Some(loaded);
        }
        let Some(credential) = cached.as_mut() else {
            return Err(AuthError::NoCredentials(
                "credential cache is empty".to_string(),
            ));
        };

        let missing_scope = || AuthError::MissingScope {
            scope: scope.to_string(),
        };
        if !credential.has_scope(scope) {
            return Err(missing_scope());
        }

        if !credential.is_valid() {
            tracing::debug!("Refreshing access token");
            let refreshed = self.source.refresh(credential, scope).await?;
            credential.apply(refreshed);

            // A refresh may be the first time the granted scopes are known
            if !credential.has_scope(scope) {
                return Err(missing_scope());
            }
        }

        credential
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::EmptyToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeSource {
        loads: AtomicUsize,
        refreshes: AtomicUsize,
        scopes: Option<Vec<String>>,
        refresh_scopes: Option<Vec<String>>,
        token: Option<String>,
        lifetime: Option<Duration>,
        fail_next_refresh: AtomicBool,
        load_delay: Duration,
    }

    impl FakeSource {
        fn new(token: Option<&str>) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                refreshes: AtomicUsize::new(0),
                scopes: None,
                refresh_scopes: None,
                token: token.map(str::to_string),
                lifetime: Some(Duration::from_secs(3600)),
                fail_next_refresh: AtomicBool::new(false),
                load_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl CredentialSource for FakeSource {
        async fn load(&self, _scope: &str) -> AuthResult<Credential> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.load_delay.is_zero() {
                tokio::time::sleep(self.load_delay).await;
            }
            Ok(Credential::new(
                CredentialKind::MetadataServer,
                None,
                self.scopes.clone(),
            ))
        }

        async fn refresh(&self, _credential: &Credential, _scope: &str) -> AuthResult<AccessToken> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail_next_refresh.swap(false, Ordering::SeqCst) {
                return Err(AuthError::Refresh("503 unavailable".to_string()));
            }
            Ok(AccessToken {
                token: self.token.as_ref().map(|t| format!("{t}-{n}")),
                expires_at: self.lifetime.map(|lifetime| Instant::now() + lifetime),
                scopes: self.refresh_scopes.clone(),
            })
        }
    }

    fn settings() -> AuthSettings {
        AuthSettings {
            oauth_scope: "scope-a".to_string(),
            access_token: None,
            api_key_configured: false,
        }
    }

    #[tokio::test]
    async fn test_override_token_returned_verbatim() {
        let source = Arc::new(FakeSource::new(Some("adc")));
        let provider = CredentialProvider::new(
            AuthSettings {
                access_token: Some("override".to_string()),
                api_key_configured: true,
                ..settings()
            },
            source.clone(),
        );

        assert_eq!(provider.get_token().await.unwrap(), "override");
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_api_key_fails_immediately() {
        let source = Arc::new(FakeSource::new(Some("adc")));
        let provider = CredentialProvider::new(
            AuthSettings {
                api_key_configured: true,
                ..settings()
            },
            source.clone(),
        );

        assert!(matches!(
            provider.get_token().await,
            Err(AuthError::UnsupportedCredential)
        ));
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_token_cached_until_expiry() {
        let source = Arc::new(FakeSource::new(Some("adc")));
        let provider = CredentialProvider::new(settings(), source.clone());

        assert_eq!(provider.get_token().await.unwrap(), "adc-0");
        assert_eq!(provider.get_token().await.unwrap(), "adc-0");
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_in_place() {
        let mut fake = FakeSource::new(Some("adc"));
        // Inside the expiry skew, so every cached token is already stale
        fake.lifetime = Some(Duration::from_secs(30));
        let source = Arc::new(fake);
        let provider = CredentialProvider::new(settings(), source.clone());

        assert_eq!(provider.get_token().await.unwrap(), "adc-0");
        assert_eq!(provider.get_token().await.unwrap(), "adc-1");
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_scope() {
        let mut fake = FakeSource::new(Some("adc"));
        fake.scopes = Some(vec!["https://www.googleapis.com/auth/cloud-platform".to_string()]);
        let provider = CredentialProvider::new(settings(), Arc::new(fake));

        match provider.get_token().await {
            Err(AuthError::MissingScope { scope }) => assert_eq!(scope, "scope-a"),
            other => panic!("Expected MissingScope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scope_reported_by_refresh_is_checked_on_first_call() {
        let mut fake = FakeSource::new(Some("ya29.user"));
        fake.refresh_scopes = Some(vec![
            "https://www.googleapis.com/auth/cloud-platform".to_string(),
        ]);
        let source = Arc::new(fake);
        let provider = CredentialProvider::new(settings(), source.clone());

        for _ in 0..2 {
            match provider.get_token().await {
                Err(AuthError::MissingScope { scope }) => assert_eq!(scope, "scope-a"),
                other => panic!("Expected MissingScope, got {other:?}"),
            }
        }
        // The second call fails on the cached scope set without refreshing again
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scope_reported_by_refresh_accepted() {
        let mut fake = FakeSource::new(Some("adc"));
        fake.refresh_scopes = Some(vec!["scope-a".to_string()]);
        let provider = CredentialProvider::new(settings(), Arc::new(fake));

        assert_eq!(provider.get_token().await.unwrap(), "adc-0");
        assert_eq!(provider.get_token().await.unwrap(), "adc-0");
    }

    #[tokio::test]
    async fn test_unknown_expiry_asks_source_every_time() {
        let mut fake = FakeSource::new(Some("adc"));
        fake.lifetime = None;
        let source = Arc::new(fake);
        let provider = CredentialProvider::new(settings(), source.clone());

        assert_eq!(provider.get_token().await.unwrap(), "adc-0");
        assert_eq!(provider.get_token().await.unwrap(), "adc-1");
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_matching_scope_accepted() {
        let mut fake = FakeSource::new(Some("adc"));
        fake.scopes = Some(vec!["other".to_string(), "scope-a".to_string()]);
        let provider = CredentialProvider::new(settings(), Arc::new(fake));

        assert_eq!(provider.get_token().await.unwrap(), "adc-0");
    }

    #[tokio::test]
    async fn test_empty_token() {
        let provider = CredentialProvider::new(settings(), Arc::new(FakeSource::new(None)));

        assert!(matches!(
            provider.get_token().await,
            Err(AuthError::EmptyToken)
        ));
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_poison_cache() {
        let source = Arc::new(FakeSource::new(Some("adc")));
        source.fail_next_refresh.store(true, Ordering::SeqCst);
        let provider = CredentialProvider::new(settings(), source.clone());

        assert!(matches!(
            provider.get_token().await,
            Err(AuthError::Refresh(_))
        ));
        // The next caller retries the refresh on the same cached credential
        assert_eq!(provider.get_token().await.unwrap(), "adc-1");
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let mut fake = FakeSource::new(Some("adc"));
        fake.load_delay = Duration::from_millis(50);
        let source = Arc::new(fake);
        let provider = Arc::new(CredentialProvider::new(settings(), source.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move { provider.get_token().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "adc-0");
        }

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_credential_validity() {
        let mut credential = Credential::new(CredentialKind::MetadataServer, None, None);
        assert!(!credential.is_valid());

        // Unknown expiry is never reused
        credential.token = Some("t".to_string());
        credential.expires_at = None;
        assert!(!credential.is_valid());

        credential.expires_at = Some(Instant::now() + Duration::from_secs(600));
        assert!(credential.is_valid());

        credential.expires_at = Some(Instant::now() + Duration::from_secs(10));
        assert!(!credential.is_valid());

        credential.token = Some(String::new());
        credential.expires_at = Some(Instant::now() + Duration::from_secs(600));
        assert!(!credential.is_valid());
    }
}
