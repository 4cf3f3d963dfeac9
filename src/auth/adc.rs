//! Application Default Credentials discovery.
//!
//! Resolution order:
//! 1. `GOOGLE_APPLICATION_CREDENTIALS` (or an explicitly configured file)
//! 2. The gcloud well-known file written by `gcloud auth application-default login`
//! 3. The GCE / Cloud Run metadata server
//!
//! Files may hold `authorized_user` or `service_account` credentials. Token
//! minting and caching are delegated to `google-cloud-auth`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use google_cloud_auth::credentials::service_account::AccessSpecifier;
use google_cloud_auth::credentials::{
    CacheableResource, Credentials, mds, service_account, user_account,
};
use http::HeaderMap;
use http::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;

use super::error::{AuthError, AuthResult};
use super::provider::{AccessToken, Credential, CredentialKind, CredentialSource};

/// The parts of a credentials file read before handing it to `google-cloud-auth`.
#[derive(Debug, Deserialize)]
struct CredentialsFileHeader {
    #[serde(rename = "type")]
    kind: String,
    /// Scopes declared in the file itself
    #[serde(default)]
    scopes: Option<Vec<String>>,
}

/// [`CredentialSource`] backed by Application Default Credentials.
#[derive(Debug, Clone, Default)]
pub struct ApplicationDefaultCredentials {
    credentials_file: Option<PathBuf>,
    metadata_endpoint: Option<String>,
}

impl ApplicationDefaultCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this credentials file instead of environment discovery.
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Override the metadata server root (`http://metadata.google.internal`).
    pub fn with_metadata_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metadata_endpoint = Some(endpoint.into());
        self
    }

    /// Locate a credentials file, if any.
    ///
    /// An explicitly named file that does not exist is an error; a missing
    /// well-known file just means "fall through to the metadata server".
    async fn discover_file(&self) -> AuthResult<Option<PathBuf>> {
        let explicit = self.credentials_file.clone().or_else(|| {
            std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });

        if let Some(path) = explicit {
            if !file_exists(&path).await {
                return Err(AuthError::InvalidCredentials(format!(
                    "credentials file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Some(path));
        }

        match well_known_file() {
            Some(path) if file_exists(&path).await => Ok(Some(path)),
            _ => Ok(None),
        }
    }

    fn metadata_credential(&self, scope: &str) -> AuthResult<Credential> {
        let mut builder = mds::Builder::default().with_scopes([scope]);
        if let Some(endpoint) = &self.metadata_endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }
        let credentials = builder.build().map_err(invalid)?;
        Ok(Credential::new(
            CredentialKind::MetadataServer,
            Some(credentials),
            None,
        ))
    }
}

/// gcloud's application default credentials path.
fn well_known_file() -> Option<PathBuf> {
    let config_dir = match std::env::var_os("CLOUDSDK_CONFIG").filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None if cfg!(windows) => PathBuf::from(std::env::var_os("APPDATA")?).join("gcloud"),
        None => PathBuf::from(std::env::var_os("HOME")?)
            .join(".config")
            .join("gcloud"),
    };
    Some(config_dir.join("application_default_credentials.json"))
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn read_credentials_file(path: &Path) -> AuthResult<Value> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        AuthError::InvalidCredentials(format!("failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        AuthError::InvalidCredentials(format!("malformed credentials in {}: {e}", path.display()))
    })
}

/// Identify the credential kind and the scope set it is known to carry.
///
/// User credentials only know the scopes declared in the file. Service
/// accounts are minted for the requested scope.
fn classify(json: &Value, scope: &str) -> AuthResult<(CredentialKind, Option<Vec<String>>)> {
    let header = CredentialsFileHeader::deserialize(json)
        .map_err(|e| AuthError::InvalidCredentials(e.to_string()))?;

    match header.kind.as_str() {
        "authorized_user" => Ok((CredentialKind::AuthorizedUser, header.scopes)),
        "service_account" => Ok((CredentialKind::ServiceAccount, Some(vec![scope.to_string()]))),
        other => Err(AuthError::InvalidCredentials(format!(
            "unsupported credential type {other:?}"
        ))),
    }
}

fn invalid(e: impl std::fmt::Display) -> AuthError {
    AuthError::InvalidCredentials(e.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

#[async_trait]
impl CredentialSource for ApplicationDefaultCredentials {
    async fn load(&self, scope: &str) -> AuthResult<Credential> {
        let Some(path) = self.discover_file().await? else {
            tracing::info!("No credentials file found, using metadata server");
            return self.metadata_credential(scope);
        };

        tracing::info!("Using credentials file {}", path.display());
        let json = read_credentials_file(&path).await?;
        let (kind, scopes) = classify(&json, scope)?;

        let credentials = match kind {
            CredentialKind::AuthorizedUser => user_account::Builder::new(json).build(),
            CredentialKind::ServiceAccount => service_account::Builder::new(json)
                .with_access_specifier(AccessSpecifier::from_scopes([scope]))
                .build(),
            CredentialKind::MetadataServer => return self.metadata_credential(scope),
        }
        .map_err(invalid)?;

        Ok(Credential::new(kind, Some(credentials), scopes))
    }

    /// Ask `google-cloud-auth` for the current token.
    ///
    /// The library keeps its own token cache, so the returned token carries
    /// no expiry and the provider asks again on every call.
    async fn refresh(&self, credential: &Credential, _scope: &str) -> AuthResult<AccessToken> {
        let Some(credentials) = credential.handle.as_ref() else {
            return Err(AuthError::NoCredentials(
                "credential has no token source".to_string(),
            ));
        };

        let headers = match credentials
            .headers(http::Extensions::new())
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?
        {
            CacheableResource::New { data, .. } => data,
            _ => {
                return Err(AuthError::Refresh(
                    "token source returned no headers".to_string(),
                ));
            }
        };

        Ok(AccessToken {
            token: bearer_token(&headers),
            expires_at: None,
            scopes: None,
        })
    }
}
