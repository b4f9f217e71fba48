//! Google Drive access.
//!
//! Lists and downloads files from Drive folders shared with a service
//! account, using the Drive v3 REST API over `reqwest`. Implements
//! pagination for large folders and PDF export for Google-native document
//! formats, which cannot be downloaded in their own representation.
//!
//! Authentication is the standard service-account flow: a short-lived
//! RS256 JWT is exchanged for a bearer token at the key's `token_uri`;
//! tokens are cached until shortly before expiry. Uses pure-Rust crypto
//! (`ring`, `pem`) — no C library dependencies.
//!
//! The [`RemoteDrive`] trait is the seam the crawler and fetcher consume;
//! tests substitute an in-memory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::RemoteEntry;

/// Read-only Drive scope; the service account never needs more.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// Children per listing page.
const PAGE_SIZE: u32 = 100;

/// Remote folder-tree capability consumed by the crawler and fetcher.
#[async_trait]
pub trait RemoteDrive: Send + Sync {
    /// List all non-trashed children of a folder, exhausting pagination.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>>;

    /// Download a file's bytes in its native representation.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Export a Google-native document to the given mime type.
    async fn export(&self, file_id: &str, mime: &str) -> Result<Vec<u8>>;
}

// ============ Service-account credentials ============

#[derive(serde::Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

struct CachedToken {
    access_token: String,
    expires_at: std::time::Instant,
}

/// Drive v3 client authenticated as a service account.
pub struct DriveClient {
    client: reqwest::Client,
    key_path: PathBuf,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl DriveClient {
    /// Create a client from a service-account JSON key file. Fails up
    /// front when the key file does not exist, so a misconfigured
    /// deployment is caught before the first sync instead of during it.
    pub fn new(key_path: impl AsRef<Path>) -> Result<Self> {
        let key_path = key_path.as_ref().to_path_buf();
        if !key_path.exists() {
            return Err(Error::config(format!(
                "service account file not found: {}",
                key_path.display()
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            key_path,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Get a valid bearer token, refreshing if the cached one is near expiry.
    async fn bearer_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(ref cached) = *token {
                if cached.expires_at
                    > std::time::Instant::now() + std::time::Duration::from_secs(60)
                {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token().await?;

        {
            let mut token = self.token.write().await;
            *token = Some(CachedToken {
                access_token: new_token.clone(),
                // Tokens last an hour; refresh a little early.
                expires_at: std::time::Instant::now() + std::time::Duration::from_secs(55 * 60),
            });
        }

        Ok(new_token)
    }

    async fn refresh_token(&self) -> Result<String> {
        let key_content = tokio::fs::read_to_string(&self.key_path).await.map_err(|e| {
            Error::config(format!(
                "failed to read service account key {}: {}",
                self.key_path.display(),
                e
            ))
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&key_content)
            .map_err(|e| Error::config(format!("invalid service account key format: {}", e)))?;

        let jwt = sign_jwt(&key)?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await
            .map_err(|e| Error::config(format!("token exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::config(format!(
                "token exchange failed ({}): {}",
                status, body
            )));
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::config(format!("failed to parse token response: {}", e)))?;

        Ok(token_response.access_token)
    }
}

/// Build and sign the OAuth JWT assertion for a service account.
fn sign_jwt(key: &ServiceAccountKey) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({
        "iss": key.client_email,
        "scope": DRIVE_SCOPE,
        "aud": key.token_uri,
        "iat": now,
        "exp": now + 3600,
    });

    let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = b64.encode(r#"{"alg":"RS256","typ":"JWT"}"#.as_bytes());
    let payload = b64.encode(claims.to_string().as_bytes());
    let signing_input = format!("{}.{}", header, payload);

    let private_key = key.private_key.replace("\\n", "\n");
    let pem = pem::parse(&private_key)
        .map_err(|e| Error::config(format!("failed to parse private key PEM: {}", e)))?;
    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(pem.contents())
        .map_err(|e| Error::config(format!("failed to parse private key: {:?}", e)))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            signing_input.as_bytes(),
            &mut signature,
        )
        .map_err(|e| Error::config(format!("failed to sign JWT: {:?}", e)))?;

    Ok(format!("{}.{}", signing_input, b64.encode(&signature)))
}

#[derive(serde::Deserialize)]
struct FileListPage {
    #[serde(default)]
    files: Vec<RemoteEntry>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

#[async_trait]
impl RemoteDrive for DriveClient {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.bearer_token().await?;
            let query = format!("'{}' in parents and trashed = false", folder_id);

            let mut request = self
                .client
                .get(FILES_URL)
                .bearer_auth(&token)
                .query(&[
                    ("q", query.as_str()),
                    ("spaces", "drive"),
                    (
                        "fields",
                        "nextPageToken, files(id, name, mimeType, webViewLink, modifiedTime)",
                    ),
                ])
                .query(&[("pageSize", PAGE_SIZE)]);

            if let Some(ref t) = page_token {
                request = request.query(&[("pageToken", t.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::traversal(format!("listing folder {}: {}", folder_id, e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::traversal(format!(
                    "listing folder {} failed (HTTP {}): {}",
                    folder_id,
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let page: FileListPage = response
                .json()
                .await
                .map_err(|e| Error::traversal(format!("parsing folder listing: {}", e)))?;

            entries.extend(page.files);

            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        Ok(entries)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.bearer_token().await?;
        let url = format!("{}/{}", FILES_URL, file_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::fetch(file_id, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::fetch(
                file_id,
                format!("download failed (HTTP {})", response.status()),
            ));
        }

        Ok(response.bytes().await.map_err(|e| Error::fetch(file_id, e.to_string()))?.to_vec())
    }

    async fn export(&self, file_id: &str, mime: &str) -> Result<Vec<u8>> {
        let token = self.bearer_token().await?;
        let url = format!("{}/{}/export", FILES_URL, file_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[("mimeType", mime)])
            .send()
            .await
            .map_err(|e| Error::fetch(file_id, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::fetch(
                file_id,
                format!("export to {} failed (HTTP {})", mime, response.status()),
            ));
        }

        Ok(response.bytes().await.map_err(|e| Error::fetch(file_id, e.to_string()))?.to_vec())
    }
}
