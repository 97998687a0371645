//! Asset Store access layer.
//!
//! Upload and delete of image objects against an S3-compatible endpoint,
//! using the S3 REST API with AWS Signature V4 authentication. Supports
//! custom endpoints for S3-compatible services (MinIO, LocalStack).
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for AWS signing — no
//! C library dependencies, making it compatible with all build
//! environments.
//!
//! # Contract
//!
//! - `upload` stores the bytes under a fresh UUID key and returns the
//!   reference; any network, auth, or deadline failure is reported as an
//!   upload failure.
//! - `delete` treats "object already absent" as success. The coordinator
//!   may repeat a delete after a prior partial failure, so idempotent
//!   deletion is required, not optional.
//!
//! # Credentials
//!
//! Read from environment variables at startup and passed to the
//! constructor explicitly — no ambient state inside the store:
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AssetStoreConfig;
use crate::error::{CatalogError, CatalogResult};

type HmacSha256 = Hmac<Sha256>;

/// Reference to a stored asset object (its key within the bucket).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef(pub String);

impl AssetRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Abstract image object store.
///
/// The trait seam lets tests run against [`MemoryAssetStore`] while
/// production uses [`S3AssetStore`]. Calls are blocking network
/// operations with no built-in retry; implementations apply the
/// configured deadline and report timeout as failure.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object; returns its reference.
    async fn upload(&self, bytes: &[u8], content_type: &str) -> CatalogResult<AssetRef>;

    /// Delete an object. An already-absent object is success.
    async fn delete(&self, reference: &AssetRef) -> CatalogResult<()>;
}

// ============ AWS Credentials ============

/// AWS credentials, loaded once at startup.
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            session_token,
        }
    }

    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self::new(access_key_id, secret_access_key, session_token))
    }
}

// ============ S3 implementation ============

/// S3-backed asset store.
pub struct S3AssetStore {
    config: AssetStoreConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3AssetStore {
    /// Build a store over the given bucket configuration and credentials.
    /// The configured `timeout_secs` becomes the overall deadline for
    /// every request.
    pub fn new(config: AssetStoreConfig, creds: AwsCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for asset store")?;

        Ok(Self {
            config,
            creds,
            client,
        })
    }

    /// Fresh object key: configured prefix + UUID + content-type extension.
    fn object_key(&self, content_type: &str) -> String {
        let ext = extension_for(content_type);
        let prefix = self.config.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}{}", Uuid::new_v4(), ext)
        } else {
            format!("{}/{}{}", prefix, Uuid::new_v4(), ext)
        }
    }

    /// Hostname (with port) requests are sent to, also the signed `host`
    /// header. Custom endpoints replace the standard
    /// `<bucket>.s3.<region>.amazonaws.com`.
    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }

    fn base_url(&self) -> String {
        let scheme = match self.config.endpoint_url {
            Some(ref endpoint) if endpoint.starts_with("http://") => "http",
            _ => "https",
        };
        format!("{}://{}", scheme, self.host())
    }

    /// Canonical URI for a key. Virtual-hosted style against AWS proper;
    /// path-style (`/<bucket>/<key>`) against custom endpoints.
    fn canonical_uri(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        if self.config.endpoint_url.is_some() {
            format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key)
        } else {
            format!("/{}", encoded_key)
        }
    }

    /// Compute the SigV4 headers for a request with no query string.
    /// Returns the headers to set: `Authorization`, `x-amz-content-sha256`,
    /// `x-amz-date`, and `x-amz-security-token` when present.
    fn sign(&self, method: &str, canonical_uri: &str, payload_hash: &str) -> Vec<(String, String)> {
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = vec![
            ("host".to_string(), self.host()),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut out = vec![
            ("Authorization".to_string(), authorization),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(ref token) = self.creds.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        out
    }
}

#[async_trait]
impl ObjectStore for S3AssetStore {
    async fn upload(&self, bytes: &[u8], content_type: &str) -> CatalogResult<AssetRef> {
        let key = self.object_key(content_type);
        let canonical_uri = self.canonical_uri(&key);
        let payload_hash = hex_sha256(bytes);
        let url = format!("{}{}", self.base_url(), canonical_uri);

        let mut req = self
            .client
            .put(&url)
            .header("Content-Type", content_type)
            .body(bytes.to_vec());
        for (name, value) in self.sign("PUT", &canonical_uri, &payload_hash) {
            req = req.header(&name, value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CatalogError::upload(format!("PutObject '{}': {}", key, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::upload(format!(
                "PutObject '{}' failed (HTTP {}): {}",
                key,
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        Ok(AssetRef(key))
    }

    async fn delete(&self, reference: &AssetRef) -> CatalogResult<()> {
        let canonical_uri = self.canonical_uri(reference.as_str());
        let payload_hash = hex_sha256(b"");
        let url = format!("{}{}", self.base_url(), canonical_uri);

        let mut req = self.client.delete(&url);
        for (name, value) in self.sign("DELETE", &canonical_uri, &payload_hash) {
            req = req.header(&name, value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CatalogError::upload(format!("DeleteObject '{}': {}", reference, e)))?;

        // 404 means the object is already gone, which is the outcome the
        // caller wanted. S3 itself answers 204 for missing keys.
        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(CatalogError::upload(format!(
            "DeleteObject '{}' failed (HTTP {}): {}",
            reference,
            status,
            body.chars().take(300).collect::<String>()
        )))
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        _ => "",
    }
}

// ============ AWS SigV4 Helpers ============

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ In-memory implementation ============

/// In-memory asset store for tests.
///
/// Uses a `HashMap` behind `std::sync::RwLock` for thread safety. Counts
/// upload and delete attempts, and can be primed to fail either
/// operation to exercise compensation paths.
pub struct MemoryAssetStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    uploads: AtomicU64,
    deletes: AtomicU64,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            uploads: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            fail_uploads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.objects.read().unwrap().contains_key(reference)
    }

    /// Total upload attempts, including failed ones.
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Total delete attempts, including failed ones.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryAssetStore {
    async fn upload(&self, bytes: &[u8], content_type: &str) -> CatalogResult<AssetRef> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(CatalogError::upload("simulated upload failure"));
        }
        let key = format!("mem/{}{}", Uuid::new_v4(), extension_for(content_type));
        self.objects
            .write()
            .unwrap()
            .insert(key.clone(), bytes.to_vec());
        Ok(AssetRef(key))
    }

    async fn delete(&self, reference: &AssetRef) -> CatalogResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CatalogError::upload("simulated delete failure"));
        }
        // Absent keys are success: removal is idempotent.
        self.objects.write().unwrap().remove(reference.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_matches_aws_reference_vector() {
        // Worked example from the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn uri_encode_leaves_unreserved_untouched() {
        assert_eq!(uri_encode("abc-123_~."), "abc-123_~.");
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension_for("image/png"), ".png");
        assert_eq!(extension_for("image/jpeg"), ".jpg");
        assert_eq!(extension_for("application/octet-stream"), "");
    }

    #[tokio::test]
    async fn memory_store_delete_is_idempotent() {
        let store = MemoryAssetStore::new();
        let reference = store.upload(b"img", "image/png").await.unwrap();
        store.delete(&reference).await.unwrap();
        // Second delete of the same reference still reports success.
        store.delete(&reference).await.unwrap();
        assert_eq!(store.object_count(), 0);
        assert_eq!(store.deletes(), 2);
    }

    #[tokio::test]
    async fn memory_store_primed_upload_failure() {
        let store = MemoryAssetStore::new();
        store.set_fail_uploads(true);
        let err = store.upload(b"img", "image/png").await.unwrap_err();
        assert!(matches!(err, CatalogError::UploadFailed(_)));
        assert_eq!(store.object_count(), 0);
    }
}
