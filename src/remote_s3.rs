//! S3-compatible remote store.
//!
//! Implements [`RemoteStore`] against any S3-compatible object store
//! (AWS S3, MinIO, LocalStack) using the REST API with AWS Signature V4
//! authentication. Only single-object operations are used: `HeadObject`,
//! `GetObject`, and `PutObject`.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for AWS signing — no
//! C library dependencies, so it builds everywhere.
//!
//! # Versioning
//!
//! The object's ETag serves as the version tag. Conditional writes map to
//! `If-Match` (put-if-version) and `If-None-Match: *` (put-if-absent);
//! HTTP 412 or 409 from the store surfaces as
//! [`RemoteError::PreconditionFailed`], which the synchronizer treats as
//! "re-fetch and re-merge".
//!
//! # Configuration
//!
//! ```toml
//! [remote]
//! backend = "s3"
//!
//! [remote.s3]
//! bucket = "ragpool-shared"
//! region = "us-east-1"
//! prefix = "prod/"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::S3RemoteConfig;
use crate::error::RemoteError;
use crate::remote::{Precondition, RemoteObject, RemoteStore};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// [`RemoteStore`] backed by an S3-compatible bucket.
pub struct S3RemoteStore {
    config: S3RemoteConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3RemoteStore {
    /// Create a store for the configured bucket.
    ///
    /// # Errors
    ///
    /// Fails when AWS credentials are missing from the environment or the
    /// HTTP client cannot be constructed.
    pub fn new(config: S3RemoteConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            config,
            creds,
            client,
        })
    }

    /// Full object key, with the configured prefix applied.
    fn object_key(&self, key: &str) -> String {
        if self.config.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.config.prefix.trim_end_matches('/'), key)
        }
    }

    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            // Custom endpoint (MinIO, LocalStack, etc.)
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

    fn scheme(&self) -> &'static str {
        match self.config.endpoint_url {
            Some(ref e) if e.starts_with("http://") => "http",
            _ => "https",
        }
    }

    /// Sign and send a single-object request.
    ///
    /// `extra_headers` are included in the request but not in the SigV4
    /// signature (conditional headers like `If-Match` need not be signed).
    async fn signed_request(
        &self,
        method: &str,
        key: &str,
        body: Vec<u8>,
        extra_headers: &[(&str, String)],
    ) -> Result<reqwest::Response, RemoteError> {
        let host = self.host();
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let url = format!("{}://{}/{}", self.scheme(), host, encoded_key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let payload_hash = hex_sha256(&body);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
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

        let canonical_uri = format!("/{}", encoded_key);
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

        let mut req = match method {
            "GET" => self.client.get(&url),
            "HEAD" => self.client.head(&url),
            "PUT" => self.client.put(&url).body(body),
            other => {
                return Err(RemoteError::Unavailable(format!(
                    "unsupported method {}",
                    other
                )))
            }
        };

        req = req
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);

        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        for (name, value) in extra_headers {
            req = req.header(*name, value);
        }

        req.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Unavailable(format!("timeout on {} {}: {}", method, key, e))
            } else {
                RemoteError::Unavailable(format!("{} {} failed: {}", method, key, e))
            }
        })
    }
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    async fn exists(&self, key: &str) -> Result<bool, RemoteError> {
        let full_key = self.object_key(key);
        let resp = self.signed_request("HEAD", &full_key, Vec::new(), &[]).await?;
        match resp.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(RemoteError::Status {
                status,
                body: String::new(),
            }),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<RemoteObject>, RemoteError> {
        let full_key = self.object_key(key);
        let resp = self.signed_request("GET", &full_key, Vec::new(), &[]).await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let version = resp
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .unwrap_or_default();

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("read body of {}: {}", key, e)))?;

        Ok(Some(RemoteObject {
            bytes: bytes.to_vec(),
            version,
        }))
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Precondition,
    ) -> Result<String, RemoteError> {
        let full_key = self.object_key(key);

        let conditional: Vec<(&str, String)> = match &expected {
            Precondition::None => vec![],
            Precondition::IfAbsent => vec![("If-None-Match", "*".to_string())],
            Precondition::IfVersion(v) => vec![("If-Match", format!("\"{}\"", v))],
        };

        let resp = self
            .signed_request("PUT", &full_key, bytes, &conditional)
            .await?;

        let status = resp.status();
        // 412 Precondition Failed; some stores answer 409 for If-None-Match.
        if status.as_u16() == 412 || status.as_u16() == 409 {
            tracing::debug!(key, "conditional put lost the race");
            return Err(RemoteError::PreconditionFailed);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let version = resp
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .unwrap_or_default();

        Ok(version)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_encode_unreserved_passthrough() {
        assert_eq!(uri_encode("index-shared_v1.idx~"), "index-shared_v1.idx~");
    }

    #[test]
    fn test_uri_encode_special_chars() {
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn test_signing_key_is_deterministic() {
        let k1 = derive_signing_key("secret", "20260101", "us-east-1", "s3");
        let k2 = derive_signing_key("secret", "20260101", "us-east-1", "s3");
        assert_eq!(k1, k2);
        let k3 = derive_signing_key("secret", "20260102", "us-east-1", "s3");
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_hex_sha256_empty() {
        // Known SHA-256 of the empty string.
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
