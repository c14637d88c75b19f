//! S3-compatible store adapter.
//!
//! Talks to AWS S3 and anything speaking its REST dialect (MinIO, Ceph, the
//! GCS interoperability endpoint). Uses path-style URLs and reqwest directly.
//! Requests are anonymous unless AWS credentials are present in the
//! environment, in which case they are signed with AWS Signature V4.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::debug;

use soundcoop_common::store::{ObjectBody, ObjectInfo, ObjectStore};

use super::{HttpBody, encode_key, error_for_status};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl S3Credentials {
    /// Read credentials from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
    /// Returns `None` when either is unset or empty.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
        if access_key_id.is_empty() || secret_access_key.is_empty() {
            return None;
        }
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }
}

#[derive(Clone)]
pub struct S3Config {
    /// `host[:port]` of the service.
    pub endpoint: String,
    pub secure: bool,
    pub region: String,
    pub credentials: Option<S3Credentials>,
    /// Bound on connecting and on each read while a response streams.
    pub idle_timeout: Duration,
}

pub struct S3Store {
    config: S3Config,
    client: Client,
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Default, PartialEq)]
struct ListPage {
    objects: Vec<ObjectInfo>,
    next_token: Option<String>,
}

impl S3Store {
    pub fn new(config: S3Config) -> anyhow::Result<Self> {
        // No whole-request deadline: large objects may stream for a long
        // time, so only connecting and each individual read are bounded.
        let client = Client::builder()
            .connect_timeout(config.idle_timeout)
            .read_timeout(config.idle_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    fn base_url(&self) -> String {
        let scheme = if self.config.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.config.endpoint.trim_end_matches('/'))
    }

    /// Compute AWS Signature V4 for a request.
    fn sign(
        &self,
        creds: &S3Credentials,
        method: &str,
        path: &str,
        query: &str,
        headers: &BTreeMap<String, String>,
        body_hash: &str,
        date_time: &str,
        date: &str,
    ) -> String {
        // Canonical request
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();
        let signed_headers: String = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n/{}\n{}\n{}\n{}\n{}",
            method, path, query, canonical_headers, signed_headers, body_hash
        );

        // String to sign
        let cr_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let credential_scope = format!("{}/{}/s3/aws4_request", date, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            date_time, credential_scope, cr_hash
        );

        let signing_key = derive_signing_key(&creds.secret_access_key, date, &self.config.region);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        )
    }

    /// Issue a GET for `path` (already percent-encoded, no leading slash).
    async fn get(&self, path: &str, query: &str) -> anyhow::Result<reqwest::Response> {
        let url = if query.is_empty() {
            format!("{}/{}", self.base_url(), path)
        } else {
            format!("{}/{}?{}", self.base_url(), path, query)
        };

        let mut req = self.client.get(&url);

        if let Some(creds) = &self.config.credentials {
            let now = Utc::now();
            let date_time = now.format("%Y%m%dT%H%M%SZ").to_string();
            let date = now.format("%Y%m%d").to_string();
            let empty_hash = body_hash(b"");

            let mut headers = BTreeMap::new();
            headers.insert("host".to_string(), self.config.endpoint.clone());
            headers.insert("x-amz-content-sha256".to_string(), empty_hash.clone());
            headers.insert("x-amz-date".to_string(), date_time.clone());
            if let Some(token) = &creds.session_token {
                headers.insert("x-amz-security-token".to_string(), token.clone());
                req = req.header("x-amz-security-token", token);
            }

            let auth = self.sign(creds, "GET", path, query, &headers, &empty_hash, &date_time, &date);
            req = req
                .header("x-amz-date", &date_time)
                .header("x-amz-content-sha256", &empty_hash)
                .header("Authorization", &auth);
        }

        debug!(url = %url, signed = self.config.credentials.is_some(), "S3 GET");
        let resp = req.send().await.context("S3 GET request failed")?;
        error_for_status(resp, "S3 GET").await
    }
}

fn derive_signing_key(secret: &str, date: &str, region: &str) -> Vec<u8> {
    let key = format!("AWS4{}", secret);
    let k_date = hmac_sha256(key.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key length ok");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn body_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Canonical (sorted, percent-encoded) ListObjectsV2 query string.
fn list_query(prefix: &str, recursive: bool, token: Option<&str>) -> String {
    let mut params = BTreeMap::new();
    params.insert("list-type", "2".to_string());
    params.insert("prefix", prefix.to_string());
    if !recursive {
        params.insert("delimiter", "/".to_string());
    }
    if let Some(token) = token {
        params.insert("continuation-token", token.to_string());
    }
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> anyhow::Result<Vec<ObjectInfo>> {
        let path = urlencoding::encode(bucket).into_owned();
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let query = list_query(prefix, recursive, token.as_deref());
            let resp = self.get(&path, &query).await?;
            let body = resp.text().await.context("Failed to read S3 list response")?;
            let page = parse_list_page(&body);

            debug!(bucket, prefix, count = page.objects.len(), "S3 list page");
            objects.extend(page.objects);

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }

    async fn open(&self, bucket: &str, key: &str) -> anyhow::Result<Box<dyn ObjectBody>> {
        let path = format!("{}/{}", urlencoding::encode(bucket), encode_key(key));
        let resp = self.get(&path, "").await?;
        Ok(Box::new(HttpBody::new(resp)))
    }
}

/// Parse a ListObjectsV2 XML page. Objects come first, then common
/// prefixes, each in document order.
fn parse_list_page(xml: &str) -> ListPage {
    if xml.trim().is_empty() {
        return ListPage::default();
    }

    let mut objects = Vec::new();
    for contents in elements(xml, "Contents") {
        let Some(key) = elements(contents, "Key").first().map(|k| unescape_xml(k)) else {
            continue;
        };
        let size = elements(contents, "Size")
            .first()
            .and_then(|s| s.trim().parse::<u64>().ok());
        objects.push(ObjectInfo::new(key, size));
    }
    for common in elements(xml, "CommonPrefixes") {
        if let Some(prefix) = elements(common, "Prefix").first() {
            objects.push(ObjectInfo::prefix(unescape_xml(prefix)));
        }
    }

    let truncated = elements(xml, "IsTruncated")
        .first()
        .is_some_and(|v| v.trim() == "true");
    let next_token = if truncated {
        elements(xml, "NextContinuationToken")
            .first()
            .map(|t| unescape_xml(t))
    } else {
        None
    };

    ListPage { objects, next_token }
}

/// Inner text of every `<tag>…</tag>` in `xml`, in document order.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find(&open) {
        remaining = &remaining[start + open.len()..];
        match remaining.find(&close) {
            Some(end) => {
                found.push(&remaining[..end]);
                remaining = &remaining[end + close.len()..];
            }
            None => break,
        }
    }
    found
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
