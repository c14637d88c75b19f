//! Google Cloud Storage store adapter.
//!
//! Uses the GCS JSON API: `objects.list` for listings (following
//! `nextPageToken`) and `alt=media` downloads. Public buckets need no
//! credentials; an OAuth access token is sent as a bearer token if set.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use soundcoop_common::store::{ObjectBody, ObjectInfo, ObjectStore};

use super::{HttpBody, error_for_status};

#[derive(Clone)]
pub struct GcsConfig {
    /// `host[:port]`, normally `storage.googleapis.com`.
    pub endpoint: String,
    pub secure: bool,
    pub access_token: Option<String>,
    /// Bound on connecting and on each read while a response streams.
    pub idle_timeout: Duration,
}

pub struct GcsStore {
    config: GcsConfig,
    client: Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectsPage {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsObject {
    name: String,
    /// uint64 rendered as a decimal string by the JSON API.
    size: Option<String>,
}

impl ObjectsPage {
    fn into_objects(self) -> (Vec<ObjectInfo>, Option<String>) {
        let mut objects: Vec<ObjectInfo> = self
            .items
            .into_iter()
            .map(|o| {
                let size = o.size.and_then(|s| s.parse::<u64>().ok());
                ObjectInfo::new(o.name, size)
            })
            .collect();
        objects.extend(self.prefixes.into_iter().map(ObjectInfo::prefix));
        (objects, self.next_page_token.filter(|t| !t.is_empty()))
    }
}

impl GcsStore {
    pub fn new(config: GcsConfig) -> anyhow::Result<Self> {
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

    fn list_url(&self, bucket: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.base_url(),
            urlencoding::encode(bucket)
        )
    }

    fn media_url(&self, bucket: &str, key: &str) -> String {
        // Object names are a single path segment in the JSON API, so `/` is encoded too.
        format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            self.base_url(),
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }

    async fn get(&self, req: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        let req = match &self.config.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await.context("GCS request failed")?;
        error_for_status(resp, "GCS GET").await
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn name(&self) -> &'static str {
        "gcs"
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> anyhow::Result<Vec<ObjectInfo>> {
        let url = self.list_url(bucket);
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![("prefix", prefix)];
            if !recursive {
                query.push(("delimiter", "/"));
            }
            if let Some(t) = token.as_deref() {
                query.push(("pageToken", t));
            }

            let resp = self.get(self.client.get(&url).query(&query)).await?;
            let page: ObjectsPage = resp
                .json()
                .await
                .context("Failed to parse GCS list response")?;
            let (page_objects, next) = page.into_objects();

            debug!(bucket, prefix, count = page_objects.len(), "GCS list page");
            objects.extend(page_objects);

            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }

    async fn open(&self, bucket: &str, key: &str) -> anyhow::Result<Box<dyn ObjectBody>> {
        let url = self.media_url(bucket, key);
        debug!(url = %url, "GCS GET");
        let resp = self.get(self.client.get(&url)).await?;
        Ok(Box::new(HttpBody::new(resp)))
    }
}
