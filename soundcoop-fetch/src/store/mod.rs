pub mod directory;
pub mod gcs;
pub mod s3;

use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use bytes::Bytes;
use soundcoop_common::station::{StationConfig, StoreKind};
use soundcoop_common::store::{ObjectBody, ObjectStore};

use self::directory::DirectoryStore;
use self::gcs::{GcsConfig, GcsStore};
use self::s3::{S3Config, S3Credentials, S3Store};

/// Construct the object-store adapter a station's remote data lives in.
///
/// HTTP stores pick up credentials from the environment if present and run
/// anonymously otherwise.
pub fn from_station(
    station: &StationConfig,
    idle_timeout: Duration,
) -> anyhow::Result<Box<dyn ObjectStore>> {
    match station.kind {
        StoreKind::S3 => Ok(Box::new(S3Store::new(S3Config {
            endpoint: station.endpoint.clone(),
            secure: station.secure,
            region: station.region.clone(),
            credentials: S3Credentials::from_env(),
            idle_timeout,
        })?)),
        StoreKind::Gcs => Ok(Box::new(GcsStore::new(GcsConfig {
            endpoint: station.endpoint.clone(),
            secure: station.secure,
            access_token: std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            idle_timeout,
        })?)),
        StoreKind::Directory => Ok(Box::new(DirectoryStore::new(&station.endpoint))),
    }
}

/// Streams an HTTP response body chunk by chunk as it arrives.
pub struct HttpBody {
    resp: reqwest::Response,
}

impl HttpBody {
    pub fn new(resp: reqwest::Response) -> Self {
        Self { resp }
    }
}

#[async_trait]
impl ObjectBody for HttpBody {
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        self.resp
            .chunk()
            .await
            .context("Failed to read response body")
    }
}

/// Turn a non-2xx response into an error carrying status and body text.
pub(crate) async fn error_for_status(
    resp: reqwest::Response,
    what: &str,
) -> anyhow::Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    bail!("{} failed: HTTP {} - {}", what, status, body.trim());
}

/// Percent-encode an object key segment by segment, keeping `/` intact.
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
