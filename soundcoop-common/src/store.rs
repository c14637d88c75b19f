use bytes::Bytes;

/// A single entry returned by [`ObjectStore::list`].
///
/// Non-recursive listings also report "directories" (common prefixes); those
/// keys end in `/` and carry no size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: Option<u64>,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: Option<u64>) -> Self {
        Self { key: key.into(), size }
    }

    pub fn prefix(key: impl Into<String>) -> Self {
        Self { key: key.into(), size: None }
    }

    pub fn is_prefix(&self) -> bool {
        self.key.ends_with('/')
    }

    pub fn basename(&self) -> &str {
        basename(&self.key)
    }
}

/// Readable byte stream for one remote object, consumed chunk by chunk.
#[async_trait::async_trait]
pub trait ObjectBody: Send {
    /// Next chunk of the object, or `None` once the stream is exhausted.
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>>;
}

/// Trait implemented by all object-store adapters.
///
/// Each adapter handles the raw I/O for one kind of remote (S3-compatible,
/// GCS-compatible, local directory). The fetcher owns filtering and local
/// file bookkeeping; the adapter is responsible only for listing and reading
/// objects.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short adapter label used in log output.
    fn name(&self) -> &'static str;

    /// List every object in `bucket` whose key starts with `prefix`.
    ///
    /// All pages are fetched before returning. With `recursive == false`
    /// the listing is delimited on `/`.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> anyhow::Result<Vec<ObjectInfo>>;

    /// Open a byte stream for the object at `key` in `bucket`.
    async fn open(&self, bucket: &str, key: &str) -> anyhow::Result<Box<dyn ObjectBody>>;
}

/// Last path segment of a remote key. A trailing `/` is ignored.
pub fn basename(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// [`ObjectBody`] over an in-memory buffer, yielded in fixed-size chunks.
pub struct BytesBody {
    data: Bytes,
    chunk_size: usize,
}

impl BytesBody {
    pub fn new(data: Bytes, chunk_size: usize) -> Self {
        Self { data, chunk_size: chunk_size.max(1) }
    }
}

#[async_trait::async_trait]
impl ObjectBody for BytesBody {
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let n = self.chunk_size.min(self.data.len());
        Ok(Some(self.data.split_to(n)))
    }
}
