//! Local directory store adapter.
//!
//! Treats `{base}/{bucket}` as a bucket and relative file paths under it as
//! keys. Handy for offline mirrors of a remote bucket.

use std::path::PathBuf;

use anyhow::{Context, bail};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;

use soundcoop_common::store::{ObjectBody, ObjectInfo, ObjectStore};

const READ_CHUNK: usize = 64 * 1024;

pub struct DirectoryStore {
    base_path: PathBuf,
}

impl DirectoryStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.base_path.join(sanitize(bucket))
    }

    fn full_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_path(bucket).join(sanitize(key))
    }
}

// Prevent path traversal
fn sanitize(key: &str) -> String {
    key.trim_start_matches('/').replace("..", "")
}

struct FileBody {
    file: tokio::fs::File,
}

#[async_trait]
impl ObjectBody for FileBody {
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let n = self.file.read_buf(&mut buf).await.context("Failed to read file")?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> anyhow::Result<Vec<ObjectInfo>> {
        let root = self.bucket_path(bucket);
        if !root.is_dir() {
            bail!("Bucket directory not found: {}", root.display());
        }

        // Walk from the deepest directory the prefix names, then filter on
        // the full key so partial-segment prefixes still match.
        let prefix = sanitize(prefix);
        let start_dir = match prefix.rfind('/') {
            Some(idx) => root.join(&prefix[..idx]),
            None => root.clone(),
        };

        let mut objects = Vec::new();
        if !start_dir.is_dir() {
            return Ok(objects);
        }

        let mut stack = vec![start_dir];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read directory {}", dir.display()))?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                let Ok(relative) = path.strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if meta.is_dir() {
                    let dir_key = format!("{}/", key);
                    if recursive {
                        if dir_key.starts_with(&prefix) || prefix.starts_with(&dir_key) {
                            stack.push(path);
                        }
                    } else if dir_key.starts_with(&prefix) && dir_key.len() > prefix.len() {
                        objects.push(ObjectInfo::prefix(dir_key));
                    }
                } else if meta.is_file() && key.starts_with(&prefix) {
                    objects.push(ObjectInfo::new(key, Some(meta.len())));
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn open(&self, bucket: &str, key: &str) -> anyhow::Result<Box<dyn ObjectBody>> {
        let src = self.full_path(bucket, key);
        if !src.is_file() {
            bail!("File not found at path: {}", src.display());
        }
        let file = tokio::fs::File::open(&src)
            .await
            .with_context(|| format!("Failed to open {}", src.display()))?;
        Ok(Box::new(FileBody { file }))
    }
}
